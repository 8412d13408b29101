//! `testdeck classify` -- 분류 휴리스틱 단독 실행

use testdeck_aggregate::classify;

use crate::error::CliError;

/// 식별자 하나를 분류하고 (그룹, 케이스)를 출력합니다.
pub fn execute(identifier: &str) -> Result<(), CliError> {
    let classification = classify::classify(Some(identifier));
    println!("group: {}", classification.group);
    println!("case:  {}", classification.case);
    Ok(())
}
