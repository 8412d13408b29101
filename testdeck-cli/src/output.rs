//! 터미널 출력 헬퍼 -- 트리 렌더링과 상태 색상
//!
//! 관찰자(`watch`)와 러너(`run`) 명령이 공유하는 렌더링 코드입니다.
//! 집계 레이어가 만든 트리를 그대로 받아 그립니다.

use colored::Colorize;

use testdeck_core::types::{RollupStatus, StepRecord, StepStatus, TestTree};

/// 롤업 상태를 색상 라벨로 변환합니다.
pub fn rollup_label(status: RollupStatus) -> String {
    match status {
        RollupStatus::Passed => "passed".green().to_string(),
        RollupStatus::Failed => "failed".red().to_string(),
        RollupStatus::Running => "running".yellow().to_string(),
    }
}

/// 스텝 상태를 색상 라벨로 변환합니다.
pub fn step_label(status: Option<StepStatus>) -> String {
    match status {
        Some(StepStatus::Passed) => "passed".green().to_string(),
        Some(StepStatus::Failed) => "failed".red().to_string(),
        Some(StepStatus::Running) => "running".yellow().to_string(),
        None => "pending".dimmed().to_string(),
    }
}

/// 스텝 한 줄을 렌더링합니다.
fn render_step(step: &StepRecord) -> String {
    let mut line = match &step.detail {
        Some(detail) => format!("      {} ({})", step.step_name, detail),
        None => format!("      {}", step.step_name),
    };
    line.push_str(&format!(" [{}]", step_label(step.status)));
    if let Some(error) = &step.error {
        line.push_str(&format!("\n        {}", error.red()));
    }
    if let Some(image) = step.display_image() {
        // 인라인 이미지는 전체 data URL 대신 표식만
        let shown = if image.starts_with("data:") {
            "<inline image>"
        } else {
            image
        };
        line.push_str(&format!("\n        {}", shown.dimmed()));
    }
    line
}

/// 파생 트리 전체를 렌더링합니다.
pub fn render_tree(tree: &TestTree, active_test: Option<&str>, running: bool) -> String {
    let mut out = String::new();

    if running {
        let active = active_test.unwrap_or("...");
        out.push_str(&format!("{} {}\n", "▶ running:".yellow().bold(), active));
    }

    if tree.is_empty() {
        out.push_str(&format!("{}\n", "(no test events yet)".dimmed()));
        return out;
    }

    for group in &tree.groups {
        out.push_str(&format!(
            "{} [{}]\n",
            group.name.bold(),
            rollup_label(group.status)
        ));
        for case in &group.cases {
            out.push_str(&format!(
                "    {} [{}]\n",
                case.name,
                rollup_label(case.status)
            ));
            for step in &case.steps {
                out.push_str(&render_step(step));
                out.push('\n');
            }
        }
    }

    out
}

/// 성공 메시지를 출력합니다.
pub fn print_ok(message: &str) {
    println!("{} {}", "✓".green(), message);
}

/// 실패 메시지를 출력합니다.
pub fn print_error(message: &str) {
    eprintln!("{} {}", "✗".red(), message);
}

#[cfg(test)]
mod tests {
    use super::*;
    use testdeck_core::types::{TestCase, TestGroup};

    fn sample_tree() -> TestTree {
        TestTree {
            groups: vec![TestGroup {
                name: "LoginTest".to_owned(),
                status: RollupStatus::Failed,
                cases: vec![TestCase {
                    name: "test_redirect".to_owned(),
                    status: RollupStatus::Failed,
                    steps: vec![StepRecord {
                        step_name: "visit".to_owned(),
                        detail: Some("/login".to_owned()),
                        status: Some(StepStatus::Failed),
                        error: Some("expected 200, got 500".to_owned()),
                        screenshot: Some("tmp/shot.png".to_owned()),
                        data_url: None,
                        ts: 1,
                    }],
                }],
            }],
        }
    }

    #[test]
    fn render_includes_names_and_error() {
        let rendered = render_tree(&sample_tree(), None, false);
        assert!(rendered.contains("LoginTest"));
        assert!(rendered.contains("test_redirect"));
        assert!(rendered.contains("visit"));
        assert!(rendered.contains("/login"));
        assert!(rendered.contains("expected 200, got 500"));
        assert!(rendered.contains("tmp/shot.png"));
    }

    #[test]
    fn render_shows_running_banner() {
        let rendered = render_tree(&sample_tree(), Some("LoginTest#test_redirect"), true);
        assert!(rendered.contains("running"));
        assert!(rendered.contains("LoginTest#test_redirect"));
    }

    #[test]
    fn render_empty_tree() {
        let rendered = render_tree(&TestTree::default(), None, false);
        assert!(rendered.contains("no test events"));
    }

    #[test]
    fn inline_image_is_not_dumped() {
        let mut tree = sample_tree();
        tree.groups[0].cases[0].steps[0].data_url =
            Some("data:image/png;base64,AAAA".to_owned());
        let rendered = render_tree(&tree, None, false);
        // data URL 본문 대신 표식
        assert!(rendered.contains("<inline image>"));
        assert!(!rendered.contains("base64,AAAA"));
    }
}
