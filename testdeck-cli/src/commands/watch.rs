//! `testdeck watch` -- 허브 관찰자
//!
//! 허브에 관찰자로 연결하여 재생분과 라이브 이벤트를 수신하고,
//! 이벤트마다 집계 트리를 다시 계산해 렌더링합니다. 집계 레이어의
//! 참조 소비자이기도 합니다: 수신 → 로그 누적 → 전체 재계산 →
//! 렌더링을 이벤트 단위로 동기 수행합니다.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::net::TcpStream;

use testdeck_aggregate::{Aggregator, RunState};
use testdeck_core::event::Event;

use crate::error::CliError;
use crate::output;

/// 허브에 연결해 이벤트 스트림을 소비하고 트리를 렌더링합니다.
///
/// 연결이 닫힐 때까지 실행됩니다.
pub async fn execute(addr: &str) -> Result<(), CliError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| CliError::Connect {
            addr: addr.to_owned(),
            reason: e.to_string(),
        })?;
    output::print_ok(&format!("connected to hub at {addr}"));

    let mut reader = BufReader::new(stream);
    let mut aggregator = Aggregator::new();
    let mut run_state = RunState::new();
    let mut line = String::new();

    loop {
        line.clear();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            output::print_error("connection closed by hub");
            return Ok(());
        }

        let trimmed = line.trim_end();
        if trimmed.is_empty() {
            continue;
        }

        match Event::from_json(trimmed) {
            Ok(event) => {
                run_state.observe(&event);
                if !event.is_runner() {
                    aggregator.push(event);
                }
            }
            Err(e) => {
                // 이벤트가 아닌 릴레이 프레임은 조용히 넘어감
                tracing::debug!(error = %e, frame = trimmed, "ignoring non-event frame");
                continue;
            }
        }

        // 이벤트마다 전체 재계산 후 다시 그림
        let tree = aggregator.tree();
        print!("\x1b[2J\x1b[H"); // 화면 지우기
        print!(
            "{}",
            output::render_tree(&tree, run_state.active_test(), run_state.is_running())
        );
    }
}
