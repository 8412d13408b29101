//! `testdeck run` -- 허브에 테스트 실행 명령 전송
//!
//! `{"command": "run_tests", "args": [...]}` 프레임을 보내고,
//! 러너 출력 라인을 완료 마커가 올 때까지 스트리밍합니다.

use serde_json::json;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use testdeck_core::event::Event;
use testdeck_core::types::{StepStatus, unix_timestamp};

use crate::error::CliError;
use crate::output;

/// 테스트 실행 명령을 보내고 러너 출력을 출력합니다.
pub async fn execute(addr: &str, args: &[String]) -> Result<(), CliError> {
    let stream = TcpStream::connect(addr)
        .await
        .map_err(|e| CliError::Connect {
            addr: addr.to_owned(),
            reason: e.to_string(),
        })?;

    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let command = json!({ "command": "run_tests", "args": args });
    let mut frame = serde_json::to_string(&command)?;
    frame.push('\n');
    let sent_at = unix_timestamp();
    write_half.write_all(frame.as_bytes()).await?;
    write_half.flush().await?;

    if args.is_empty() {
        output::print_ok("requested test run with hub default arguments");
    } else {
        output::print_ok(&format!("requested test run: {}", args.join(" ")));
    }

    let mut line = String::new();
    let mut failed = false;
    loop {
        line.clear();
        let read = reader.read_line(&mut line).await?;
        if read == 0 {
            output::print_error("connection closed before run finished");
            return Ok(());
        }

        let trimmed = line.trim_end();
        let Ok(event) = Event::from_json(trimmed) else {
            continue;
        };

        // 러너 출력만 보여줌 — 스텝 이벤트는 건너뜀
        if !event.is_runner() {
            continue;
        }
        // 재생된 이전 런의 러너 이벤트(오래된 완료 마커 포함)는 무시.
        // ts는 초 단위이므로 명령 전송 시각 이전 이벤트만 거를 수 있음
        if event.ts < sent_at {
            continue;
        }

        if let Some(runner_line) = &event.line {
            println!("{runner_line}");
        }
        if event.status == Some(StepStatus::Failed) {
            failed = true;
        }
        if event.is_finished_marker() {
            break;
        }
    }

    if failed {
        output::print_error("test run reported failures");
    } else {
        output::print_ok("test run finished");
    }
    Ok(())
}
