//! 외부 테스트 러너 브리지 -- 인바운드 명령을 프로세스 실행으로 연결
//!
//! [`ProcessRunner`]는 허브의 `run_tests` 명령을 받아 외부 프로세스를
//! 스폰하고, stdout/stderr의 모든 라인을 러너 이벤트로 브로드캐스트
//! 채널에 올립니다.
//!
//! # 종료 규약
//! - 출력 라인 하나 = `{kind: runner, line, status: running}` 이벤트 하나
//! - 실행 실패 = `{line: "Error: <msg>", status: failed}` 이벤트
//! - 스트림의 마지막은 항상 `{line: "Finished", status: passed}` —
//!   완료 마커만이 관찰자의 실행 중 상태를 해제하므로 실패 경로에서도
//!   마커는 방출됩니다
//!
//! 외부 프로세스 실패는 파이프라인 크래시가 아니라 관측 가능한
//! 이벤트로 변환됩니다.

use metrics::counter;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use testdeck_core::event::{Event, RUNNER_FINISHED_MARKER};
use testdeck_core::metrics as metric;
use testdeck_core::pipeline::CommandRunner;
use testdeck_core::types::StepStatus;

use crate::config::RunnerBridgeConfig;

/// 외부 프로세스 기반 테스트 러너
///
/// 각 실행은 별도의 tokio 태스크에서 수행되며 `spawn_run`은 즉시
/// 반환합니다 — 이벤트 방출이 테스트 스텝이나 허브를 지연시키지
/// 않습니다.
pub struct ProcessRunner {
    config: RunnerBridgeConfig,
}

impl ProcessRunner {
    /// 새 프로세스 러너를 생성합니다.
    pub fn new(config: RunnerBridgeConfig) -> Self {
        Self { config }
    }
}

impl CommandRunner for ProcessRunner {
    fn name(&self) -> &str {
        "process"
    }

    fn spawn_run(&self, args: Vec<String>, events: mpsc::Sender<Event>) {
        let config = self.config.clone();
        tokio::spawn(async move {
            run_command(config, args, events).await;
        });
    }
}

/// 명령을 실행하고 출력을 러너 이벤트로 스트리밍합니다.
async fn run_command(config: RunnerBridgeConfig, args: Vec<String>, events: mpsc::Sender<Event>) {
    let argv = if args.is_empty() {
        config.default_args.clone()
    } else {
        args
    };
    let command_line = argv.join(" ");

    if !config.allow_commands {
        warn!(command = %command_line, "command execution disabled by configuration");
        emit(
            &events,
            Event::runner("Error: command execution disabled", StepStatus::Failed),
        )
        .await;
        emit(
            &events,
            Event::runner(RUNNER_FINISHED_MARKER, StepStatus::Passed),
        )
        .await;
        return;
    }

    if argv.is_empty() {
        emit(
            &events,
            Event::runner("Error: empty command", StepStatus::Failed),
        )
        .await;
        emit(
            &events,
            Event::runner(RUNNER_FINISHED_MARKER, StepStatus::Passed),
        )
        .await;
        return;
    }

    info!(command = %command_line, workdir = %config.workdir, "running test command");

    let child = Command::new(&argv[0])
        .args(&argv[1..])
        .current_dir(&config.workdir)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn();

    let mut child = match child {
        Ok(child) => {
            counter!(metric::RUNNER_COMMANDS_TOTAL, metric::LABEL_RESULT => "success")
                .increment(1);
            child
        }
        Err(e) => {
            warn!(command = %command_line, error = %e, "failed to spawn test command");
            counter!(metric::RUNNER_COMMANDS_TOTAL, metric::LABEL_RESULT => "failure")
                .increment(1);
            emit(
                &events,
                Event::runner(format!("Error: {e}"), StepStatus::Failed),
            )
            .await;
            emit(
                &events,
                Event::runner(RUNNER_FINISHED_MARKER, StepStatus::Passed),
            )
            .await;
            return;
        }
    };

    // stdout/stderr를 각각 라인 단위로 읽어 동일한 이벤트 채널로 합칩니다
    let mut readers = Vec::new();
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(stream_lines(
            BufReader::new(stdout),
            events.clone(),
        )));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(stream_lines(
            BufReader::new(stderr),
            events.clone(),
        )));
    }

    for reader in readers {
        if let Err(e) = reader.await {
            debug!(error = %e, "output reader task failed");
        }
    }

    match child.wait().await {
        Ok(status) => {
            info!(command = %command_line, %status, "test command finished");
        }
        Err(e) => {
            warn!(command = %command_line, error = %e, "failed to wait for test command");
            emit(
                &events,
                Event::runner(format!("Error: {e}"), StepStatus::Failed),
            )
            .await;
        }
    }

    emit(
        &events,
        Event::runner(RUNNER_FINISHED_MARKER, StepStatus::Passed),
    )
    .await;
}

/// 출력 스트림의 각 라인을 러너 이벤트로 방출합니다.
async fn stream_lines<R>(reader: BufReader<R>, events: mpsc::Sender<Event>)
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let trimmed = line.trim_end();
                if trimmed.is_empty() {
                    continue;
                }
                counter!(metric::RUNNER_LINES_TOTAL).increment(1);
                if !emit(&events, Event::runner(trimmed, StepStatus::Running)).await {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(error = %e, "output read error");
                break;
            }
        }
    }
}

/// 이벤트를 채널로 보냅니다. 채널이 닫혔으면 `false`를 반환합니다.
async fn emit(events: &mpsc::Sender<Event>, event: Event) -> bool {
    if events.send(event).await.is_err() {
        debug!("event channel closed, dropping runner output");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect_config() -> RunnerBridgeConfig {
        RunnerBridgeConfig {
            allow_commands: true,
            default_args: vec!["true".to_owned()],
            workdir: ".".to_owned(),
        }
    }

    async fn collect_events(mut rx: mpsc::Receiver<Event>) -> Vec<Event> {
        let mut collected = Vec::new();
        while let Some(event) = rx.recv().await {
            collected.push(event);
        }
        collected
    }

    #[tokio::test]
    async fn echo_output_becomes_runner_events() {
        let runner = ProcessRunner::new(collect_config());
        let (tx, rx) = mpsc::channel(64);

        runner.spawn_run(
            vec!["echo".to_owned(), "hello world".to_owned()],
            tx,
        );

        let events = collect_events(rx).await;
        assert!(events.iter().all(|e| e.is_runner()));
        assert!(
            events
                .iter()
                .any(|e| e.line.as_deref() == Some("hello world"))
        );
        // 마지막은 항상 완료 마커
        let last = events.last().unwrap();
        assert!(last.is_finished_marker());
        assert_eq!(last.status, Some(StepStatus::Passed));
    }

    #[tokio::test]
    async fn spawn_failure_emits_error_then_finished() {
        let runner = ProcessRunner::new(collect_config());
        let (tx, rx) = mpsc::channel(64);

        runner.spawn_run(
            vec!["/nonexistent/testdeck-no-such-binary".to_owned()],
            tx,
        );

        let events = collect_events(rx).await;
        assert_eq!(events.len(), 2);
        assert!(events[0].line.as_deref().unwrap().starts_with("Error: "));
        assert_eq!(events[0].status, Some(StepStatus::Failed));
        assert!(events[1].is_finished_marker());
    }

    #[tokio::test]
    async fn disabled_commands_emit_error_without_executing() {
        let config = RunnerBridgeConfig {
            allow_commands: false,
            ..collect_config()
        };
        let runner = ProcessRunner::new(config);
        let (tx, rx) = mpsc::channel(64);

        runner.spawn_run(vec!["echo".to_owned(), "nope".to_owned()], tx);

        let events = collect_events(rx).await;
        assert_eq!(events.len(), 2);
        assert!(events[0].line.as_deref().unwrap().contains("disabled"));
        assert_eq!(events[0].status, Some(StepStatus::Failed));
        assert!(events[1].is_finished_marker());
        // echo 출력이 없어야 함
        assert!(!events.iter().any(|e| e.line.as_deref() == Some("nope")));
    }

    #[tokio::test]
    async fn empty_args_fall_back_to_default_argv() {
        let config = RunnerBridgeConfig {
            default_args: vec!["echo".to_owned(), "from-default".to_owned()],
            ..collect_config()
        };
        let runner = ProcessRunner::new(config);
        let (tx, rx) = mpsc::channel(64);

        runner.spawn_run(Vec::new(), tx);

        let events = collect_events(rx).await;
        assert!(
            events
                .iter()
                .any(|e| e.line.as_deref() == Some("from-default"))
        );
    }

    #[tokio::test]
    async fn nonzero_exit_still_ends_with_finished_marker() {
        let runner = ProcessRunner::new(collect_config());
        let (tx, rx) = mpsc::channel(64);

        runner.spawn_run(vec!["false".to_owned()], tx);

        let events = collect_events(rx).await;
        let last = events.last().unwrap();
        assert!(last.is_finished_marker());
        assert_eq!(last.status, Some(StepStatus::Passed));
    }

    #[tokio::test]
    async fn stderr_lines_are_captured() {
        let runner = ProcessRunner::new(collect_config());
        let (tx, rx) = mpsc::channel(64);

        runner.spawn_run(
            vec![
                "sh".to_owned(),
                "-c".to_owned(),
                "echo err-line >&2".to_owned(),
            ],
            tx,
        );

        let events = collect_events(rx).await;
        assert!(
            events
                .iter()
                .any(|e| e.line.as_deref() == Some("err-line"))
        );
    }
}
