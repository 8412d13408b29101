//! 재연결 포워더 -- 프로세스 경계 너머로 이벤트를 무손실 릴레이
//!
//! [`Forwarder`]는 프로듀서와 허브가 다른 프로세스일 때 허브 앞단에
//! 놓이는 클라이언트 측 릴레이입니다. 연결이 끊긴 동안 프레임을
//! 내부 FIFO 큐에 쌓고, 재연결되면 원래 순서 그대로 플러시합니다.
//!
//! # 상태 머신
//! `Disconnected → Connecting → Connected`, 종료/에러 시 다시
//! `Disconnected`. 재연결은 고정 지연(기본 500ms) 후 프로세스가
//! 종료될 때까지 무한히 시도합니다 — 최대 재시도 횟수는 없습니다.
//!
//! # 플러시 규율
//! 큐와 연결 상태 플래그는 송신 경로와 연결 태스크가 공유하는
//! 가변 상태이며 단일 뮤텍스(단일 임계 구역)로 보호됩니다.
//! 플러시는 락 안에서 큐를 스냅샷-후-비우기 하고, 큐가 비어있음을
//! 확인한 락 안에서만 `Connected`로 전환합니다. 따라서 플러시와
//! 경합하는 send는 다음 플러시 라운드의 큐에 들어가며, 비결정적으로
//! 끼어들지 않습니다.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use metrics::{counter, gauge};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use testdeck_core::error::{StreamError, TestdeckError};
use testdeck_core::event::Event;
use testdeck_core::metrics as metric;
use testdeck_core::pipeline::{HealthStatus, Pipeline};

use crate::config::ForwarderConfig;
use crate::error::StreamPipelineError;

/// 포워더 연결 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForwarderState {
    /// 연결 없음 — send는 큐에 쌓임
    Disconnected,
    /// 연결 시도 중 — send는 큐에 쌓임
    Connecting,
    /// 연결됨 — send는 즉시 전달
    Connected,
}

/// 서비스 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum ServiceState {
    Initialized,
    Running,
    Stopped,
}

/// 송신 경로와 연결 태스크가 공유하는 상태
///
/// 모든 읽기/변경은 하나의 뮤텍스 안에서 수행되어
/// connect/disconnect 경합 중 프레임 유실이나 중복을 방지합니다.
struct ForwarderShared {
    state: ForwarderState,
    queue: VecDeque<Bytes>,
    conn_tx: Option<mpsc::UnboundedSender<Bytes>>,
}

/// 재연결 포워더 서비스
///
/// # 사용 예시
/// ```ignore
/// use testdeck_stream::{Forwarder, ForwarderConfig};
///
/// let mut forwarder = Forwarder::new(config)?;
/// forwarder.send(&event)?;   // 시작 전/연결 전에는 큐에 쌓임
/// forwarder.start().await?;  // 백그라운드 재연결 루프 시작
/// ```
pub struct Forwarder {
    config: ForwarderConfig,
    service: ServiceState,
    shared: Arc<Mutex<ForwarderShared>>,
    cancel_token: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
}

impl Forwarder {
    /// 새 포워더를 생성합니다. 설정을 검증합니다.
    pub fn new(config: ForwarderConfig) -> Result<Self, StreamPipelineError> {
        config.validate()?;
        Ok(Self {
            config,
            service: ServiceState::Initialized,
            shared: Arc::new(Mutex::new(ForwarderShared {
                state: ForwarderState::Disconnected,
                queue: VecDeque::new(),
                conn_tx: None,
            })),
            cancel_token: CancellationToken::new(),
            tasks: Vec::new(),
        })
    }

    /// 포이즈닝을 복구하며 공유 상태 락을 획득합니다.
    fn lock_shared(shared: &Mutex<ForwarderShared>) -> MutexGuard<'_, ForwarderShared> {
        shared.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// 이벤트를 직렬화하여 전송합니다.
    ///
    /// 연결 상태면 즉시 전달하고, 아니면 큐에 쌓아 재연결 후
    /// 순서대로 전달합니다. 유실되지 않습니다.
    pub fn send(&self, event: &Event) -> Result<(), StreamPipelineError> {
        let json = event
            .to_json()
            .map_err(|e| StreamPipelineError::Serialize(e.to_string()))?;
        self.send_frame(Bytes::from(json));
        Ok(())
    }

    /// 원시 프레임을 전송합니다.
    pub fn send_frame(&self, frame: Bytes) {
        let mut shared = Self::lock_shared(&self.shared);

        if shared.state == ForwarderState::Connected {
            if let Some(tx) = &shared.conn_tx {
                if tx.send(frame.clone()).is_ok() {
                    return;
                }
            }
            // 연결 태스크가 사라짐 — 큐 경로로 전환
            shared.conn_tx = None;
            shared.state = ForwarderState::Disconnected;
        }

        shared.queue.push_back(frame);
        let queued = shared.queue.len();
        gauge!(metric::FORWARDER_QUEUED_FRAMES).set(queued as f64);
        if queued == self.config.queue_warn_threshold {
            warn!(
                queued,
                connect_addr = %self.config.connect_addr,
                "forwarder queue growing, hub unreachable"
            );
        }
    }

    /// 현재 연결 상태를 반환합니다.
    pub fn state(&self) -> ForwarderState {
        Self::lock_shared(&self.shared).state
    }

    /// 현재 큐에 쌓인 프레임 수를 반환합니다.
    pub fn queued_len(&self) -> usize {
        Self::lock_shared(&self.shared).queue.len()
    }
}

impl Pipeline for Forwarder {
    async fn start(&mut self) -> Result<(), TestdeckError> {
        if self.service == ServiceState::Running {
            return Err(StreamError::AlreadyRunning.into());
        }

        info!(connect_addr = %self.config.connect_addr, "starting forwarder");

        let config = self.config.clone();
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel_token.clone();
        self.tasks.push(tokio::spawn(async move {
            connection_loop(config, shared, cancel).await;
        }));

        self.service = ServiceState::Running;
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), TestdeckError> {
        if self.service != ServiceState::Running {
            return Err(StreamError::NotRunning.into());
        }

        info!("stopping forwarder");
        self.cancel_token.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }

        let mut shared = Self::lock_shared(&self.shared);
        shared.conn_tx = None;
        shared.state = ForwarderState::Disconnected;
        drop(shared);

        self.service = ServiceState::Stopped;
        info!("forwarder stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.service {
            ServiceState::Running => {
                let shared = Self::lock_shared(&self.shared);
                match shared.state {
                    ForwarderState::Connected => HealthStatus::Healthy,
                    _ => HealthStatus::Degraded(format!(
                        "disconnected, {} frames queued",
                        shared.queue.len()
                    )),
                }
            }
            ServiceState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ServiceState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 재연결 루프 — 연결, 플러시, 라이브 전달을 무한 반복합니다.
async fn connection_loop(
    config: ForwarderConfig,
    shared: Arc<Mutex<ForwarderShared>>,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        {
            Forwarder::lock_shared(&shared).state = ForwarderState::Connecting;
        }
        counter!(metric::FORWARDER_RECONNECTS_TOTAL).increment(1);

        let connect_result = tokio::select! {
            result = TcpStream::connect(&config.connect_addr) => result,
            _ = cancel.cancelled() => break,
        };

        match connect_result {
            Ok(stream) => {
                info!(connect_addr = %config.connect_addr, "forwarder connected");
                run_connection(&shared, &cancel, stream).await;
                if cancel.is_cancelled() {
                    break;
                }
                debug!("forwarder connection closed, scheduling reconnect");
            }
            Err(e) => {
                // 허브가 아직 떠있지 않은 동안의 에러는 정상 경로
                debug!(error = %e, "forwarder connect failed, will retry");
                Forwarder::lock_shared(&shared).state = ForwarderState::Disconnected;
            }
        }

        tokio::select! {
            _ = tokio::time::sleep(config.retry_delay()) => {}
            _ = cancel.cancelled() => break,
        }
    }

    Forwarder::lock_shared(&shared).state = ForwarderState::Disconnected;
}

/// 단일 연결의 수명 — 큐 플러시 후 라이브 전달.
///
/// 어떤 실패 경로에서도 미전송 프레임은 원래 순서대로 큐 앞쪽에
/// 복원되어 다음 연결에서 다시 전달됩니다 (무손실, 무중복).
async fn run_connection(
    shared: &Arc<Mutex<ForwarderShared>>,
    cancel: &CancellationToken,
    mut stream: TcpStream,
) {
    // 1단계: 큐 플러시.
    // 락 안에서 스냅샷-후-비우기 하고 락 밖에서 전송합니다.
    // 큐가 비어있음을 확인한 락 안에서만 Connected로 전환하므로,
    // 플러시 중 도착한 send는 다음 라운드 큐에 들어갑니다.
    let mut live_rx = loop {
        let pending: Vec<Bytes> = {
            let mut s = Forwarder::lock_shared(shared);
            if s.queue.is_empty() {
                let (tx, rx) = mpsc::unbounded_channel();
                s.conn_tx = Some(tx);
                s.state = ForwarderState::Connected;
                gauge!(metric::FORWARDER_QUEUED_FRAMES).set(0.0);
                break rx;
            }
            s.queue.drain(..).collect()
        };

        for (idx, frame) in pending.iter().enumerate() {
            if let Err(e) = write_frame(&mut stream, frame).await {
                debug!(error = %e, "flush write failed");
                restore_pending(shared, &pending[idx..], None);
                return;
            }
            counter!(metric::FORWARDER_FLUSHED_TOTAL).increment(1);
        }
    };

    // 2단계: 라이브 전달.
    loop {
        tokio::select! {
            maybe_frame = live_rx.recv() => {
                match maybe_frame {
                    Some(frame) => {
                        if let Err(e) = write_frame(&mut stream, &frame).await {
                            debug!(error = %e, "live write failed");
                            restore_pending(shared, &[frame], Some(&mut live_rx));
                            return;
                        }
                    }
                    None => return,
                }
            }
            _ = cancel.cancelled() => return,
        }
    }
}

/// 실패한 프레임과 잔여 프레임을 순서를 보존하며 큐 앞쪽에 복원합니다.
///
/// 복원 순서: 미전송 프레임 → 라이브 채널 잔여분 → 기존 큐 내용.
/// 라이브 채널은 `conn_tx` 제거 이전에 send된 프레임만 담고 있으므로
/// 이 순서가 원래 송신 순서와 일치합니다.
fn restore_pending(
    shared: &Arc<Mutex<ForwarderShared>>,
    unsent: &[Bytes],
    live_rx: Option<&mut mpsc::UnboundedReceiver<Bytes>>,
) {
    let mut s = Forwarder::lock_shared(shared);
    s.conn_tx = None;
    s.state = ForwarderState::Disconnected;

    let mut restored: VecDeque<Bytes> = unsent.iter().cloned().collect();
    if let Some(rx) = live_rx {
        while let Ok(frame) = rx.try_recv() {
            restored.push_back(frame);
        }
    }
    restored.extend(s.queue.drain(..));
    s.queue = restored;
    gauge!(metric::FORWARDER_QUEUED_FRAMES).set(s.queue.len() as f64);
}

/// 단일 프레임을 개행과 함께 기록합니다.
async fn write_frame(stream: &mut TcpStream, frame: &Bytes) -> std::io::Result<()> {
    stream.write_all(frame).await?;
    stream.write_all(b"\n").await?;
    stream.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use testdeck_core::types::StepStatus;

    fn test_config() -> ForwarderConfig {
        ForwarderConfig {
            connect_addr: "127.0.0.1:1".to_owned(), // 연결 불가 주소
            retry_delay_ms: 10,
            queue_warn_threshold: 100,
        }
    }

    fn step_event(n: usize) -> Event {
        Event::step(
            "visit",
            Some(format!("/page/{n}")),
            Some("NavTest#test_pages".to_owned()),
            StepStatus::Running,
        )
    }

    #[test]
    fn new_forwarder_starts_disconnected() {
        let forwarder = Forwarder::new(test_config()).unwrap();
        assert_eq!(forwarder.state(), ForwarderState::Disconnected);
        assert_eq!(forwarder.queued_len(), 0);
    }

    #[test]
    fn new_rejects_invalid_config() {
        let config = ForwarderConfig {
            connect_addr: "nonsense".to_owned(),
            ..test_config()
        };
        assert!(Forwarder::new(config).is_err());
    }

    #[test]
    fn send_while_disconnected_queues_in_order() {
        let forwarder = Forwarder::new(test_config()).unwrap();
        for n in 0..5 {
            forwarder.send(&step_event(n)).unwrap();
        }
        assert_eq!(forwarder.queued_len(), 5);

        let shared = Forwarder::lock_shared(&forwarder.shared);
        let first = String::from_utf8_lossy(&shared.queue[0]).to_string();
        let last = String::from_utf8_lossy(&shared.queue[4]).to_string();
        assert!(first.contains("/page/0"));
        assert!(last.contains("/page/4"));
    }

    #[test]
    fn send_frame_accepts_raw_bytes() {
        let forwarder = Forwarder::new(test_config()).unwrap();
        forwarder.send_frame(Bytes::from_static(b"{\"raw\":1}"));
        assert_eq!(forwarder.queued_len(), 1);
    }

    #[tokio::test]
    async fn lifecycle_transitions() {
        let mut forwarder = Forwarder::new(test_config()).unwrap();

        assert!(forwarder.health_check().await.is_unhealthy());
        assert!(forwarder.stop().await.is_err());

        forwarder.start().await.unwrap();
        assert!(forwarder.start().await.is_err());

        // 연결 불가 주소이므로 Degraded 상태
        forwarder.send(&step_event(1)).unwrap();
        match forwarder.health_check().await {
            HealthStatus::Degraded(reason) => assert!(reason.contains("queued")),
            other => panic!("expected degraded, got {other:?}"),
        }

        forwarder.stop().await.unwrap();
        assert!(forwarder.health_check().await.is_unhealthy());
        // 정지 후에도 큐는 유지됨
        assert_eq!(forwarder.queued_len(), 1);
    }

    #[test]
    fn restore_pending_preserves_order() {
        let shared = Arc::new(Mutex::new(ForwarderShared {
            state: ForwarderState::Connected,
            queue: VecDeque::from([Bytes::from_static(b"late-1"), Bytes::from_static(b"late-2")]),
            conn_tx: None,
        }));

        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send(Bytes::from_static(b"inflight-1")).unwrap();
        tx.send(Bytes::from_static(b"inflight-2")).unwrap();

        restore_pending(
            &shared,
            &[Bytes::from_static(b"failed")],
            Some(&mut rx),
        );

        let s = Forwarder::lock_shared(&shared);
        assert_eq!(s.state, ForwarderState::Disconnected);
        let order: Vec<&[u8]> = s.queue.iter().map(|b| &b[..]).collect();
        assert_eq!(
            order,
            vec![
                b"failed".as_slice(),
                b"inflight-1".as_slice(),
                b"inflight-2".as_slice(),
                b"late-1".as_slice(),
                b"late-2".as_slice(),
            ]
        );
    }
}
