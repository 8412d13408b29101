//! 브로드캐스트 허브 -- 관찰자 연결 수락, 재생, 팬아웃, 인바운드 라우팅
//!
//! [`BroadcastHub`]는 개행 구분 JSON 관찰자 연결을 수락하고,
//! 새 연결에 히스토리 버퍼 전체를 재생한 뒤 이후 모든 이벤트를
//! 연결된 전체 관찰자에게 팬아웃합니다. 각 연결은 별도의 tokio
//! 태스크(reader/writer)에서 처리됩니다.
//!
//! # 실패 격리
//! 단일 채널의 전달 실패는 해당 채널 제거(암묵적 disconnect)로만
//! 이어지며, 나머지 관찰자 전달과 허브 자체에는 영향을 주지 않습니다.
//! 연결 상한 도달은 거부이지 크래시가 아닙니다.
//!
//! # 공유 상태
//! 라이브 연결 집합 + 히스토리 버퍼가 동시 connect/disconnect/broadcast
//! 간 공유되는 유일한 상태이며, 단일 뮤텍스로 보호됩니다.
//! 락 구간 안에서는 await하지 않습니다.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

use bytes::Bytes;
use metrics::{counter, gauge};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use testdeck_core::error::{StreamError, TestdeckError};
use testdeck_core::event::{COMMAND_RUN_TESTS, Event};
use testdeck_core::metrics as metric;
use testdeck_core::pipeline::{CommandRunner, HealthStatus, Pipeline};

use crate::config::HubConfig;
use crate::error::StreamPipelineError;
use crate::history::HistoryBuffer;

/// 서비스 실행 상태
#[derive(Debug, Clone, PartialEq, Eq)]
enum ServiceState {
    /// 초기화됨, 아직 시작하지 않음
    Initialized,
    /// 실행 중
    Running,
    /// 정지됨
    Stopped,
}

/// 등록된 관찰자 채널
struct HubClient {
    id: u64,
    tx: mpsc::Sender<Bytes>,
}

/// 허브 공유 상태 — 라이브 연결 집합과 재생 히스토리
///
/// connect/disconnect/broadcast/inbound가 모두 이 상태를 거칩니다.
/// 전송은 `try_send`만 사용하므로 락 구간에 await가 없습니다.
pub struct HubState {
    clients: Vec<HubClient>,
    history: HistoryBuffer,
    next_client_id: u64,
    max_connections: usize,
    /// 전달 실패로 제거된 채널 수 (통계용)
    delivery_failures: u64,
}

impl HubState {
    /// 새 허브 상태를 생성합니다.
    pub fn new(config: &HubConfig) -> Self {
        Self {
            clients: Vec::new(),
            history: HistoryBuffer::new(config.history_limit),
            next_client_id: 0,
            max_connections: config.max_connections,
            delivery_failures: 0,
        }
    }

    /// 관찰자 채널을 등록하고 재생 스냅샷을 반환합니다.
    ///
    /// 라이브 연결 수가 상한 이상이면 `Capacity` 에러로 거부합니다.
    /// 반환된 스냅샷은 호출자가 라이브 프레임 이전에 순서대로
    /// 전달해야 합니다 (등록 이후의 브로드캐스트는 채널에 쌓이므로
    /// 재생 → 라이브 순서가 보존됩니다).
    pub fn connect(
        &mut self,
        tx: mpsc::Sender<Bytes>,
    ) -> Result<(u64, Vec<Bytes>), StreamPipelineError> {
        if self.clients.len() >= self.max_connections {
            counter!(metric::HUB_REJECTED_CONNECTIONS_TOTAL).increment(1);
            return Err(StreamPipelineError::Capacity {
                max: self.max_connections,
            });
        }

        let id = self.next_client_id;
        self.next_client_id += 1;
        self.clients.push(HubClient { id, tx });
        gauge!(metric::HUB_CONNECTED_CLIENTS).set(self.clients.len() as f64);

        Ok((id, self.history.snapshot()))
    }

    /// 관찰자 채널을 제거합니다. 멱등 연산입니다.
    pub fn disconnect(&mut self, client_id: u64) {
        let before = self.clients.len();
        self.clients.retain(|c| c.id != client_id);
        if self.clients.len() != before {
            debug!(client_id, remaining = self.clients.len(), "client disconnected");
        }
        gauge!(metric::HUB_CONNECTED_CLIENTS).set(self.clients.len() as f64);
    }

    /// 이벤트를 직렬화하여 기록하고 팬아웃합니다.
    pub fn broadcast_event(&mut self, event: &Event) {
        match event.to_json() {
            Ok(json) => {
                counter!(metric::HUB_EVENTS_BROADCAST_TOTAL).increment(1);
                self.broadcast_frame(Bytes::from(json));
            }
            Err(e) => {
                // 직렬화 실패는 해당 이벤트만 버리고 파이프라인은 유지
                error!(error = %e, "failed to serialize event, dropping");
            }
        }
    }

    /// 원시 프레임을 히스토리에 기록하고 모든 관찰자에게 팬아웃합니다.
    ///
    /// 전달이 실패한 채널은 제거되며, 나머지 채널 전달은 계속됩니다.
    pub fn broadcast_frame(&mut self, frame: Bytes) {
        self.history.record(frame.clone());
        gauge!(metric::HUB_HISTORY_SIZE).set(self.history.len() as f64);

        let mut failures = 0u64;
        self.clients.retain(|client| {
            match client.tx.try_send(frame.clone()) {
                Ok(()) => {
                    counter!(metric::HUB_FRAMES_DELIVERED_TOTAL).increment(1);
                    true
                }
                Err(e) => {
                    // 전달 실패 = 암묵적 disconnect, 다른 채널에는 영향 없음
                    warn!(client_id = client.id, error = %e, "delivery failed, removing client");
                    failures += 1;
                    false
                }
            }
        });

        if failures > 0 {
            self.delivery_failures += failures;
            counter!(metric::HUB_DELIVERY_FAILURES_TOTAL).increment(failures);
            gauge!(metric::HUB_CONNECTED_CLIENTS).set(self.clients.len() as f64);
        }
    }

    /// 현재 연결된 관찰자 수를 반환합니다.
    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    /// 전달 실패로 제거된 채널의 누적 수를 반환합니다.
    pub fn delivery_failures(&self) -> u64 {
        self.delivery_failures
    }

    /// 히스토리 버퍼에 대한 불변 참조를 반환합니다.
    pub fn history(&self) -> &HistoryBuffer {
        &self.history
    }
}

/// 허브 태스크들이 공유하는 핸들 묶음
struct HubShared {
    state: Mutex<HubState>,
    runner: Arc<dyn CommandRunner>,
    producer_tx: mpsc::Sender<Event>,
}

impl HubShared {
    /// 포이즈닝을 복구하며 상태 락을 획득합니다.
    fn lock_state(&self) -> MutexGuard<'_, HubState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// 프로듀서 측 핸들 — 이벤트를 허브로 보냅니다.
///
/// 복제 가능하며, 전달은 fire-and-forget입니다: 어떤 관찰자의
/// 수신 확인도 기다리지 않습니다.
#[derive(Clone)]
pub struct HubHandle {
    tx: mpsc::Sender<Event>,
}

impl HubHandle {
    /// 이벤트를 허브로 전송합니다 (프로듀서 채널이 가득 차면 대기).
    pub async fn broadcast(&self, event: Event) -> Result<(), StreamPipelineError> {
        self.tx
            .send(event)
            .await
            .map_err(|e| StreamPipelineError::Channel(e.to_string()))
    }

    /// 이벤트를 허브로 전송합니다 (대기 없음).
    ///
    /// 테스트 스텝을 절대 지연시키지 않아야 하는 계측 경로에서
    /// 사용합니다. 채널이 가득 차면 이벤트를 버리고 `false`를
    /// 반환합니다.
    pub fn try_broadcast(&self, event: Event) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "producer channel full or closed, dropping event");
                false
            }
        }
    }
}

/// 브로드캐스트 허브 서비스
///
/// core의 `Pipeline` trait을 구현하여 `testdeck-daemon`에서
/// 다른 모듈과 동일한 생명주기로 관리됩니다.
///
/// # 사용 예시
/// ```ignore
/// use testdeck_stream::{HubBuilder, ProcessRunner};
///
/// let (mut hub, handle) = HubBuilder::new()
///     .config(config)
///     .runner(Arc::new(runner))
///     .build()?;
///
/// hub.start().await?;
/// handle.broadcast(event).await?;
/// ```
pub struct BroadcastHub {
    config: HubConfig,
    state: ServiceState,
    shared: Arc<HubShared>,
    producer_rx: Option<mpsc::Receiver<Event>>,
    cancel_token: CancellationToken,
    tasks: Vec<tokio::task::JoinHandle<()>>,
    local_addr: Option<SocketAddr>,
}

impl BroadcastHub {
    /// 현재 상태 이름을 반환합니다.
    pub fn state_name(&self) -> &str {
        match self.state {
            ServiceState::Initialized => "initialized",
            ServiceState::Running => "running",
            ServiceState::Stopped => "stopped",
        }
    }

    /// 실제 바인드된 주소를 반환합니다 (시작 후에만 `Some`).
    ///
    /// 포트 0으로 바인드한 경우 실제 포트를 확인할 때 사용합니다.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr
    }

    /// 현재 연결된 관찰자 수를 반환합니다.
    pub fn client_count(&self) -> usize {
        self.shared.lock_state().client_count()
    }

    /// 히스토리 버퍼에 보관 중인 프레임 수를 반환합니다.
    pub fn history_len(&self) -> usize {
        self.shared.lock_state().history().len()
    }
}

impl Pipeline for BroadcastHub {
    async fn start(&mut self) -> Result<(), TestdeckError> {
        if self.state == ServiceState::Running {
            return Err(StreamError::AlreadyRunning.into());
        }

        info!(bind_addr = %self.config.bind_addr, "starting broadcast hub");

        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|e| StreamPipelineError::Bind {
                addr: self.config.bind_addr.clone(),
                reason: e.to_string(),
            })
            .map_err(TestdeckError::from)?;

        let local_addr = listener.local_addr().map_err(TestdeckError::Io)?;
        self.local_addr = Some(local_addr);
        info!(%local_addr, "broadcast hub listening");

        // 수락 루프 태스크
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel_token.clone();
        let client_buffer = self.config.client_buffer;
        self.tasks.push(tokio::spawn(async move {
            accept_loop(listener, shared, cancel, client_buffer).await;
        }));

        // 프로듀서 브로드캐스트 태스크
        let shared = Arc::clone(&self.shared);
        let cancel = self.cancel_token.clone();
        let mut producer_rx = self
            .producer_rx
            .take()
            .ok_or_else(|| StreamPipelineError::Channel("producer channel already taken".to_owned()))
            .map_err(TestdeckError::from)?;
        self.tasks.push(tokio::spawn(async move {
            loop {
                tokio::select! {
                    maybe_event = producer_rx.recv() => {
                        match maybe_event {
                            Some(event) => shared.lock_state().broadcast_event(&event),
                            None => {
                                debug!("producer channel closed");
                                break;
                            }
                        }
                    }
                    _ = cancel.cancelled() => break,
                }
            }
        }));

        self.state = ServiceState::Running;
        info!("broadcast hub started");
        Ok(())
    }

    async fn stop(&mut self) -> Result<(), TestdeckError> {
        if self.state != ServiceState::Running {
            return Err(StreamError::NotRunning.into());
        }

        info!("stopping broadcast hub");
        self.cancel_token.cancel();
        for task in self.tasks.drain(..) {
            task.abort();
        }
        self.state = ServiceState::Stopped;
        info!("broadcast hub stopped");
        Ok(())
    }

    async fn health_check(&self) -> HealthStatus {
        match self.state {
            ServiceState::Running => {
                let state = self.shared.lock_state();
                if state.client_count() >= self.config.max_connections {
                    HealthStatus::Degraded(format!(
                        "connection cap reached: {}/{}",
                        state.client_count(),
                        self.config.max_connections
                    ))
                } else {
                    HealthStatus::Healthy
                }
            }
            ServiceState::Initialized => HealthStatus::Unhealthy("not started".to_owned()),
            ServiceState::Stopped => HealthStatus::Unhealthy("stopped".to_owned()),
        }
    }
}

/// 브로드캐스트 허브 빌더
///
/// 허브를 구성하고 프로듀서 채널을 생성합니다.
pub struct HubBuilder {
    config: HubConfig,
    runner: Option<Arc<dyn CommandRunner>>,
}

impl HubBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self {
            config: HubConfig::default(),
            runner: None,
        }
    }

    /// 허브 설정을 지정합니다.
    pub fn config(mut self, config: HubConfig) -> Self {
        self.config = config;
        self
    }

    /// 인바운드 `run_tests` 명령을 처리할 러너 협력자를 지정합니다.
    ///
    /// 지정하지 않으면 명령 실행이 비활성화된 기본 러너가 사용됩니다.
    pub fn runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = Some(runner);
        self
    }

    /// 허브를 빌드합니다.
    ///
    /// # Returns
    /// - `BroadcastHub`: 허브 서비스 인스턴스
    /// - `HubHandle`: 프로듀서 측 핸들
    pub fn build(self) -> Result<(BroadcastHub, HubHandle), StreamPipelineError> {
        self.config.validate()?;

        let (producer_tx, producer_rx) = mpsc::channel(self.config.producer_buffer);

        let runner = self.runner.unwrap_or_else(|| {
            Arc::new(crate::runner::ProcessRunner::new(
                crate::config::RunnerBridgeConfig {
                    allow_commands: false,
                    ..Default::default()
                },
            ))
        });

        let shared = Arc::new(HubShared {
            state: Mutex::new(HubState::new(&self.config)),
            runner,
            producer_tx: producer_tx.clone(),
        });

        let hub = BroadcastHub {
            config: self.config,
            state: ServiceState::Initialized,
            shared,
            producer_rx: Some(producer_rx),
            cancel_token: CancellationToken::new(),
            tasks: Vec::new(),
            local_addr: None,
        };

        Ok((hub, HubHandle { tx: producer_tx }))
    }
}

impl Default for HubBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// 연결 수락 루프
async fn accept_loop(
    listener: TcpListener,
    shared: Arc<HubShared>,
    cancel: CancellationToken,
    client_buffer: usize,
) {
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        debug!(%addr, "accepted observer connection");
                        handle_new_connection(stream, &shared, &cancel, client_buffer);
                    }
                    Err(e) => {
                        error!(error = %e, "accept error");
                    }
                }
            }
            _ = cancel.cancelled() => {
                info!("broadcast hub received shutdown signal");
                break;
            }
        }
    }
}

/// 새 관찰자 연결을 등록하고 reader/writer 태스크를 스폰합니다.
///
/// 상한 초과 연결은 등록 없이 스트림을 버려 즉시 닫습니다.
fn handle_new_connection(
    stream: TcpStream,
    shared: &Arc<HubShared>,
    cancel: &CancellationToken,
    client_buffer: usize,
) {
    let (tx, rx) = mpsc::channel::<Bytes>(client_buffer);

    let (client_id, snapshot) = match shared.lock_state().connect(tx) {
        Ok(reply) => reply,
        Err(e) => {
            warn!(error = %e, "rejecting observer connection");
            // 거부: 스트림 드롭으로 즉시 닫힘
            return;
        }
    };
    info!(client_id, replay = snapshot.len(), "observer connected");

    let (read_half, write_half) = stream.into_split();

    let writer_shared = Arc::clone(shared);
    let writer_cancel = cancel.clone();
    tokio::spawn(async move {
        client_writer(write_half, snapshot, rx, writer_shared, client_id, writer_cancel).await;
    });

    let reader_shared = Arc::clone(shared);
    let reader_cancel = cancel.clone();
    tokio::spawn(async move {
        client_reader(read_half, reader_shared, client_id, reader_cancel).await;
    });
}

/// 단일 프레임을 개행과 함께 기록합니다.
async fn write_frame(write_half: &mut OwnedWriteHalf, frame: &Bytes) -> std::io::Result<()> {
    write_half.write_all(frame).await?;
    write_half.write_all(b"\n").await?;
    write_half.flush().await
}

/// 관찰자 송신 태스크 — 재생 스냅샷을 먼저, 이후 라이브 프레임을 전달합니다.
async fn client_writer(
    mut write_half: OwnedWriteHalf,
    snapshot: Vec<Bytes>,
    mut rx: mpsc::Receiver<Bytes>,
    shared: Arc<HubShared>,
    client_id: u64,
    cancel: CancellationToken,
) {
    // 재생: 등록 이후의 브로드캐스트는 rx에 쌓이므로
    // 히스토리 → 라이브 순서가 보존됩니다
    for frame in &snapshot {
        if let Err(e) = write_frame(&mut write_half, frame).await {
            debug!(client_id, error = %e, "replay write failed");
            shared.lock_state().disconnect(client_id);
            return;
        }
    }

    loop {
        tokio::select! {
            maybe_frame = rx.recv() => {
                match maybe_frame {
                    Some(frame) => {
                        if let Err(e) = write_frame(&mut write_half, &frame).await {
                            debug!(client_id, error = %e, "live write failed");
                            shared.lock_state().disconnect(client_id);
                            break;
                        }
                    }
                    // 채널 닫힘 = 허브 측에서 이미 제거됨
                    None => break,
                }
            }
            _ = cancel.cancelled() => break,
        }
    }
}

/// 관찰자 수신 태스크 — 인바운드 라인을 명령 라우팅 또는 릴레이합니다.
async fn client_reader(
    read_half: OwnedReadHalf,
    shared: Arc<HubShared>,
    client_id: u64,
    cancel: CancellationToken,
) {
    let mut reader = BufReader::new(read_half);
    let mut line = String::new();

    loop {
        line.clear();
        tokio::select! {
            result = reader.read_line(&mut line) => {
                match result {
                    Ok(0) => {
                        debug!(client_id, "connection closed by peer");
                        break;
                    }
                    Ok(_) => handle_inbound(&shared, client_id, &line),
                    Err(e) => {
                        debug!(client_id, error = %e, "read error");
                        break;
                    }
                }
            }
            _ = cancel.cancelled() => break,
        }
    }

    shared.lock_state().disconnect(client_id);
}

/// 인바운드 메시지를 처리합니다.
///
/// `{"command": "run_tests", "args": [...]}` 형태는 러너 협력자로
/// 라우팅하고, 그 외 모든 메시지는 전체 관찰자에게 그대로
/// 재브로드캐스트합니다 (단순 릴레이 폴백).
fn handle_inbound(shared: &Arc<HubShared>, client_id: u64, raw: &str) {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return;
    }

    debug!(client_id, len = trimmed.len(), "received inbound message");

    let parsed: Option<serde_json::Value> = serde_json::from_str(trimmed).ok();
    let is_run_command = parsed
        .as_ref()
        .and_then(|v| v.get("command"))
        .and_then(|c| c.as_str())
        == Some(COMMAND_RUN_TESTS);

    if is_run_command {
        let args: Vec<String> = parsed
            .as_ref()
            .and_then(|v| v.get("args"))
            .and_then(|a| a.as_array())
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str().map(str::to_owned))
                    .collect()
            })
            .unwrap_or_default();

        info!(client_id, command = args.join(" "), "executing test command");
        shared
            .runner
            .spawn_run(args, shared.producer_tx.clone());
    } else {
        shared
            .lock_state()
            .broadcast_frame(Bytes::from(trimmed.to_owned()));
    }
}
