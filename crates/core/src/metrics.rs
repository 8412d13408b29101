//! 메트릭 상수 및 설명 등록
//!
//! 모든 Prometheus 메트릭의 이름과 설명을 중앙에서 정의합니다.
//! 각 모듈은 이 상수를 사용하여 `metrics::counter!()`, `metrics::gauge!()`
//! 매크로를 호출합니다.
//!
//! # 네이밍 컨벤션
//!
//! - 접두어: `testdeck_`
//! - 모듈명: `hub_`, `forwarder_`, `runner_`, `aggregate_`
//! - 접미어: `_total` (counter), 없음 (gauge)
//!
//! # 사용 예시
//!
//! ```ignore
//! use metrics::counter;
//!
//! counter!(testdeck_core::metrics::HUB_EVENTS_BROADCAST_TOTAL).increment(1);
//! ```

// ─── 레이블 키 상수 ────────────────────────────────────────────────

/// 이벤트 종류 레이블 키 (runner, step)
pub const LABEL_KIND: &str = "kind";

/// 결과 레이블 키 (success, failure)
pub const LABEL_RESULT: &str = "result";

// ─── Broadcast Hub 메트릭 ──────────────────────────────────────────

/// Hub: 브로드캐스트된 이벤트 수 (counter)
pub const HUB_EVENTS_BROADCAST_TOTAL: &str = "testdeck_hub_events_broadcast_total";

/// Hub: 관찰자에게 전달된 프레임 수 (counter)
pub const HUB_FRAMES_DELIVERED_TOTAL: &str = "testdeck_hub_frames_delivered_total";

/// Hub: 전달 실패로 제거된 관찰자 수 (counter)
pub const HUB_DELIVERY_FAILURES_TOTAL: &str = "testdeck_hub_delivery_failures_total";

/// Hub: 상한 초과로 거부된 연결 수 (counter)
pub const HUB_REJECTED_CONNECTIONS_TOTAL: &str = "testdeck_hub_rejected_connections_total";

/// Hub: 현재 연결된 관찰자 수 (gauge)
pub const HUB_CONNECTED_CLIENTS: &str = "testdeck_hub_connected_clients";

/// Hub: 히스토리 버퍼 내 이벤트 수 (gauge)
pub const HUB_HISTORY_SIZE: &str = "testdeck_hub_history_size";

// ─── Forwarder 메트릭 ──────────────────────────────────────────────

/// Forwarder: 연결 끊김 중 큐에 쌓인 프레임 수 (gauge)
pub const FORWARDER_QUEUED_FRAMES: &str = "testdeck_forwarder_queued_frames";

/// Forwarder: 재연결 시도 수 (counter)
pub const FORWARDER_RECONNECTS_TOTAL: &str = "testdeck_forwarder_reconnects_total";

/// Forwarder: 재연결 후 플러시된 프레임 수 (counter)
pub const FORWARDER_FLUSHED_TOTAL: &str = "testdeck_forwarder_flushed_total";

// ─── Runner 메트릭 ─────────────────────────────────────────────────

/// Runner: 방출된 러너 출력 라인 수 (counter)
pub const RUNNER_LINES_TOTAL: &str = "testdeck_runner_lines_total";

/// Runner: 실행된 외부 명령 수 (counter, label: result)
pub const RUNNER_COMMANDS_TOTAL: &str = "testdeck_runner_commands_total";

// ─── Aggregate 메트릭 ──────────────────────────────────────────────

/// Aggregate: 트리 재계산 횟수 (counter)
pub const AGGREGATE_REBUILDS_TOTAL: &str = "testdeck_aggregate_rebuilds_total";

// ─── Daemon 메트릭 ─────────────────────────────────────────────────

/// Daemon: 가동 시간 (gauge, 초)
pub const DAEMON_UPTIME_SECONDS: &str = "testdeck_daemon_uptime_seconds";

/// Daemon: 빌드 정보 (gauge, 항상 1, labels: version)
pub const DAEMON_BUILD_INFO: &str = "testdeck_daemon_build_info";

// ─── 설명 등록 함수 ─────────────────────────────────────────────────

/// 모든 메트릭의 설명(description)을 등록합니다.
///
/// `metrics::describe_counter!()`, `describe_gauge!()`를 호출하여
/// Prometheus HELP 텍스트를 설정합니다.
///
/// 이 함수는 전역 레코더 설치 후 한 번만 호출해야 합니다.
/// 일반적으로 `testdeck-daemon`의 시작 시점에서 호출합니다.
pub fn describe_all() {
    use metrics::{describe_counter, describe_gauge};

    // Broadcast Hub
    describe_counter!(
        HUB_EVENTS_BROADCAST_TOTAL,
        "Total number of events recorded and fanned out by the hub"
    );
    describe_counter!(
        HUB_FRAMES_DELIVERED_TOTAL,
        "Total number of frames delivered to observer channels"
    );
    describe_counter!(
        HUB_DELIVERY_FAILURES_TOTAL,
        "Total number of observers removed after a failed delivery"
    );
    describe_counter!(
        HUB_REJECTED_CONNECTIONS_TOTAL,
        "Total number of connections refused at the connection cap"
    );
    describe_gauge!(
        HUB_CONNECTED_CLIENTS,
        "Number of observers currently connected to the hub"
    );
    describe_gauge!(
        HUB_HISTORY_SIZE,
        "Number of events currently held in the replay history buffer"
    );

    // Forwarder
    describe_gauge!(
        FORWARDER_QUEUED_FRAMES,
        "Number of frames queued while the forwarder is disconnected"
    );
    describe_counter!(
        FORWARDER_RECONNECTS_TOTAL,
        "Total number of forwarder reconnection attempts"
    );
    describe_counter!(
        FORWARDER_FLUSHED_TOTAL,
        "Total number of queued frames flushed after a reconnect"
    );

    // Runner
    describe_counter!(
        RUNNER_LINES_TOTAL,
        "Total number of external process output lines emitted as runner events"
    );
    describe_counter!(
        RUNNER_COMMANDS_TOTAL,
        "Total number of external test commands executed"
    );

    // Aggregate
    describe_counter!(
        AGGREGATE_REBUILDS_TOTAL,
        "Total number of full tree recomputations"
    );

    // Daemon
    describe_gauge!(DAEMON_UPTIME_SECONDS, "Testdeck daemon uptime in seconds");
    describe_gauge!(
        DAEMON_BUILD_INFO,
        "Build information (always 1, with version label)"
    );
}
