//! 에러 타입 — 도메인별 에러 정의
//!
//! 단일 관찰자 채널이나 외부 프로세스 한 건의 실패는 모두 여기서
//! 정의된 비치명적 에러로 변환되어 격리됩니다. 프로세스 전체를
//! 중단시키는 에러 범주는 없습니다.

/// Testdeck 최상위 에러 타입
#[derive(Debug, thiserror::Error)]
pub enum TestdeckError {
    /// 설정 관련 에러
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// 스트림 레이어 에러
    #[error("stream error: {0}")]
    Stream(#[from] StreamError),

    /// 외부 테스트 러너 에러
    #[error("runner error: {0}")]
    Runner(#[from] RunnerError),

    /// 스토리지 에러
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// 설정 관련 에러
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// 설정 파일을 찾을 수 없음
    #[error("config file not found: {path}")]
    FileNotFound { path: String },

    /// 설정 파싱 실패
    #[error("failed to parse config: {reason}")]
    ParseFailed { reason: String },

    /// 유효하지 않은 설정 값
    #[error("invalid config value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

/// 스트림 레이어 에러 (허브, 포워더)
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// 연결 상한 초과 — 연결 거부이며 크래시가 아님
    #[error("connection capacity exceeded: max {max}")]
    CapacityExceeded { max: usize },

    /// 단일 채널 전달 실패 — 해당 채널만 제거되는 비치명적 에러
    #[error("delivery failed for client {client_id}: {reason}")]
    Delivery { client_id: u64, reason: String },

    /// 채널 전송 실패
    #[error("channel send failed: {0}")]
    ChannelSend(String),

    /// 소켓 바인드 실패
    #[error("failed to bind {addr}: {reason}")]
    Bind { addr: String, reason: String },

    /// 서비스가 이미 실행 중
    #[error("service already running")]
    AlreadyRunning,

    /// 서비스가 실행 중이 아님
    #[error("service not running")]
    NotRunning,
}

/// 외부 테스트 러너 에러
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// 프로세스 스폰 실패
    #[error("failed to spawn '{command}': {reason}")]
    Spawn { command: String, reason: String },

    /// 출력 스트림 읽기 실패
    #[error("runner io error: {0}")]
    Io(String),

    /// 명령 실행이 설정으로 비활성화됨
    #[error("command execution disabled by configuration")]
    Disabled,
}

/// 스토리지 에러 (영속화 협력자)
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// 런 레코드 쓰기 실패
    #[error("failed to write run record: {0}")]
    Write(String),

    /// 런 레코드 읽기 실패
    #[error("failed to read run record: {0}")]
    Read(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn capacity_exceeded_display() {
        let err = StreamError::CapacityExceeded { max: 100 };
        assert!(err.to_string().contains("100"));
    }

    #[test]
    fn delivery_error_display() {
        let err = StreamError::Delivery {
            client_id: 7,
            reason: "channel closed".to_owned(),
        };
        let msg = err.to_string();
        assert!(msg.contains("7"));
        assert!(msg.contains("channel closed"));
    }

    #[test]
    fn sub_errors_convert_to_top_level() {
        let err: TestdeckError = StreamError::ChannelSend("closed".to_owned()).into();
        assert!(matches!(err, TestdeckError::Stream(_)));

        let err: TestdeckError = RunnerError::Disabled.into();
        assert!(matches!(err, TestdeckError::Runner(_)));

        let err: TestdeckError = ConfigError::ParseFailed {
            reason: "bad toml".to_owned(),
        }
        .into();
        assert!(matches!(err, TestdeckError::Config(_)));
    }

    #[test]
    fn spawn_error_includes_command() {
        let err = RunnerError::Spawn {
            command: "cargo test".to_owned(),
            reason: "No such file or directory".to_owned(),
        };
        assert!(err.to_string().contains("cargo test"));
    }

    #[test]
    fn io_error_wraps() {
        let io = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let err: TestdeckError = io.into();
        assert!(err.to_string().contains("pipe closed"));
    }
}
