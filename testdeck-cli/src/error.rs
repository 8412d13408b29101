//! CLI 에러 타입

use testdeck_core::error::TestdeckError;

/// testdeck CLI 에러
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// 설정 로딩/검증 실패
    #[error("config error: {0}")]
    Config(#[from] TestdeckError),

    /// 허브 연결 실패
    #[error("failed to connect to hub at {addr}: {reason}")]
    Connect {
        /// 시도한 주소
        addr: String,
        /// 실패 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// 직렬화 실패
    #[error("serialize error: {0}")]
    Serialize(#[from] serde_json::Error),
}
