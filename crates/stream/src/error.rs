//! 스트림 레이어 에러 타입
//!
//! [`StreamPipelineError`]는 분배 레이어 내부에서 발생하는 모든 에러를 표현합니다.
//! `From<StreamPipelineError> for TestdeckError` 변환이 구현되어 있어
//! 상위 레이어에서 `?` 연산자로 자연스럽게 전파할 수 있습니다.
//!
//! 단일 채널의 전달 실패([`StreamPipelineError::Delivery`])는 해당 채널
//! 제거로만 이어지는 비치명적 에러이며, 허브 자체를 중단시키지 않습니다.

use testdeck_core::error::{StreamError, TestdeckError};

/// 스트림 레이어 도메인 에러
///
/// 소켓 바인드, 연결 수락, 전달, 채널 통신 등 허브와 포워더 내부의
/// 모든 에러 상황을 포괄합니다.
#[derive(Debug, thiserror::Error)]
pub enum StreamPipelineError {
    /// 소켓 바인드 실패
    #[error("bind error: {addr}: {reason}")]
    Bind {
        /// 바인드 주소
        addr: String,
        /// 실패 사유
        reason: String,
    },

    /// 연결 수락 실패
    #[error("accept error: {0}")]
    Accept(String),

    /// 연결 상한 초과 — 연결 거부, 크래시 아님
    #[error("connection capacity exceeded: max {max}")]
    Capacity {
        /// 설정된 최대 연결 수
        max: usize,
    },

    /// 단일 관찰자 채널 전달 실패 — 해당 채널만 제거됨
    #[error("delivery failed for client {client_id}: {reason}")]
    Delivery {
        /// 실패한 관찰자 ID
        client_id: u64,
        /// 실패 사유
        reason: String,
    },

    /// 내부 채널 통신 에러
    #[error("channel error: {0}")]
    Channel(String),

    /// 이벤트 직렬화 실패
    #[error("serialize error: {0}")]
    Serialize(String),

    /// 설정 에러
    #[error("config error: {field}: {reason}")]
    Config {
        /// 설정 필드명
        field: String,
        /// 에러 사유
        reason: String,
    },

    /// I/O 에러
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StreamPipelineError> for TestdeckError {
    fn from(err: StreamPipelineError) -> Self {
        match err {
            StreamPipelineError::Capacity { max } => {
                TestdeckError::Stream(StreamError::CapacityExceeded { max })
            }
            StreamPipelineError::Delivery { client_id, reason } => {
                TestdeckError::Stream(StreamError::Delivery { client_id, reason })
            }
            StreamPipelineError::Bind { addr, reason } => {
                TestdeckError::Stream(StreamError::Bind { addr, reason })
            }
            StreamPipelineError::Io(e) => TestdeckError::Io(e),
            other => TestdeckError::Stream(StreamError::ChannelSend(other.to_string())),
        }
    }
}
