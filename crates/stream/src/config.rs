//! 스트림 레이어 설정
//!
//! [`HubConfig`]와 [`ForwarderConfig`]는 core의
//! [`TestdeckConfig`](testdeck_core::config::TestdeckConfig) 해당 섹션을
//! 기반으로 스트림 레이어 전용 설정을 제공합니다.
//!
//! # 사용 예시
//! ```ignore
//! use testdeck_core::config::TestdeckConfig;
//! use testdeck_stream::config::HubConfig;
//!
//! let core_config = TestdeckConfig::default();
//! let config = HubConfig::from_core(&core_config.hub);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StreamPipelineError;

/// 브로드캐스트 허브 설정
///
/// core의 `HubConfig`에서 파생되며, 허브 내부에서 사용하는
/// 추가 설정을 포함합니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HubConfig {
    /// 관찰자 수신 주소
    pub bind_addr: String,
    /// 최대 동시 관찰자 연결 수
    pub max_connections: usize,
    /// 재생 히스토리 버퍼 용량 (이벤트 수)
    pub history_limit: usize,
    /// 관찰자당 송신 큐 용량 — 가득 차면 전달 실패로 간주
    pub client_buffer: usize,

    // --- 확장 설정 (core에 없는 추가 필드) ---
    /// 프로듀서 → 허브 이벤트 채널 용량
    pub producer_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4000".to_owned(),
            max_connections: 100,
            history_limit: 1000,
            client_buffer: 256,
            producer_buffer: 1024,
        }
    }
}

impl HubConfig {
    /// core의 `HubConfig`에서 허브 설정을 생성합니다.
    ///
    /// core 설정에 없는 확장 필드는 기본값이 적용됩니다.
    pub fn from_core(core: &testdeck_core::config::HubConfig) -> Self {
        Self {
            bind_addr: core.bind_addr.clone(),
            max_connections: core.max_connections,
            history_limit: core.history_limit,
            client_buffer: core.client_buffer,
            ..Self::default()
        }
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), StreamPipelineError> {
        const MAX_HISTORY_LIMIT: usize = 1_000_000;

        if self.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(StreamPipelineError::Config {
                field: "bind_addr".to_owned(),
                reason: format!("'{}' is not a valid socket address", self.bind_addr),
            });
        }
        if self.max_connections == 0 {
            return Err(StreamPipelineError::Config {
                field: "max_connections".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.history_limit == 0 || self.history_limit > MAX_HISTORY_LIMIT {
            return Err(StreamPipelineError::Config {
                field: "history_limit".to_owned(),
                reason: format!("must be 1-{MAX_HISTORY_LIMIT}"),
            });
        }
        if self.client_buffer == 0 {
            return Err(StreamPipelineError::Config {
                field: "client_buffer".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        if self.producer_buffer == 0 {
            return Err(StreamPipelineError::Config {
                field: "producer_buffer".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        Ok(())
    }
}

/// 허브 설정 빌더
#[derive(Default)]
pub struct HubConfigBuilder {
    config: HubConfig,
}

impl HubConfigBuilder {
    /// 새 빌더를 생성합니다.
    pub fn new() -> Self {
        Self::default()
    }

    /// 바인드 주소를 설정합니다.
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.config.bind_addr = addr.into();
        self
    }

    /// 최대 연결 수를 설정합니다.
    pub fn max_connections(mut self, max: usize) -> Self {
        self.config.max_connections = max;
        self
    }

    /// 히스토리 버퍼 용량을 설정합니다.
    pub fn history_limit(mut self, limit: usize) -> Self {
        self.config.history_limit = limit;
        self
    }

    /// 관찰자당 송신 큐 용량을 설정합니다.
    pub fn client_buffer(mut self, capacity: usize) -> Self {
        self.config.client_buffer = capacity;
        self
    }

    /// 프로듀서 채널 용량을 설정합니다.
    pub fn producer_buffer(mut self, capacity: usize) -> Self {
        self.config.producer_buffer = capacity;
        self
    }

    /// 설정을 검증하고 `HubConfig`를 생성합니다.
    pub fn build(self) -> Result<HubConfig, StreamPipelineError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// 재연결 포워더 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForwarderConfig {
    /// 허브 연결 주소
    pub connect_addr: String,
    /// 재연결 시도 간격 (밀리초)
    pub retry_delay_ms: u64,
    /// 큐 길이가 이 값을 넘으면 경고 로그 (드롭하지 않음)
    pub queue_warn_threshold: usize,
}

impl Default for ForwarderConfig {
    fn default() -> Self {
        Self {
            connect_addr: "127.0.0.1:4000".to_owned(),
            retry_delay_ms: 500,
            queue_warn_threshold: 10_000,
        }
    }
}

impl ForwarderConfig {
    /// core의 `ForwarderConfig`에서 포워더 설정을 생성합니다.
    pub fn from_core(core: &testdeck_core::config::ForwarderConfig) -> Self {
        Self {
            connect_addr: core.connect_addr.clone(),
            retry_delay_ms: core.retry_delay_ms,
            queue_warn_threshold: core.queue_warn_threshold,
        }
    }

    /// 재연결 간격을 `Duration`으로 반환합니다.
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), StreamPipelineError> {
        if self.connect_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(StreamPipelineError::Config {
                field: "connect_addr".to_owned(),
                reason: format!("'{}' is not a valid socket address", self.connect_addr),
            });
        }
        if self.retry_delay_ms == 0 {
            return Err(StreamPipelineError::Config {
                field: "retry_delay_ms".to_owned(),
                reason: "must be greater than 0".to_owned(),
            });
        }
        Ok(())
    }
}

/// 외부 테스트 러너 브리지 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerBridgeConfig {
    /// 인바운드 `run_tests` 명령 실행 허용 여부
    pub allow_commands: bool,
    /// 인자가 없는 명령의 기본 argv
    pub default_args: Vec<String>,
    /// 명령 실행 작업 디렉토리
    pub workdir: String,
}

impl Default for RunnerBridgeConfig {
    fn default() -> Self {
        Self {
            allow_commands: true,
            default_args: vec!["cargo".to_owned(), "test".to_owned()],
            workdir: ".".to_owned(),
        }
    }
}

impl RunnerBridgeConfig {
    /// core의 `RunnerConfig`에서 브리지 설정을 생성합니다.
    pub fn from_core(core: &testdeck_core::config::RunnerConfig) -> Self {
        Self {
            allow_commands: core.allow_commands,
            default_args: core.default_args.clone(),
            workdir: core.workdir.clone(),
        }
    }
}
