//! 설정 관리 — testdeck.toml 파싱 및 런타임 설정
//!
//! [`TestdeckConfig`]는 모든 모듈의 설정을 담는 최상위 구조체입니다.
//!
//! # 설정 로딩 우선순위
//! 1. CLI 인자 (최고 우선)
//! 2. 환경변수 (`TESTDECK_HUB_BIND_ADDR=0.0.0.0:4000` 형식)
//! 3. 설정 파일 (`testdeck.toml`)
//! 4. 기본값 (`Default` 구현)
//!
//! # 사용 예시
//! ```no_run
//! # async fn example() -> Result<(), testdeck_core::error::TestdeckError> {
//! use testdeck_core::config::TestdeckConfig;
//!
//! // 파일에서 로드 + 환경변수 오버라이드
//! let config = TestdeckConfig::load("testdeck.toml").await?;
//!
//! // TOML 문자열에서 직접 파싱
//! let config = TestdeckConfig::parse("[general]\nlog_level = \"debug\"")?;
//! # Ok(())
//! # }
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{ConfigError, TestdeckError};

/// Testdeck 통합 설정
///
/// `testdeck.toml` 파일의 최상위 구조를 나타냅니다.
/// 각 모듈은 자기 섹션만 읽어 사용합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TestdeckConfig {
    /// 일반 설정
    #[serde(default)]
    pub general: GeneralConfig,
    /// 브로드캐스트 허브 설정
    #[serde(default)]
    pub hub: HubConfig,
    /// 재연결 포워더 설정
    #[serde(default)]
    pub forwarder: ForwarderConfig,
    /// 외부 테스트 러너 설정
    #[serde(default)]
    pub runner: RunnerConfig,
    /// 메트릭 노출 설정
    #[serde(default)]
    pub metrics: MetricsConfig,
}

impl TestdeckConfig {
    /// TOML 파일에서 설정을 로드하고 환경변수 오버라이드를 적용합니다.
    ///
    /// 설정 로딩 순서:
    /// 1. TOML 파일 파싱
    /// 2. 환경변수 오버라이드 적용
    pub async fn load(path: impl AsRef<Path>) -> Result<Self, TestdeckError> {
        let mut config = Self::from_file(path).await?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// TOML 파일에서 설정을 로드합니다 (환경변수 오버라이드 없음).
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, TestdeckError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TestdeckError::Config(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                })
            } else {
                TestdeckError::Io(e)
            }
        })?;
        let config = Self::parse(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// TOML 문자열에서 설정을 파싱합니다.
    pub fn parse(toml_str: &str) -> Result<Self, TestdeckError> {
        toml::from_str(toml_str).map_err(|e| {
            TestdeckError::Config(ConfigError::ParseFailed {
                reason: e.to_string(),
            })
        })
    }

    /// 환경변수로 설정값을 오버라이드합니다.
    ///
    /// 환경변수 네이밍 규칙: `TESTDECK_{SECTION}_{FIELD}`
    /// 예: `TESTDECK_HUB_BIND_ADDR=0.0.0.0:4000`
    pub fn apply_env_overrides(&mut self) {
        // General
        override_string(&mut self.general.log_level, "TESTDECK_GENERAL_LOG_LEVEL");
        override_string(&mut self.general.log_format, "TESTDECK_GENERAL_LOG_FORMAT");
        override_string(&mut self.general.data_dir, "TESTDECK_GENERAL_DATA_DIR");

        // Hub
        override_string(&mut self.hub.bind_addr, "TESTDECK_HUB_BIND_ADDR");
        override_usize(&mut self.hub.max_connections, "TESTDECK_HUB_MAX_CONNECTIONS");
        override_usize(&mut self.hub.history_limit, "TESTDECK_HUB_HISTORY_LIMIT");
        override_usize(&mut self.hub.client_buffer, "TESTDECK_HUB_CLIENT_BUFFER");

        // Forwarder
        override_bool(&mut self.forwarder.enabled, "TESTDECK_FORWARDER_ENABLED");
        override_string(
            &mut self.forwarder.connect_addr,
            "TESTDECK_FORWARDER_CONNECT_ADDR",
        );
        override_u64(
            &mut self.forwarder.retry_delay_ms,
            "TESTDECK_FORWARDER_RETRY_DELAY_MS",
        );
        override_usize(
            &mut self.forwarder.queue_warn_threshold,
            "TESTDECK_FORWARDER_QUEUE_WARN_THRESHOLD",
        );

        // Runner
        override_bool(&mut self.runner.allow_commands, "TESTDECK_RUNNER_ALLOW_COMMANDS");
        override_csv(&mut self.runner.default_args, "TESTDECK_RUNNER_DEFAULT_ARGS");
        override_string(&mut self.runner.workdir, "TESTDECK_RUNNER_WORKDIR");

        // Metrics
        override_bool(&mut self.metrics.enabled, "TESTDECK_METRICS_ENABLED");
        override_string(&mut self.metrics.listen_addr, "TESTDECK_METRICS_LISTEN_ADDR");
        override_u16(&mut self.metrics.port, "TESTDECK_METRICS_PORT");
    }

    /// 설정값의 유효성을 검증합니다.
    pub fn validate(&self) -> Result<(), TestdeckError> {
        // log_level 검증
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.general.log_level.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_level".to_owned(),
                reason: format!("must be one of: {}", valid_levels.join(", ")),
            }
            .into());
        }

        // log_format 검증
        let valid_formats = ["json", "pretty"];
        if !valid_formats.contains(&self.general.log_format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "general.log_format".to_owned(),
                reason: format!("must be one of: {}", valid_formats.join(", ")),
            }
            .into());
        }

        // 허브 설정 검증
        if self.hub.bind_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(ConfigError::InvalidValue {
                field: "hub.bind_addr".to_owned(),
                reason: format!("'{}' is not a valid socket address", self.hub.bind_addr),
            }
            .into());
        }
        if self.hub.max_connections == 0 {
            return Err(ConfigError::InvalidValue {
                field: "hub.max_connections".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }
        if self.hub.history_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "hub.history_limit".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }
        if self.hub.client_buffer == 0 {
            return Err(ConfigError::InvalidValue {
                field: "hub.client_buffer".to_owned(),
                reason: "must be greater than 0".to_owned(),
            }
            .into());
        }

        // 포워더 설정 검증
        if self.forwarder.enabled {
            if self
                .forwarder
                .connect_addr
                .parse::<std::net::SocketAddr>()
                .is_err()
            {
                return Err(ConfigError::InvalidValue {
                    field: "forwarder.connect_addr".to_owned(),
                    reason: format!(
                        "'{}' is not a valid socket address",
                        self.forwarder.connect_addr
                    ),
                }
                .into());
            }
            if self.forwarder.retry_delay_ms == 0 {
                return Err(ConfigError::InvalidValue {
                    field: "forwarder.retry_delay_ms".to_owned(),
                    reason: "must be greater than 0".to_owned(),
                }
                .into());
            }
        }

        // 러너 설정 검증
        if self.runner.allow_commands && self.runner.default_args.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "runner.default_args".to_owned(),
                reason: "must not be empty when commands are allowed".to_owned(),
            }
            .into());
        }

        Ok(())
    }
}

// Default는 derive 매크로로 자동 생성 (각 필드가 Default를 구현하므로)

/// 일반 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// 로그 레벨 (trace, debug, info, warn, error)
    pub log_level: String,
    /// 로그 형식 (json, pretty)
    pub log_format: String,
    /// 데이터 디렉토리 (완료된 런 레코드 저장 위치)
    pub data_dir: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_owned(),
            log_format: "json".to_owned(),
            data_dir: "/var/lib/testdeck".to_owned(),
        }
    }
}

/// 브로드캐스트 허브 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// 관찰자 수신 주소
    pub bind_addr: String,
    /// 최대 동시 관찰자 연결 수
    pub max_connections: usize,
    /// 재생 히스토리 버퍼 용량 (이벤트 수)
    pub history_limit: usize,
    /// 관찰자당 송신 큐 용량 — 가득 차면 해당 채널은 전달 실패로 간주
    pub client_buffer: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:4000".to_owned(),
            max_connections: 100,
            history_limit: 1000,
            client_buffer: 256,
        }
    }
}

/// 재연결 포워더 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForwarderConfig {
    /// 활성화 여부 — 프로듀서와 허브가 다른 프로세스일 때만 사용
    pub enabled: bool,
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
            enabled: false,
            connect_addr: "127.0.0.1:4000".to_owned(),
            retry_delay_ms: 500,
            queue_warn_threshold: 10_000,
        }
    }
}

/// 외부 테스트 러너 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// 인바운드 `run_tests` 명령 실행 허용 여부
    pub allow_commands: bool,
    /// 인자가 없는 명령의 기본 argv
    pub default_args: Vec<String>,
    /// 명령 실행 작업 디렉토리
    pub workdir: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            allow_commands: true,
            default_args: vec!["cargo".to_owned(), "test".to_owned()],
            workdir: ".".to_owned(),
        }
    }
}

/// 메트릭 노출 설정
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Prometheus 엔드포인트 활성화 여부
    pub enabled: bool,
    /// 수신 주소
    pub listen_addr: String,
    /// 수신 포트
    pub port: u16,
    /// 스크레이프 경로
    pub endpoint: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen_addr: "127.0.0.1".to_owned(),
            port: 9301,
            endpoint: "/metrics".to_owned(),
        }
    }
}

// --- 환경변수 오버라이드 헬퍼 ---

fn override_string(target: &mut String, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val;
    }
}

fn override_bool(target: &mut bool, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<bool>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse bool from env var, ignoring"
            ),
        }
    }
}

fn override_usize(target: &mut usize, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<usize>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse usize from env var, ignoring"
            ),
        }
    }
}

fn override_u64(target: &mut u64, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u64>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u64 from env var, ignoring"
            ),
        }
    }
}

fn override_u16(target: &mut u16, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        match val.parse::<u16>() {
            Ok(parsed) => *target = parsed,
            Err(_) => warn!(
                env_key,
                value = val.as_str(),
                "failed to parse u16 from env var, ignoring"
            ),
        }
    }
}

fn override_csv(target: &mut Vec<String>, env_key: &str) {
    if let Ok(val) = std::env::var(env_key) {
        *target = val.split(',').map(|s| s.trim().to_owned()).collect();
    }
}
