//! 서브커맨드 구현

pub mod check;
pub mod classify;
pub mod run;
pub mod watch;

use std::path::Path;

use testdeck_core::config::TestdeckConfig;
use testdeck_core::error::{ConfigError, TestdeckError};

use crate::error::CliError;

/// 설정 파일을 로드합니다. 파일이 없으면 기본값으로 동작합니다.
pub async fn load_config(path: &Path) -> Result<TestdeckConfig, CliError> {
    match TestdeckConfig::load(path).await {
        Ok(config) => Ok(config),
        Err(TestdeckError::Config(ConfigError::FileNotFound { .. })) => {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Ok(TestdeckConfig::default())
        }
        Err(e) => Err(e.into()),
    }
}
