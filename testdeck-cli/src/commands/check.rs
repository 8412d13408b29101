//! `testdeck check` -- 설정 파일 검증

use std::path::Path;

use testdeck_core::config::TestdeckConfig;

use crate::error::CliError;
use crate::output;

/// 설정 파일을 파싱/검증하고 유효 설정 요약을 출력합니다.
pub async fn execute(config_path: &Path) -> Result<(), CliError> {
    let config = TestdeckConfig::from_file(config_path).await?;

    output::print_ok(&format!("configuration OK: {}", config_path.display()));
    println!("  hub.bind_addr        = {}", config.hub.bind_addr);
    println!("  hub.max_connections  = {}", config.hub.max_connections);
    println!("  hub.history_limit    = {}", config.hub.history_limit);
    println!(
        "  forwarder            = {}",
        if config.forwarder.enabled {
            format!("enabled -> {}", config.forwarder.connect_addr)
        } else {
            "disabled".to_owned()
        }
    );
    println!(
        "  runner.allow_commands = {}",
        config.runner.allow_commands
    );
    println!(
        "  metrics              = {}",
        if config.metrics.enabled {
            format!("{}:{}", config.metrics.listen_addr, config.metrics.port)
        } else {
            "disabled".to_owned()
        }
    );

    Ok(())
}
