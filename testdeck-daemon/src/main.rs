//! testdeck-daemon entry point.
//!
//! Loads configuration, initializes logging and metrics, builds the
//! broadcast hub with the process test runner, and manages graceful
//! shutdown. The hub and runner are explicitly constructed, owned
//! services wired here — there are no process-global singletons.

mod cli;
mod health;
mod logging;
mod metrics_server;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use metrics::gauge;

use testdeck_core::config::TestdeckConfig;
use testdeck_core::error::{ConfigError, TestdeckError};
use testdeck_core::metrics as metric;
use testdeck_core::pipeline::{HealthStatus, Pipeline};
use testdeck_stream::{HubBuilder, HubConfig, ProcessRunner, RunnerBridgeConfig};

use crate::cli::DaemonCli;
use crate::health::ServiceHealth;

/// Interval between periodic health reports.
const HEALTH_INTERVAL: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = DaemonCli::parse();

    let mut config = match TestdeckConfig::load(&cli.config).await {
        Ok(config) => config,
        Err(TestdeckError::Config(ConfigError::FileNotFound { .. })) => {
            // Missing config file is not fatal: run on defaults
            eprintln!(
                "config file {} not found, using defaults",
                cli.config.display()
            );
            TestdeckConfig::default()
        }
        Err(e) => return Err(anyhow::anyhow!("failed to load configuration: {}", e)),
    };

    // CLI overrides take precedence over file and environment
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.general.log_format = format.clone();
    }
    if let Some(bind) = &cli.bind {
        config.hub.bind_addr = bind.clone();
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    if cli.validate {
        println!("configuration OK: {}", cli.config.display());
        return Ok(());
    }

    logging::init_tracing(&config.general)?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "testdeck-daemon starting");

    if config.metrics.enabled {
        metrics_server::install_metrics_recorder(&config.metrics)?;
        gauge!(metric::DAEMON_BUILD_INFO, "version" => env!("CARGO_PKG_VERSION")).set(1.0);
    }

    // Inbound run_tests commands are routed to the external process runner
    let runner = Arc::new(ProcessRunner::new(RunnerBridgeConfig::from_core(
        &config.runner,
    )));

    let (mut hub, _handle) = HubBuilder::new()
        .config(HubConfig::from_core(&config.hub))
        .runner(runner)
        .build()
        .map_err(|e| anyhow::anyhow!("failed to build broadcast hub: {}", e))?;

    hub.start()
        .await
        .map_err(|e| anyhow::anyhow!("failed to start broadcast hub: {}", e))?;
    tracing::info!(
        bind_addr = %config.hub.bind_addr,
        history_limit = config.hub.history_limit,
        max_connections = config.hub.max_connections,
        "broadcast hub started"
    );

    let started_at = std::time::Instant::now();
    let mut health_interval = tokio::time::interval(HEALTH_INTERVAL);
    health_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    tracing::info!("testdeck-daemon running — services active");
    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("shutdown signal received");
                break;
            }
            _ = health_interval.tick() => {
                let uptime_secs = started_at.elapsed().as_secs();
                gauge!(metric::DAEMON_UPTIME_SECONDS).set(uptime_secs as f64);

                let services = vec![ServiceHealth {
                    name: "hub".to_owned(),
                    enabled: true,
                    status: hub.health_check().await,
                }];
                match health::aggregate_status(&services) {
                    HealthStatus::Healthy => {
                        tracing::debug!(uptime_secs, clients = hub.client_count(), "health check: healthy");
                    }
                    HealthStatus::Degraded(reason) => {
                        tracing::warn!(uptime_secs, %reason, "health check: degraded");
                    }
                    HealthStatus::Unhealthy(reason) => {
                        tracing::error!(uptime_secs, %reason, "health check: unhealthy");
                    }
                }
            }
        }
    }

    // Graceful shutdown
    if let Err(e) = hub.stop().await {
        tracing::error!(error = %e, "failed to stop broadcast hub");
    }

    tracing::info!("testdeck-daemon shut down");
    Ok(())
}
