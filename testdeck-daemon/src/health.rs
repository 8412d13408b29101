//! Aggregated health check reporting.
//!
//! Periodically polls each service's `health_check()` and produces
//! a unified [`DaemonHealth`] report. The overall daemon status is
//! the worst status among all enabled services.
//!
//! # Aggregation Rule
//!
//! - All Healthy -> Healthy
//! - Any Degraded, none Unhealthy -> Degraded(reason)
//! - Any Unhealthy -> Unhealthy(reason)

use serde::Serialize;

use testdeck_core::pipeline::HealthStatus;

/// Aggregated health report for the entire daemon.
#[derive(Debug, Clone, Serialize)]
pub struct DaemonHealth {
    /// Overall daemon health status (worst of all services).
    pub status: HealthStatus,
    /// Daemon uptime in seconds since start.
    pub uptime_secs: u64,
    /// Per-service health reports.
    pub services: Vec<ServiceHealth>,
}

/// Health status for a single service.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    /// Service name (e.g., "hub", "forwarder").
    pub name: String,
    /// Whether the service is enabled in configuration.
    pub enabled: bool,
    /// Current health status of the service.
    pub status: HealthStatus,
}

/// Aggregate multiple service health statuses into a single status.
///
/// Returns the worst status found: Unhealthy > Degraded > Healthy.
/// Only considers enabled services.
pub fn aggregate_status(services: &[ServiceHealth]) -> HealthStatus {
    let enabled = services.iter().filter(|s| s.enabled);

    let mut worst = HealthStatus::Healthy;
    let mut reasons = Vec::new();

    for service in enabled {
        match &service.status {
            HealthStatus::Healthy => {}
            HealthStatus::Degraded(reason) => {
                if !worst.is_unhealthy() {
                    reasons.push(format!("{}: {}", service.name, reason));
                    worst = HealthStatus::Degraded(String::new());
                }
            }
            HealthStatus::Unhealthy(reason) => {
                reasons.push(format!("{}: {}", service.name, reason));
                worst = HealthStatus::Unhealthy(String::new());
            }
        }
    }

    match worst {
        HealthStatus::Healthy => HealthStatus::Healthy,
        HealthStatus::Degraded(_) => HealthStatus::Degraded(reasons.join("; ")),
        HealthStatus::Unhealthy(_) => HealthStatus::Unhealthy(reasons.join("; ")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(name: &str, enabled: bool, status: HealthStatus) -> ServiceHealth {
        ServiceHealth {
            name: name.to_owned(),
            enabled,
            status,
        }
    }

    #[test]
    fn all_healthy() {
        let services = vec![
            service("hub", true, HealthStatus::Healthy),
            service("forwarder", true, HealthStatus::Healthy),
        ];
        assert_eq!(aggregate_status(&services), HealthStatus::Healthy);
    }

    #[test]
    fn degraded_wins_over_healthy() {
        let services = vec![
            service("hub", true, HealthStatus::Healthy),
            service(
                "forwarder",
                true,
                HealthStatus::Degraded("disconnected, 3 frames queued".to_owned()),
            ),
        ];
        match aggregate_status(&services) {
            HealthStatus::Degraded(reason) => assert!(reason.contains("forwarder")),
            other => panic!("expected degraded, got {other:?}"),
        }
    }

    #[test]
    fn unhealthy_wins_over_degraded() {
        let services = vec![
            service("hub", true, HealthStatus::Unhealthy("stopped".to_owned())),
            service("forwarder", true, HealthStatus::Degraded("slow".to_owned())),
        ];
        assert!(aggregate_status(&services).is_unhealthy());
    }

    #[test]
    fn disabled_services_are_ignored() {
        let services = vec![
            service("hub", true, HealthStatus::Healthy),
            service("forwarder", false, HealthStatus::Unhealthy("off".to_owned())),
        ];
        assert_eq!(aggregate_status(&services), HealthStatus::Healthy);
    }

    #[test]
    fn empty_service_list_is_healthy() {
        assert_eq!(aggregate_status(&[]), HealthStatus::Healthy);
    }
}
