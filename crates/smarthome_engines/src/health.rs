#![forbid(unsafe_code)]

use std::thread;
use std::time::Duration;

use smarthome_contracts::health::{HealthReport, NodeHealth};
use smarthome_contracts::node::Node;
use smarthome_contracts::probe::{ProbeFailure, ProbeResult};
use tracing::{debug, info, warn};

use crate::probe::HttpProbe;
use crate::registry::NodeRegistry;

pub const HEALTH_RETRY_BACKOFF_MS_DEFAULT: u64 = 250;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthCheckConfig {
    pub timeout: Duration,
    // Total probe attempts per node. Door calls never retry; only these root probes do.
    pub attempts: u8,
    pub retry_backoff: Duration,
    pub parallel: bool,
}

impl HealthCheckConfig {
    pub fn mvp_v1() -> Self {
        Self {
            timeout: Duration::from_secs(3),
            attempts: 1,
            retry_backoff: Duration::from_millis(HEALTH_RETRY_BACKOFF_MS_DEFAULT),
            parallel: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct NodeHealthMonitor<P> {
    config: HealthCheckConfig,
    probe: P,
}

impl<P> NodeHealthMonitor<P>
where
    P: HttpProbe + Sync,
{
    pub fn new(config: HealthCheckConfig, probe: P) -> Self {
        Self { config, probe }
    }

    pub fn config(&self) -> HealthCheckConfig {
        self.config
    }

    pub fn check_all(&self, registry: &NodeRegistry) -> HealthReport {
        let report = if self.config.parallel {
            self.check_all_parallel(registry)
        } else {
            self.check_all_sequential(registry)
        };
        info!(
            checked = report.len(),
            unreachable = report.unreachable().count(),
            "node health check completed"
        );
        report
    }

    pub fn check_all_sequential(&self, registry: &NodeRegistry) -> HealthReport {
        let entries = registry
            .nodes()
            .iter()
            .filter(|node| node.enabled)
            .map(|node| self.check_node(node))
            .collect();
        HealthReport::from_entries(entries)
    }

    pub fn check_all_parallel(&self, registry: &NodeRegistry) -> HealthReport {
        let entries = thread::scope(|scope| {
            let handles: Vec<_> = registry
                .nodes()
                .iter()
                .filter(|node| node.enabled)
                .map(|node| (node, scope.spawn(move || self.check_node(node))))
                .collect();
            handles
                .into_iter()
                .map(|(node, handle)| {
                    handle.join().unwrap_or_else(|_| {
                        warn!(node_id = %node.id, "health probe worker panicked");
                        NodeHealth::unreachable(node.id, node.name.clone(), ProbeFailure::Transport)
                    })
                })
                .collect()
        });
        HealthReport::from_entries(entries)
    }

    pub fn check_node(&self, node: &Node) -> NodeHealth {
        let attempts = self.config.attempts.max(1);
        let mut last_failure = ProbeFailure::Transport;
        for attempt in 1..=attempts {
            match self.probe.get(&node.base_url, self.config.timeout) {
                // Health only needs an answer; the body is not inspected.
                ProbeResult::Success(_) => {
                    debug!(node_id = %node.id, attempt, "node responding");
                    return NodeHealth::reachable(node.id, node.name.clone());
                }
                ProbeResult::Failure(reason) => {
                    debug!(node_id = %node.id, attempt, error = %reason, "node probe failed");
                    last_failure = reason;
                    if attempt < attempts {
                        thread::sleep(self.config.retry_backoff * u32::from(attempt));
                    }
                }
            }
        }
        warn!(node_id = %node.id, name = %node.name, error = %last_failure, "node not responding");
        NodeHealth::unreachable(node.id, node.name.clone(), last_failure)
    }
}
