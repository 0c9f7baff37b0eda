#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Local};
use serde::Serialize;
use smarthome_contracts::door::DoorExchangeReport;
use smarthome_contracts::health::HealthReport;
use smarthome_contracts::message::MessageId;
use smarthome_contracts::node::NodeId;
use smarthome_contracts::otp::OtpCode;
use smarthome_contracts::{ContractViolation, Validate};
use smarthome_engines::door::{DoorAccessProtocol, DoorBindError};
use smarthome_engines::health::NodeHealthMonitor;
use smarthome_engines::otp::OtpGenerator;
use smarthome_engines::probe::{HttpProbe, ProbeBuildError, UreqProbe};
use smarthome_engines::registry::{ConfigError, NodeRegistry};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::ControlCenterConfig;
use crate::scheduler::{Scheduler, SchedulerEvent};

pub const CONTROL_CENTER_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Debug)]
pub enum ControlError {
    Config(ConfigError),
    InvalidConfig(ContractViolation),
    Probe(ProbeBuildError),
    Door(DoorBindError),
    DoorUnavailable(NodeId),
    Busy,
}

impl std::fmt::Display for ControlError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(err) => write!(f, "configuration error: {err}"),
            Self::InvalidConfig(violation) => write!(f, "invalid configuration: {violation}"),
            Self::Probe(err) => write!(f, "probe setup failed: {err}"),
            Self::Door(err) => write!(f, "{err}"),
            Self::DoorUnavailable(id) => {
                write!(f, "door node {id} is disabled, door opening unavailable")
            }
            Self::Busy => write!(f, "another node action is still running"),
        }
    }
}

impl std::error::Error for ControlError {}

impl From<ConfigError> for ControlError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<ContractViolation> for ControlError {
    fn from(value: ContractViolation) -> Self {
        Self::InvalidConfig(value)
    }
}

impl From<ProbeBuildError> for ControlError {
    fn from(value: ProbeBuildError) -> Self {
        Self::Probe(value)
    }
}

impl From<DoorBindError> for ControlError {
    fn from(value: DoorBindError) -> Self {
        Self::Door(value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AboutInfo {
    pub version: &'static str,
    pub started_at: DateTime<Local>,
    pub uptime_secs: i64,
    pub message_id: MessageId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeSummary {
    pub id: NodeId,
    pub name: String,
    pub url: String,
    pub enabled: bool,
    pub door: bool,
}

/// Owns the registry, the current OTP and the protocol engines for one
/// process. Door opening and health checks are mutually exclusive: while one
/// runs, the other is refused with [`ControlError::Busy`].
///
/// A disabled door node does not stop the process; only `open_door` is
/// refused, health checks keep running.
#[derive(Debug)]
pub struct ControlCenter<P> {
    config: ControlCenterConfig,
    registry: Arc<NodeRegistry>,
    otp: Arc<OtpGenerator>,
    door: Result<DoorAccessProtocol<P>, NodeId>,
    health: NodeHealthMonitor<P>,
    action_running: AtomicBool,
    started_at: DateTime<Local>,
}

impl ControlCenter<UreqProbe> {
    pub fn from_config(config: ControlCenterConfig) -> Result<Self, ControlError> {
        config.validate()?;
        let registry = NodeRegistry::load(&config.nodes_file)?;
        let probe = UreqProbe::new(config.probe_config())?;
        Self::new(config, registry, probe)
    }
}

impl<P> ControlCenter<P>
where
    P: HttpProbe + Clone + Sync,
{
    pub fn new(
        config: ControlCenterConfig,
        registry: NodeRegistry,
        probe: P,
    ) -> Result<Self, ControlError> {
        config.validate()?;
        let door = match DoorAccessProtocol::bind(
            &registry,
            config.door_access_config(),
            probe.clone(),
        ) {
            Ok(door) => Ok(door),
            Err(DoorBindError::NodeDisabled(id)) => {
                warn!(door_node_id = %id, "door node is disabled, door opening unavailable");
                Err(id)
            }
            Err(err) => return Err(err.into()),
        };
        let health = NodeHealthMonitor::new(config.health_check_config(), probe);
        let otp = Arc::new(OtpGenerator::new(config.otp_length));
        info!(
            nodes = registry.count(),
            door_node_id = %config.door_node_id,
            door_available = door.is_ok(),
            "control center ready"
        );
        Ok(Self {
            config,
            registry: Arc::new(registry),
            otp,
            door,
            health,
            action_running: AtomicBool::new(false),
            started_at: Local::now(),
        })
    }

    pub fn config(&self) -> &ControlCenterConfig {
        &self.config
    }

    pub fn registry(&self) -> &NodeRegistry {
        &self.registry
    }

    pub fn otp(&self) -> Arc<OtpGenerator> {
        self.otp.clone()
    }

    pub fn current_otp(&self) -> OtpCode {
        self.otp.current()
    }

    pub fn door_node_id(&self) -> NodeId {
        self.config.door_node_id
    }

    pub fn is_door_available(&self) -> bool {
        self.door.is_ok()
    }

    pub fn spawn_scheduler(&self) -> (Scheduler, mpsc::Receiver<SchedulerEvent>) {
        Scheduler::spawn(self.config.scheduler_config(), self.otp.clone())
    }

    pub fn open_door(&self) -> Result<DoorExchangeReport, ControlError> {
        let door = self.door.as_ref().map_err(|&id| ControlError::DoorUnavailable(id))?;
        let _guard = self.begin_action("open_door")?;
        let report = door.open_door(&self.otp);
        info!(
            node_id = %report.node_id,
            state = report.terminal_state.as_str(),
            reason_code = report.outcome.reason_code().0,
            "door exchange finished"
        );
        Ok(report)
    }

    pub fn check_nodes(&self) -> Result<HealthReport, ControlError> {
        self.check_nodes_with(|| {})
    }

    /// Like [`Self::check_nodes`], calling `on_started` once the check has
    /// been accepted and before any node is contacted.
    pub fn check_nodes_with<F>(&self, on_started: F) -> Result<HealthReport, ControlError>
    where
        F: FnOnce(),
    {
        let _guard = self.begin_action("check_nodes")?;
        on_started();
        Ok(self.health.check_all(&self.registry))
    }

    pub fn is_action_running(&self) -> bool {
        self.action_running.load(Ordering::Acquire)
    }

    pub fn node_summaries(&self) -> Vec<NodeSummary> {
        let door_id = self.config.door_node_id;
        self.registry
            .nodes()
            .iter()
            .map(|node| NodeSummary {
                id: node.id,
                name: node.name.clone(),
                url: node.base_url.clone(),
                enabled: node.enabled,
                door: node.id == door_id,
            })
            .collect()
    }

    pub fn about(&self) -> AboutInfo {
        AboutInfo {
            version: CONTROL_CENTER_VERSION,
            started_at: self.started_at,
            uptime_secs: (Local::now() - self.started_at).num_seconds().max(0),
            message_id: MessageId::About,
        }
    }

    fn begin_action(&self, action: &'static str) -> Result<ActionGuard<'_>, ControlError> {
        if self
            .action_running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(action, "refused, another node action is running");
            return Err(ControlError::Busy);
        }
        Ok(ActionGuard {
            flag: &self.action_running,
        })
    }
}

struct ActionGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for ActionGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
