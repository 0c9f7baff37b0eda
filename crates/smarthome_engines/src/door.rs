#![forbid(unsafe_code)]

use std::time::Duration;

use smarthome_contracts::door::{DoorAccessState, DoorExchangeReport, DoorOpenOutcome};
use smarthome_contracts::node::NodeId;
use smarthome_contracts::otp::OtpCode;
use smarthome_contracts::probe::ProbeResult;
use smarthome_contracts::{ContractViolation, Validate};
use tracing::{debug, info, warn};

use crate::otp::OtpGenerator;
use crate::probe::HttpProbe;
use crate::registry::{NodeNotFound, NodeRegistry};

pub const DOOR_MARKER_DEFAULT: &str = "esp8266";
pub const DOOR_NODE_ID_DEFAULT: NodeId = NodeId(1);
pub const API_OTP: &str = "/otp";
pub const API_OPENDOOR: &str = "/opendoor";
pub const APIPARM_PASS: &str = "pass";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DoorAccessConfig {
    pub door_node_id: NodeId,
    pub timeout: Duration,
    pub marker: String,
}

impl DoorAccessConfig {
    pub fn mvp_v1() -> Self {
        Self {
            door_node_id: DOOR_NODE_ID_DEFAULT,
            timeout: Duration::from_secs(3),
            marker: DOOR_MARKER_DEFAULT.to_string(),
        }
    }
}

impl Validate for DoorAccessConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.timeout.is_zero() {
            return Err(ContractViolation::InvalidValue {
                field: "door_access_config.timeout",
                reason: "must be > 0",
            });
        }
        if self.marker.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "door_access_config.marker",
                reason: "must not be empty",
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DoorBindError {
    NodeNotFound(NodeNotFound),
    NodeDisabled(NodeId),
    InvalidConfig(ContractViolation),
}

impl std::fmt::Display for DoorBindError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NodeNotFound(err) => write!(f, "door node unavailable: {err}"),
            Self::NodeDisabled(id) => write!(f, "door node {id} is disabled"),
            Self::InvalidConfig(violation) => write!(f, "invalid door access config: {violation}"),
        }
    }
}

impl std::error::Error for DoorBindError {}

impl From<NodeNotFound> for DoorBindError {
    fn from(value: NodeNotFound) -> Self {
        Self::NodeNotFound(value)
    }
}

impl From<ContractViolation> for DoorBindError {
    fn from(value: ContractViolation) -> Self {
        Self::InvalidConfig(value)
    }
}

/// Two-phase door opening against one enabled node: validate the code, then
/// ask the node to open with the same code.
///
/// Callers must not run two exchanges at once; nothing in here locks.
#[derive(Debug, Clone)]
pub struct DoorAccessProtocol<P> {
    node_id: NodeId,
    node_name: String,
    base_url: String,
    timeout: Duration,
    marker: String,
    probe: P,
}

impl<P> DoorAccessProtocol<P>
where
    P: HttpProbe,
{
    pub fn bind(
        registry: &NodeRegistry,
        config: DoorAccessConfig,
        probe: P,
    ) -> Result<Self, DoorBindError> {
        config.validate()?;
        let node = registry.node(config.door_node_id)?;
        if !node.enabled {
            return Err(DoorBindError::NodeDisabled(node.id));
        }
        Ok(Self {
            node_id: node.id,
            node_name: node.name.clone(),
            base_url: node.base_url.clone(),
            timeout: config.timeout,
            marker: config.marker,
            probe,
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn node_name(&self) -> &str {
        &self.node_name
    }

    pub fn open_door(&self, otp: &OtpGenerator) -> DoorExchangeReport {
        let code = otp.current();
        self.run_exchange(code)
    }

    pub fn run_exchange(&self, code: OtpCode) -> DoorExchangeReport {
        let mut exchange = DoorExchange::new(self.node_id);

        exchange.advance(DoorAccessState::ValidatingOtp);
        let validate = self
            .probe
            .get(&exchange_url(&self.base_url, API_OTP, &code), self.timeout);
        if let ProbeResult::Failure(reason) = validate {
            warn!(node_id = %self.node_id, error = %reason, "door node unreachable on otp validation");
            exchange.advance(DoorAccessState::OtpRejected);
            return exchange.finish(DoorOpenOutcome::NodeUnreachable, code);
        }

        exchange.advance(DoorAccessState::OpeningDoor);
        let outcome = match self
            .probe
            .get(&exchange_url(&self.base_url, API_OPENDOOR, &code), self.timeout)
        {
            ProbeResult::Failure(reason) => {
                warn!(node_id = %self.node_id, error = %reason, "door node unreachable on open request");
                DoorOpenOutcome::NodeUnreachable
            }
            ProbeResult::Success(body) => interpret_open_door_response(&body, &self.marker),
        };
        if outcome.is_opened() {
            exchange.advance(DoorAccessState::Opened);
            info!(node_id = %self.node_id, "door opened");
        } else {
            exchange.advance(DoorAccessState::NotOpened);
        }
        exchange.finish(outcome, code)
    }
}

// Single seam for firmware response sniffing: the opener echoes a device-family
// marker instead of using HTTP status codes.
pub fn interpret_open_door_response(body: &[u8], marker: &str) -> DoorOpenOutcome {
    let text = String::from_utf8_lossy(body);
    if text.contains(marker) {
        DoorOpenOutcome::Opened
    } else {
        DoorOpenOutcome::ReachableNotOpened(text.into_owned())
    }
}

fn exchange_url(base_url: &str, api: &str, code: &OtpCode) -> String {
    format!("{base_url}{api}?{APIPARM_PASS}={code}")
}

struct DoorExchange {
    node_id: NodeId,
    state: DoorAccessState,
}

impl DoorExchange {
    fn new(node_id: NodeId) -> Self {
        Self {
            node_id,
            state: DoorAccessState::Idle,
        }
    }

    fn advance(&mut self, next: DoorAccessState) {
        debug_assert!(
            self.state.can_transition_to(next),
            "illegal door transition {} -> {}",
            self.state.as_str(),
            next.as_str()
        );
        debug!(
            node_id = %self.node_id,
            from = self.state.as_str(),
            to = next.as_str(),
            "door exchange transition"
        );
        self.state = next;
    }

    fn finish(self, outcome: DoorOpenOutcome, otp_used: OtpCode) -> DoorExchangeReport {
        DoorExchangeReport {
            node_id: self.node_id,
            outcome,
            terminal_state: self.state,
            otp_used,
        }
    }
}
