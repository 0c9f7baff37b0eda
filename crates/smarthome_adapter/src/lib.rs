#![forbid(unsafe_code)]

use std::sync::Arc;

use smarthome_contracts::door::{DoorExchangeReport, DoorOpenOutcome};
use smarthome_contracts::health::HealthReport;
use smarthome_engines::probe::{HttpProbe, UreqProbe};
use smarthome_os::config::ControlCenterConfig;
use smarthome_os::control_center::{ControlCenter, ControlError, NodeSummary};

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct AdapterHealthResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub version: String,
    pub uptime_secs: i64,
    pub action_running: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OtpResponse {
    pub status: String,
    pub otp: String,
    pub length: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct DoorOpenResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub reason_code: Option<u32>,
    pub message_id: Option<u16>,
    pub node_id: Option<u16>,
    pub terminal_state: Option<String>,
    pub detail: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NodeHealthRow {
    pub node_id: u16,
    pub name: String,
    pub reachable: bool,
    pub failure: Option<String>,
    pub message_id: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct NodesHealthResponse {
    pub status: String,
    pub outcome: String,
    pub reason: Option<String>,
    pub all_reachable: bool,
    pub nodes: Vec<NodeHealthRow>,
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct NodesListResponse {
    pub status: String,
    pub nodes: Vec<NodeSummary>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterFailureKind {
    /// Another node action is running; retry later.
    Busy,
    /// The door node is disabled in the registry.
    DoorUnavailable,
    Rejected,
}

impl AdapterFailureKind {
    pub fn outcome(self) -> &'static str {
        match self {
            Self::Busy => "BUSY",
            Self::DoorUnavailable => "DOOR_UNAVAILABLE",
            Self::Rejected => "REJECTED",
        }
    }
}

/// Failure of an adapter call, already mapped to whether the caller should
/// retry later, wait for the registry to change, or treat it as a hard error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterFailure {
    pub kind: AdapterFailureKind,
    pub reason: String,
}

impl AdapterFailure {
    pub fn is_busy(&self) -> bool {
        self.kind == AdapterFailureKind::Busy
    }
}

impl From<ControlError> for AdapterFailure {
    fn from(value: ControlError) -> Self {
        let kind = match value {
            ControlError::Busy => AdapterFailureKind::Busy,
            ControlError::DoorUnavailable(_) => AdapterFailureKind::DoorUnavailable,
            _ => AdapterFailureKind::Rejected,
        };
        Self {
            kind,
            reason: value.to_string(),
        }
    }
}

#[derive(Debug)]
pub struct AdapterRuntime<P = UreqProbe> {
    control: Arc<ControlCenter<P>>,
}

impl<P> Clone for AdapterRuntime<P> {
    fn clone(&self) -> Self {
        Self {
            control: self.control.clone(),
        }
    }
}

impl AdapterRuntime<UreqProbe> {
    pub fn default_from_env() -> Result<Self, ControlError> {
        let control = ControlCenter::from_config(ControlCenterConfig::from_env())?;
        Ok(Self::new(control))
    }
}

impl<P> AdapterRuntime<P>
where
    P: HttpProbe + Clone + Sync,
{
    pub fn new(control: ControlCenter<P>) -> Self {
        Self {
            control: Arc::new(control),
        }
    }

    pub fn control(&self) -> &ControlCenter<P> {
        &self.control
    }

    pub fn health_report(&self) -> AdapterHealthResponse {
        let about = self.control.about();
        AdapterHealthResponse {
            status: "ok".to_string(),
            outcome: "HEALTHY".to_string(),
            reason: None,
            version: about.version.to_string(),
            uptime_secs: about.uptime_secs,
            action_running: self.control.is_action_running(),
        }
    }

    pub fn current_otp(&self) -> OtpResponse {
        let code = self.control.current_otp();
        OtpResponse {
            status: "ok".to_string(),
            length: code.len(),
            otp: code.as_str().to_string(),
        }
    }

    pub fn open_door(&self) -> Result<DoorOpenResponse, AdapterFailure> {
        let report = self.control.open_door()?;
        Ok(door_open_response(&report))
    }

    pub fn check_nodes(&self) -> Result<NodesHealthResponse, AdapterFailure> {
        let report = self.control.check_nodes()?;
        Ok(nodes_health_response(&report))
    }

    pub fn list_nodes(&self) -> NodesListResponse {
        NodesListResponse {
            status: "ok".to_string(),
            nodes: self.control.node_summaries(),
        }
    }
}

pub fn door_open_response(report: &DoorExchangeReport) -> DoorOpenResponse {
    let (outcome, detail) = match &report.outcome {
        DoorOpenOutcome::Opened => ("OPENED", None),
        DoorOpenOutcome::NodeUnreachable => ("NODE_UNREACHABLE", None),
        DoorOpenOutcome::ReachableNotOpened(body) => ("NOT_OPENED", Some(body.clone())),
    };
    DoorOpenResponse {
        status: "ok".to_string(),
        outcome: outcome.to_string(),
        reason: None,
        reason_code: Some(report.outcome.reason_code().0),
        message_id: Some(report.outcome.message_id().id()),
        node_id: Some(report.node_id.0),
        terminal_state: Some(report.terminal_state.as_str().to_string()),
        detail,
    }
}

pub fn door_open_error_response(failure: &AdapterFailure) -> DoorOpenResponse {
    DoorOpenResponse {
        status: "error".to_string(),
        outcome: failure.kind.outcome().to_string(),
        reason: Some(failure.reason.clone()),
        reason_code: None,
        message_id: None,
        node_id: None,
        terminal_state: None,
        detail: None,
    }
}

pub fn nodes_health_response(report: &HealthReport) -> NodesHealthResponse {
    let nodes = report
        .entries()
        .iter()
        .map(|entry| NodeHealthRow {
            node_id: entry.node_id.0,
            name: entry.name.clone(),
            reachable: entry.reachable,
            failure: entry.failure.map(|f| f.as_str().to_string()),
            message_id: entry.message_id().id(),
        })
        .collect();
    let all_reachable = report.all_reachable();
    NodesHealthResponse {
        status: "ok".to_string(),
        outcome: if all_reachable { "ALL_REACHABLE" } else { "DEGRADED" }.to_string(),
        reason: None,
        all_reachable,
        nodes,
    }
}

pub fn nodes_health_error_response(failure: &AdapterFailure) -> NodesHealthResponse {
    NodesHealthResponse {
        status: "error".to_string(),
        outcome: failure.kind.outcome().to_string(),
        reason: Some(failure.reason.clone()),
        all_reachable: false,
        nodes: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smarthome_contracts::probe::{ProbeFailure, ProbeResult};
    use smarthome_engines::registry::NodeRegistry;
    use std::time::Duration;

    const REGISTRY: &str = r#"{
        "nodes": 2,
        "nodes_info": [
            {"name": "Porch", "URL": "http://porch.lan", "active": 1},
            {"name": "Door", "URL": "http://door.lan", "active": 1}
        ]
    }"#;

    #[derive(Debug, Clone, Copy)]
    struct FixedProbe {
        door_body: &'static str,
        porch_up: bool,
    }

    impl HttpProbe for FixedProbe {
        fn get(&self, url: &str, _timeout: Duration) -> ProbeResult {
            if url.starts_with("http://porch.lan") && !self.porch_up {
                return ProbeResult::Failure(ProbeFailure::Connection);
            }
            if url.contains("/opendoor") {
                return ProbeResult::Success(self.door_body.as_bytes().to_vec());
            }
            ProbeResult::Success(Vec::new())
        }
    }

    fn runtime(probe: FixedProbe) -> AdapterRuntime<FixedProbe> {
        let control = ControlCenter::new(
            ControlCenterConfig::mvp_v1(),
            NodeRegistry::from_json_str(REGISTRY).unwrap(),
            probe,
        )
        .unwrap();
        AdapterRuntime::new(control)
    }

    #[test]
    fn at_adapter_01_otp_response_matches_current_code() {
        let rt = runtime(FixedProbe {
            door_body: "esp8266 Door is Open",
            porch_up: true,
        });
        let response = rt.current_otp();
        assert_eq!(response.otp, rt.control().current_otp().as_str());
        assert_eq!(response.length, 4);
    }

    #[test]
    fn at_adapter_02_door_opened_maps_reason_code_and_message() {
        let rt = runtime(FixedProbe {
            door_body: "esp8266 Door is Open",
            porch_up: true,
        });
        let response = rt.open_door().unwrap();
        assert_eq!(response.outcome, "OPENED");
        assert_eq!(response.message_id, Some(8));
        assert_eq!(response.node_id, Some(1));
        assert_eq!(response.terminal_state.as_deref(), Some("OPENED"));
        assert_eq!(response.detail, None);
    }

    #[test]
    fn at_adapter_03_door_not_opened_carries_firmware_body() {
        let rt = runtime(FixedProbe {
            door_body: "Error code 004\n\n",
            porch_up: true,
        });
        let response = rt.open_door().unwrap();
        assert_eq!(response.outcome, "NOT_OPENED");
        assert_eq!(response.message_id, Some(9));
        assert_eq!(response.detail.as_deref(), Some("Error code 004\n\n"));
    }

    #[test]
    fn at_adapter_04_health_rows_report_failures() {
        let rt = runtime(FixedProbe {
            door_body: "",
            porch_up: false,
        });
        let response = rt.check_nodes().unwrap();
        assert_eq!(response.outcome, "DEGRADED");
        assert!(!response.all_reachable);
        assert_eq!(response.nodes.len(), 2);
        assert_eq!(response.nodes[0].failure.as_deref(), Some("connection"));
        assert_eq!(response.nodes[0].message_id, 2);
        assert!(response.nodes[1].reachable);
        assert_eq!(response.nodes[1].message_id, 7);
    }

    #[test]
    fn at_adapter_05_busy_failure_is_flagged() {
        let failure = AdapterFailure::from(ControlError::Busy);
        assert!(failure.is_busy());
        let response = door_open_error_response(&failure);
        assert_eq!(response.outcome, "BUSY");
        assert_eq!(response.status, "error");
        let health = nodes_health_error_response(&failure);
        assert_eq!(health.outcome, "BUSY");
    }

    #[test]
    fn at_adapter_05b_disabled_door_node_maps_to_door_unavailable() {
        let registry = r#"{
            "nodes": 2,
            "nodes_info": [
                {"name": "Porch", "URL": "http://porch.lan", "active": 1},
                {"name": "Door", "URL": "http://door.lan", "active": 0}
            ]
        }"#;
        let control = ControlCenter::new(
            ControlCenterConfig::mvp_v1(),
            NodeRegistry::from_json_str(registry).unwrap(),
            FixedProbe {
                door_body: "esp8266 Door is Open",
                porch_up: true,
            },
        )
        .unwrap();
        let rt = AdapterRuntime::new(control);

        let failure = rt.open_door().unwrap_err();
        assert_eq!(failure.kind, AdapterFailureKind::DoorUnavailable);
        assert_eq!(door_open_error_response(&failure).outcome, "DOOR_UNAVAILABLE");

        let health = rt.check_nodes().unwrap();
        assert_eq!(health.outcome, "ALL_REACHABLE");
        assert_eq!(health.nodes.len(), 1);
    }

    #[test]
    fn at_adapter_06_health_and_node_listing() {
        let rt = runtime(FixedProbe {
            door_body: "",
            porch_up: true,
        });
        let health = rt.health_report();
        assert_eq!(health.outcome, "HEALTHY");
        assert!(!health.action_running);
        let nodes = rt.list_nodes();
        assert_eq!(nodes.nodes.len(), 2);
        assert!(nodes.nodes[1].door);
    }

    #[test]
    fn at_adapter_07_door_response_wire_shape() {
        let rt = runtime(FixedProbe {
            door_body: "esp8266 Door is Open",
            porch_up: true,
        });
        let value = serde_json::to_value(rt.open_door().unwrap()).unwrap();
        assert_eq!(value["status"], "ok");
        assert_eq!(value["outcome"], "OPENED");
        assert_eq!(value["node_id"], 1);
        assert!(value["reason"].is_null());
        let nodes = serde_json::to_value(rt.list_nodes()).unwrap();
        assert_eq!(nodes["nodes"][0]["name"], "Porch");
        assert_eq!(nodes["nodes"][1]["door"], true);
    }
}
