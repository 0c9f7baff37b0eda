#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::message::MessageId;
use crate::node::NodeId;
use crate::probe::ProbeFailure;
use crate::{ContractViolation, Validate};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHealth {
    pub node_id: NodeId,
    pub name: String,
    pub reachable: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<ProbeFailure>,
}

impl NodeHealth {
    pub fn reachable(node_id: NodeId, name: String) -> Self {
        Self {
            node_id,
            name,
            reachable: true,
            failure: None,
        }
    }

    pub fn unreachable(node_id: NodeId, name: String, failure: ProbeFailure) -> Self {
        Self {
            node_id,
            name,
            reachable: false,
            failure: Some(failure),
        }
    }

    pub fn message_id(&self) -> MessageId {
        if self.reachable {
            MessageId::NodeResponding
        } else {
            MessageId::NodeNotResponding
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HealthReport {
    entries: Vec<NodeHealth>,
}

impl HealthReport {
    pub fn v1(entries: Vec<NodeHealth>) -> Result<Self, ContractViolation> {
        let report = Self { entries };
        report.validate()?;
        Ok(report)
    }

    pub fn from_entries(mut entries: Vec<NodeHealth>) -> Self {
        entries.sort_by_key(|entry| entry.node_id);
        entries.dedup_by_key(|entry| entry.node_id);
        Self { entries }
    }

    pub fn entries(&self) -> &[NodeHealth] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, node_id: NodeId) -> Option<&NodeHealth> {
        self.entries.iter().find(|entry| entry.node_id == node_id)
    }

    pub fn all_reachable(&self) -> bool {
        self.entries.iter().all(|entry| entry.reachable)
    }

    pub fn unreachable(&self) -> impl Iterator<Item = &NodeHealth> {
        self.entries.iter().filter(|entry| !entry.reachable)
    }
}

impl Validate for HealthReport {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self
            .entries
            .windows(2)
            .any(|pair| pair[0].node_id >= pair[1].node_id)
        {
            return Err(ContractViolation::InvalidValue {
                field: "health_report.entries",
                reason: "must be strictly ascending by node id",
            });
        }
        for entry in &self.entries {
            if entry.reachable == entry.failure.is_some() {
                return Err(ContractViolation::InvalidValue {
                    field: "health_report.entries.failure",
                    reason: "must be present exactly when the node is unreachable",
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn at_health_report_01_rejects_out_of_order_entries() {
        let err = HealthReport::v1(vec![
            NodeHealth::reachable(NodeId(2), "Garden".to_string()),
            NodeHealth::reachable(NodeId(0), "Kitchen".to_string()),
        ])
        .unwrap_err();
        assert!(matches!(err, ContractViolation::InvalidValue { .. }));
    }

    #[test]
    fn at_health_report_03_from_entries_orders_by_node_id() {
        let report = HealthReport::from_entries(vec![
            NodeHealth::reachable(NodeId(2), "Garden".to_string()),
            NodeHealth::unreachable(NodeId(0), "Kitchen".to_string(), ProbeFailure::Dns),
        ]);
        let ids: Vec<NodeId> = report.entries().iter().map(|e| e.node_id).collect();
        assert_eq!(ids, vec![NodeId(0), NodeId(2)]);
        assert!(report.validate().is_ok());
    }

    #[test]
    fn at_health_report_02_summary_does_not_mask_earlier_failures() {
        let report = HealthReport::v1(vec![
            NodeHealth::unreachable(NodeId(0), "Kitchen".to_string(), ProbeFailure::Timeout),
            NodeHealth::reachable(NodeId(2), "Garden".to_string()),
        ])
        .unwrap();
        assert!(!report.all_reachable());
        let down: Vec<NodeId> = report.unreachable().map(|e| e.node_id).collect();
        assert_eq!(down, vec![NodeId(0)]);
        assert_eq!(
            report.get(NodeId(0)).map(NodeHealth::message_id),
            Some(MessageId::NodeNotResponding)
        );
    }
}
