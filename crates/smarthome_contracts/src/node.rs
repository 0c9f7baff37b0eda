#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::common::validate_text;
use crate::{ContractViolation, Validate};

pub const NODE_NAME_MAX_LEN: usize = 64;
pub const NODE_URL_MAX_LEN: usize = 256;
pub const NODE_COUNT_MAX: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub u16);

impl NodeId {
    pub fn index(self) -> usize {
        usize::from(self.0)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    pub base_url: String,
    pub enabled: bool,
}

impl Node {
    pub fn v1(
        id: NodeId,
        name: String,
        base_url: String,
        enabled: bool,
    ) -> Result<Self, ContractViolation> {
        let node = Self {
            id,
            name,
            base_url,
            enabled,
        };
        node.validate()?;
        Ok(node)
    }
}

impl Validate for Node {
    fn validate(&self) -> Result<(), ContractViolation> {
        validate_text("node.name", &self.name, NODE_NAME_MAX_LEN)?;
        validate_text("node.base_url", &self.base_url, NODE_URL_MAX_LEN)?;
        if !self.base_url.is_ascii() || self.base_url.contains(char::is_whitespace) {
            return Err(ContractViolation::InvalidValue {
                field: "node.base_url",
                reason: "must be printable ASCII without whitespace",
            });
        }
        if !(self.base_url.starts_with("http://") || self.base_url.starts_with("https://")) {
            return Err(ContractViolation::InvalidValue {
                field: "node.base_url",
                reason: "must use http or https scheme",
            });
        }
        if self.base_url.ends_with('/') {
            return Err(ContractViolation::InvalidValue {
                field: "node.base_url",
                reason: "must not end with '/'",
            });
        }
        Ok(())
    }
}
