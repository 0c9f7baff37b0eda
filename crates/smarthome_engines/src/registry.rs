#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use smarthome_contracts::node::{Node, NodeId, NODE_COUNT_MAX};
use smarthome_contracts::ContractViolation;
use tracing::{debug, info};

#[derive(Debug)]
pub enum ConfigError {
    Missing(PathBuf),
    Io(std::io::Error),
    Json(serde_json::Error),
    CountMismatch { declared: usize, actual: usize },
    TooManyNodes(usize),
    InvalidNode {
        index: usize,
        violation: ContractViolation,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Missing(path) => write!(f, "nodes file not found: {}", path.display()),
            Self::Io(err) => write!(f, "io error: {err}"),
            Self::Json(err) => write!(f, "json error: {err}"),
            Self::CountMismatch { declared, actual } => write!(
                f,
                "declared node count {declared} does not match {actual} listed nodes"
            ),
            Self::TooManyNodes(count) => {
                write!(f, "{count} nodes exceeds the limit of {NODE_COUNT_MAX}")
            }
            Self::InvalidNode { index, violation } => write!(f, "node {index}: {violation}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for ConfigError {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeNotFound {
    pub id: NodeId,
    pub count: usize,
}

impl std::fmt::Display for NodeNotFound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node {} not found (registry holds {} nodes)", self.id, self.count)
    }
}

impl std::error::Error for NodeNotFound {}

#[derive(Debug, Deserialize)]
struct NodesDocument {
    nodes: usize,
    nodes_info: Vec<NodeEntry>,
}

#[derive(Debug, Deserialize)]
struct NodeEntry {
    name: String,
    #[serde(rename = "URL")]
    url: String,
    active: u8,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRegistry {
    nodes: Vec<Node>,
}

impl NodeRegistry {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::Missing(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)?;
        let registry = Self::from_json_str(&raw)?;
        info!(
            path = %path.display(),
            nodes = registry.count(),
            enabled = registry.nodes.iter().filter(|n| n.enabled).count(),
            "node registry loaded"
        );
        Ok(registry)
    }

    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let doc = serde_json::from_str::<NodesDocument>(raw)?;
        if doc.nodes != doc.nodes_info.len() {
            return Err(ConfigError::CountMismatch {
                declared: doc.nodes,
                actual: doc.nodes_info.len(),
            });
        }
        if doc.nodes > NODE_COUNT_MAX {
            return Err(ConfigError::TooManyNodes(doc.nodes));
        }

        let mut nodes = Vec::with_capacity(doc.nodes_info.len());
        for (index, entry) in doc.nodes_info.into_iter().enumerate() {
            let enabled = match entry.active {
                0 => false,
                1 => true,
                _ => {
                    return Err(ConfigError::InvalidNode {
                        index,
                        violation: ContractViolation::InvalidValue {
                            field: "node.active",
                            reason: "must be 0 or 1",
                        },
                    })
                }
            };
            let base_url = normalize_base_url(&entry.url)
                .map_err(|violation| ConfigError::InvalidNode { index, violation })?;
            let id = NodeId(index as u16);
            let node = Node::v1(id, entry.name.trim().to_string(), base_url, enabled)
                .map_err(|violation| ConfigError::InvalidNode { index, violation })?;
            debug!(node_id = %id, name = %node.name, enabled, "node registered");
            nodes.push(node);
        }
        Ok(Self { nodes })
    }

    pub fn from_nodes(nodes: Vec<Node>) -> Result<Self, ConfigError> {
        if nodes.len() > NODE_COUNT_MAX {
            return Err(ConfigError::TooManyNodes(nodes.len()));
        }
        for (index, node) in nodes.iter().enumerate() {
            if node.id.index() != index {
                return Err(ConfigError::InvalidNode {
                    index,
                    violation: ContractViolation::InvalidValue {
                        field: "node.id",
                        reason: "ids must be dense and ordered from 0",
                    },
                });
            }
            smarthome_contracts::Validate::validate(node)
                .map_err(|violation| ConfigError::InvalidNode { index, violation })?;
        }
        Ok(Self { nodes })
    }

    pub fn count(&self) -> usize {
        self.nodes.len()
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.nodes.iter().map(|node| node.id)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node, NodeNotFound> {
        self.nodes.get(id.index()).ok_or(NodeNotFound {
            id,
            count: self.nodes.len(),
        })
    }

    pub fn url_of(&self, id: NodeId) -> Result<&str, NodeNotFound> {
        self.node(id).map(|node| node.base_url.as_str())
    }

    pub fn name_of(&self, id: NodeId) -> Result<&str, NodeNotFound> {
        self.node(id).map(|node| node.name.as_str())
    }

    pub fn is_enabled(&self, id: NodeId) -> Result<bool, NodeNotFound> {
        self.node(id).map(|node| node.enabled)
    }
}

fn normalize_base_url(raw: &str) -> Result<String, ContractViolation> {
    let trimmed = raw.trim().trim_end_matches('/');
    let parsed = url::Url::parse(trimmed).map_err(|_| ContractViolation::InvalidValue {
        field: "node.base_url",
        reason: "must be an absolute URL",
    })?;
    if parsed.host_str().is_none() {
        return Err(ContractViolation::InvalidValue {
            field: "node.base_url",
            reason: "must name a host",
        });
    }
    if parsed.path() != "/" || parsed.query().is_some() || parsed.fragment().is_some() {
        return Err(ContractViolation::InvalidValue {
            field: "node.base_url",
            reason: "must be scheme+host+port without a path",
        });
    }
    Ok(trimmed.to_string())
}
