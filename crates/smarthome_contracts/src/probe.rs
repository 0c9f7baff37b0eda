#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProbeFailure {
    Timeout,
    Connection,
    Dns,
    Tls,
    InvalidUrl,
    Transport,
}

impl ProbeFailure {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Timeout => "timeout",
            Self::Connection => "connection",
            Self::Dns => "dns",
            Self::Tls => "tls",
            Self::InvalidUrl => "invalid_url",
            Self::Transport => "transport",
        }
    }
}

impl std::fmt::Display for ProbeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Any response counts as Success, status codes are not interpreted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeResult {
    Success(Vec<u8>),
    Failure(ProbeFailure),
}

impl ProbeResult {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn body(&self) -> Option<&[u8]> {
        match self {
            Self::Success(body) => Some(body),
            Self::Failure(_) => None,
        }
    }

    pub fn failure(&self) -> Option<ProbeFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(reason) => Some(*reason),
        }
    }
}
