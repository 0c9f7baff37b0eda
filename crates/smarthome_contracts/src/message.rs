#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

/// Identifiers of the user-facing sentences. The numeric ids are shared with
/// the presentation layer's sentence table and must stay stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageId {
    Startup,
    NodeAlert,
    NodeNotResponding,
    LogReset,
    HealthCheckStarted,
    NodeResponding,
    DoorOpened,
    DoorNotOpened,
    About,
}

impl MessageId {
    pub fn id(self) -> u16 {
        match self {
            Self::Startup => 0,
            Self::NodeAlert => 1,
            Self::NodeNotResponding => 2,
            Self::LogReset => 4,
            Self::HealthCheckStarted => 5,
            Self::NodeResponding => 7,
            Self::DoorOpened => 8,
            Self::DoorNotOpened => 9,
            Self::About => 10,
        }
    }

    pub fn from_id(id: u16) -> Option<Self> {
        match id {
            0 => Some(Self::Startup),
            1 => Some(Self::NodeAlert),
            2 => Some(Self::NodeNotResponding),
            4 => Some(Self::LogReset),
            5 => Some(Self::HealthCheckStarted),
            7 => Some(Self::NodeResponding),
            8 => Some(Self::DoorOpened),
            9 => Some(Self::DoorNotOpened),
            10 => Some(Self::About),
            _ => None,
        }
    }
}
