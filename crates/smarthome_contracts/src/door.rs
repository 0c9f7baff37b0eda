#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

use crate::message::MessageId;
use crate::node::NodeId;
use crate::otp::OtpCode;
use crate::ReasonCodeId;

pub mod reason_codes {
    use crate::ReasonCodeId;

    pub const DOOR_OK_OPENED: ReasonCodeId = ReasonCodeId(0xD00A_0001);
    pub const DOOR_FAIL_NODE_UNREACHABLE: ReasonCodeId = ReasonCodeId(0xD00A_00F1);
    pub const DOOR_FAIL_UNEXPECTED_RESPONSE: ReasonCodeId = ReasonCodeId(0xD00A_00F2);
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "detail", rename_all = "snake_case")]
pub enum DoorOpenOutcome {
    Opened,
    NodeUnreachable,
    ReachableNotOpened(String),
}

impl DoorOpenOutcome {
    pub fn reason_code(&self) -> ReasonCodeId {
        match self {
            Self::Opened => reason_codes::DOOR_OK_OPENED,
            Self::NodeUnreachable => reason_codes::DOOR_FAIL_NODE_UNREACHABLE,
            Self::ReachableNotOpened(_) => reason_codes::DOOR_FAIL_UNEXPECTED_RESPONSE,
        }
    }

    pub fn message_id(&self) -> MessageId {
        match self {
            Self::Opened => MessageId::DoorOpened,
            Self::NodeUnreachable => MessageId::NodeNotResponding,
            Self::ReachableNotOpened(_) => MessageId::DoorNotOpened,
        }
    }

    pub fn is_opened(&self) -> bool {
        matches!(self, Self::Opened)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DoorAccessState {
    Idle,
    ValidatingOtp,
    OtpRejected,
    OpeningDoor,
    Opened,
    NotOpened,
}

impl DoorAccessState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::OtpRejected | Self::Opened | Self::NotOpened)
    }

    pub fn can_transition_to(self, next: DoorAccessState) -> bool {
        matches!(
            (self, next),
            (Self::Idle, Self::ValidatingOtp)
                | (Self::ValidatingOtp, Self::OtpRejected)
                | (Self::ValidatingOtp, Self::OpeningDoor)
                | (Self::OpeningDoor, Self::Opened)
                | (Self::OpeningDoor, Self::NotOpened)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::ValidatingOtp => "VALIDATING_OTP",
            Self::OtpRejected => "OTP_REJECTED",
            Self::OpeningDoor => "OPENING_DOOR",
            Self::Opened => "OPENED",
            Self::NotOpened => "NOT_OPENED",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoorExchangeReport {
    pub node_id: NodeId,
    pub outcome: DoorOpenOutcome,
    pub terminal_state: DoorAccessState,
    pub otp_used: OtpCode,
}
