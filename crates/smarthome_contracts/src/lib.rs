#![forbid(unsafe_code)]

pub mod common;
pub mod door;
pub mod health;
pub mod message;
pub mod node;
pub mod otp;
pub mod probe;

pub use common::{ContractViolation, ReasonCodeId, Validate};
