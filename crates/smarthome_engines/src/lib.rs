#![forbid(unsafe_code)]

pub mod door;
pub mod health;
pub mod otp;
pub mod probe;
pub mod registry;
