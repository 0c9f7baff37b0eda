#![forbid(unsafe_code)]

pub mod config;
pub mod control_center;
pub mod scheduler;
