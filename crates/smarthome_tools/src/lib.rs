#![forbid(unsafe_code)]

pub mod console;
pub mod messages;
