#![forbid(unsafe_code)]

use chrono::{DateTime, TimeZone};
use smarthome_contracts::message::MessageId;

pub const LOG_TIMESTAMP_FORMAT: &str = "%a, %d %b %Y - %H:%M:%S";
pub const CLOCK_FORMAT: &str = "%H:%M:%S";

pub fn message_text(id: MessageId) -> &'static str {
    match id {
        MessageId::Startup => "SuperSmartHome control center started",
        MessageId::NodeAlert => "Alert! A node needs attention",
        MessageId::NodeNotResponding => "Node is not responding",
        MessageId::LogReset => "Events log cleared",
        MessageId::HealthCheckStarted => "Checking nodes health",
        MessageId::NodeResponding => "Node is responding",
        MessageId::DoorOpened => "Door is open",
        MessageId::DoorNotOpened => "Door not opened",
        MessageId::About => "SuperSmartHome control center",
    }
}

pub fn log_line<Tz>(at: &DateTime<Tz>, text: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("[{}] {text}", at.format(LOG_TIMESTAMP_FORMAT))
}

pub fn clock_label<Tz>(at: &DateTime<Tz>, otp: &str) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!("{}   OTP: {otp}", at.format(CLOCK_FORMAT))
}
