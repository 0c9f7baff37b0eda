#![forbid(unsafe_code)]

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use smarthome_contracts::node::NodeId;
use smarthome_contracts::otp::OtpLength;
use smarthome_contracts::{ContractViolation, Validate};
use smarthome_engines::door::{DoorAccessConfig, DOOR_MARKER_DEFAULT, DOOR_NODE_ID_DEFAULT};
use smarthome_engines::health::{HealthCheckConfig, HEALTH_RETRY_BACKOFF_MS_DEFAULT};
use smarthome_engines::probe::ProbeConfig;

use crate::scheduler::SchedulerConfig;

pub const TIME_TICK_SECS_DEFAULT: u64 = 1;
pub const OTP_TICK_SECS_DEFAULT: u64 = 60;
pub const NODES_RETRY_DEFAULT: u8 = 1;
pub const NODES_TIMEOUT_SECS_DEFAULT: u64 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlCenterConfig {
    pub nodes_file: PathBuf,
    pub otp_length: OtpLength,
    pub otp_tick: Duration,
    pub time_tick: Duration,
    pub nodes_timeout: Duration,
    pub nodes_retry: u8,
    pub tls_insecure: bool,
    pub door_node_id: NodeId,
    pub door_marker: String,
    pub health_parallel: bool,
    pub user_agent: String,
}

impl ControlCenterConfig {
    pub fn mvp_v1() -> Self {
        Self {
            nodes_file: default_nodes_file(|key| env::var(key).ok()),
            otp_length: OtpLength::default(),
            otp_tick: Duration::from_secs(OTP_TICK_SECS_DEFAULT),
            time_tick: Duration::from_secs(TIME_TICK_SECS_DEFAULT),
            nodes_timeout: Duration::from_secs(NODES_TIMEOUT_SECS_DEFAULT),
            nodes_retry: NODES_RETRY_DEFAULT,
            tls_insecure: true,
            door_node_id: DOOR_NODE_ID_DEFAULT,
            door_marker: DOOR_MARKER_DEFAULT.to_string(),
            health_parallel: false,
            user_agent: ProbeConfig::mvp_v1().user_agent,
        }
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::mvp_v1();
        Self {
            nodes_file: lookup("SMARTHOME_NODES_FILE")
                .and_then(trim_non_empty)
                .map(PathBuf::from)
                .unwrap_or_else(|| default_nodes_file(&lookup)),
            otp_length: parse_in_range(&lookup, "SMARTHOME_OTP_LEN", 1..=12)
                .and_then(|v: usize| OtpLength::new(v).ok())
                .unwrap_or(defaults.otp_length),
            otp_tick: parse_in_range(&lookup, "SMARTHOME_OTP_TICK_SECS", 1..=86_400)
                .map(Duration::from_secs)
                .unwrap_or(defaults.otp_tick),
            time_tick: parse_in_range(&lookup, "SMARTHOME_TIME_TICK_SECS", 1..=3_600)
                .map(Duration::from_secs)
                .unwrap_or(defaults.time_tick),
            nodes_timeout: parse_in_range(&lookup, "SMARTHOME_NODES_TIMEOUT_SECS", 1..=120)
                .map(Duration::from_secs)
                .unwrap_or(defaults.nodes_timeout),
            nodes_retry: parse_in_range(&lookup, "SMARTHOME_NODES_RETRY", 1..=10)
                .unwrap_or(defaults.nodes_retry),
            tls_insecure: parse_bool(&lookup, "SMARTHOME_TLS_INSECURE")
                .unwrap_or(defaults.tls_insecure),
            door_node_id: parse_in_range(&lookup, "SMARTHOME_DOOR_NODE_ID", 0..=u16::MAX)
                .map(NodeId)
                .unwrap_or(defaults.door_node_id),
            door_marker: lookup("SMARTHOME_DOOR_MARKER")
                .and_then(trim_non_empty)
                .unwrap_or(defaults.door_marker),
            health_parallel: parse_bool(&lookup, "SMARTHOME_HEALTH_PARALLEL")
                .unwrap_or(defaults.health_parallel),
            user_agent: lookup("SMARTHOME_HTTP_USER_AGENT")
                .and_then(trim_non_empty)
                .unwrap_or(defaults.user_agent),
        }
    }

    pub fn probe_config(&self) -> ProbeConfig {
        ProbeConfig {
            tls_insecure: self.tls_insecure,
            user_agent: self.user_agent.clone(),
        }
    }

    pub fn door_access_config(&self) -> DoorAccessConfig {
        DoorAccessConfig {
            door_node_id: self.door_node_id,
            timeout: self.nodes_timeout,
            marker: self.door_marker.clone(),
        }
    }

    pub fn health_check_config(&self) -> HealthCheckConfig {
        HealthCheckConfig {
            timeout: self.nodes_timeout,
            attempts: self.nodes_retry,
            retry_backoff: Duration::from_millis(HEALTH_RETRY_BACKOFF_MS_DEFAULT),
            parallel: self.health_parallel,
        }
    }

    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            otp_tick: self.otp_tick,
            time_tick: self.time_tick,
        }
    }
}

impl Validate for ControlCenterConfig {
    fn validate(&self) -> Result<(), ContractViolation> {
        if self.otp_tick.is_zero() {
            return Err(ContractViolation::InvalidValue {
                field: "control_center_config.otp_tick",
                reason: "must be > 0",
            });
        }
        if self.time_tick.is_zero() {
            return Err(ContractViolation::InvalidValue {
                field: "control_center_config.time_tick",
                reason: "must be > 0",
            });
        }
        if self.nodes_retry == 0 {
            return Err(ContractViolation::InvalidValue {
                field: "control_center_config.nodes_retry",
                reason: "must be > 0",
            });
        }
        if self.user_agent.trim().is_empty() {
            return Err(ContractViolation::InvalidValue {
                field: "control_center_config.user_agent",
                reason: "must not be empty",
            });
        }
        self.door_access_config().validate()
    }
}

fn parse_in_range<F, T>(lookup: &F, key: &str, range: std::ops::RangeInclusive<T>) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr + PartialOrd,
{
    lookup(key)
        .and_then(|v| v.trim().parse::<T>().ok())
        .filter(|v| range.contains(v))
}

fn parse_bool<F>(lookup: &F, key: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key)?.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

fn trim_non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn default_nodes_file<F>(lookup: F) -> PathBuf
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(xdg_config_home) = lookup("XDG_CONFIG_HOME").and_then(trim_non_empty) {
        return PathBuf::from(xdg_config_home).join("smarthome").join("nodes.json");
    }
    if let Some(home) = lookup("HOME").and_then(trim_non_empty) {
        return PathBuf::from(home)
            .join(".config")
            .join("smarthome")
            .join("nodes.json");
    }
    PathBuf::from(".smarthome").join("nodes.json")
}
