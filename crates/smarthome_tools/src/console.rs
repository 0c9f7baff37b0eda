#![forbid(unsafe_code)]

use chrono::Local;
use smarthome_contracts::door::{DoorExchangeReport, DoorOpenOutcome};
use smarthome_contracts::health::HealthReport;
use smarthome_contracts::message::MessageId;
use smarthome_engines::probe::HttpProbe;
use smarthome_os::control_center::{ControlCenter, ControlError};

use crate::messages::{log_line, message_text};

pub const EVENT_LOG_CAPACITY: usize = 500;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    OpenDoor,
    CheckNodes,
    ShowOtp,
    ListNodes,
    About,
    ClearLog,
    ShowLog,
    Help,
    Quit,
}

impl ConsoleCommand {
    pub fn parse(raw: &str) -> Result<Self, String> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "open" | "open-door" | "door" => Ok(Self::OpenDoor),
            "health" | "check" | "nodes-health" => Ok(Self::CheckNodes),
            "otp" => Ok(Self::ShowOtp),
            "nodes" | "ls" => Ok(Self::ListNodes),
            "about" => Ok(Self::About),
            "clear" => Ok(Self::ClearLog),
            "log" => Ok(Self::ShowLog),
            "help" | "?" => Ok(Self::Help),
            "quit" | "exit" | "q" => Ok(Self::Quit),
            other => Err(format!(
                "unknown command: {other}. expected one of: open, health, otp, nodes, about, clear, log, help, quit"
            )),
        }
    }

    /// Commands that contact nodes and may block for the probe timeout.
    pub fn is_node_action(self) -> bool {
        matches!(self, Self::OpenDoor | Self::CheckNodes)
    }
}

pub const USAGE: &str = "usage: smarthome <run|otp|open-door|health|nodes|about>";

/// What the `smarthome` binary was asked to do, decided before any
/// configuration is loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Invocation {
    Console,
    Once(ConsoleCommand),
}

impl Invocation {
    pub fn parse<S: AsRef<str>>(args: &[S]) -> Result<Self, String> {
        let subcommand = args.first().ok_or_else(|| USAGE.to_string())?;
        match subcommand.as_ref() {
            "run" => Ok(Self::Console),
            "otp" => Ok(Self::Once(ConsoleCommand::ShowOtp)),
            "open-door" => Ok(Self::Once(ConsoleCommand::OpenDoor)),
            "health" => Ok(Self::Once(ConsoleCommand::CheckNodes)),
            "nodes" => Ok(Self::Once(ConsoleCommand::ListNodes)),
            "about" => Ok(Self::Once(ConsoleCommand::About)),
            other => Err(format!("unknown subcommand: {other}. {USAGE}")),
        }
    }
}

pub const HELP_TEXT: &str = "\
open     open the door with the current OTP
health   check every enabled node
otp      show the current OTP
nodes    list configured nodes
about    version and uptime
clear    clear the events log
log      show the events log
quit     leave the console";

/// Bounded, timestamped events log. Oldest lines are dropped first.
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    lines: Vec<String>,
}

impl EventLog {
    pub fn push(&mut self, text: &str) -> String {
        let line = log_line(&Local::now(), text);
        if self.lines.len() >= EVENT_LOG_CAPACITY {
            self.lines.remove(0);
        }
        self.lines.push(line.clone());
        line
    }

    pub fn push_message(&mut self, id: MessageId) -> String {
        self.push(message_text(id))
    }

    pub fn clear(&mut self) -> String {
        self.lines.clear();
        self.push_message(MessageId::LogReset)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

pub fn execute_console_command<P>(
    control: &ControlCenter<P>,
    log: &mut EventLog,
    command: ConsoleCommand,
) -> Result<Vec<String>, String>
where
    P: HttpProbe + Clone + Sync,
{
    match command {
        ConsoleCommand::OpenDoor | ConsoleCommand::CheckNodes => {
            let mut out = Vec::new();
            let texts = node_action_texts(control, command, |text| out.push(log.push(text)))?;
            out.extend(texts.iter().map(|text| log.push(text)));
            Ok(out)
        }
        ConsoleCommand::ShowOtp => Ok(vec![control.current_otp().to_string()]),
        ConsoleCommand::ListNodes => Ok(control
            .node_summaries()
            .into_iter()
            .map(|node| {
                let mut line = format!("#{} {} {}", node.id, node.name, node.url);
                if !node.enabled {
                    line.push_str(" (disabled)");
                }
                if node.door {
                    line.push_str(" [door]");
                }
                line
            })
            .collect()),
        ConsoleCommand::About => {
            let about = control.about();
            Ok(vec![format!(
                "{} v{}, up {}s since {}",
                message_text(about.message_id),
                about.version,
                about.uptime_secs,
                about.started_at.format("%Y-%m-%d %H:%M:%S")
            )])
        }
        ConsoleCommand::ClearLog => Ok(vec![log.clear()]),
        ConsoleCommand::ShowLog => Ok(log.lines().to_vec()),
        ConsoleCommand::Help => Ok(HELP_TEXT.lines().map(str::to_string).collect()),
        ConsoleCommand::Quit => Ok(Vec::new()),
    }
}

/// Runs a node action and returns its log texts without touching any log, so
/// callers can run it off the console thread. `on_started` receives the
/// "checking" text once a health check has been accepted; a refused action
/// never calls it.
pub fn node_action_texts<P, F>(
    control: &ControlCenter<P>,
    command: ConsoleCommand,
    on_started: F,
) -> Result<Vec<String>, String>
where
    P: HttpProbe + Clone + Sync,
    F: FnOnce(&str),
{
    match command {
        ConsoleCommand::OpenDoor => {
            let report = control.open_door().map_err(control_error_text)?;
            let door_name = control
                .registry()
                .name_of(report.node_id)
                .map(str::to_string)
                .unwrap_or_else(|_| format!("node #{}", report.node_id));
            Ok(door_report_texts(&report, &door_name))
        }
        ConsoleCommand::CheckNodes => {
            let report = control
                .check_nodes_with(|| on_started(message_text(MessageId::HealthCheckStarted)))
                .map_err(control_error_text)?;
            Ok(health_report_texts(&report))
        }
        other => Err(format!("{other:?} does not contact nodes")),
    }
}

pub fn door_report_texts(report: &DoorExchangeReport, door_name: &str) -> Vec<String> {
    let primary = message_text(report.outcome.message_id());
    match &report.outcome {
        DoorOpenOutcome::Opened => vec![primary.to_string()],
        DoorOpenOutcome::NodeUnreachable => vec![
            format!("{door_name} (#{}): {primary}", report.node_id),
            message_text(MessageId::NodeAlert).to_string(),
        ],
        DoorOpenOutcome::ReachableNotOpened(body) => {
            let body = body.trim();
            let mut texts = vec![if body.is_empty() {
                primary.to_string()
            } else {
                format!("{primary}: {body}")
            }];
            texts.push(message_text(MessageId::NodeAlert).to_string());
            texts
        }
    }
}

pub fn health_report_texts(report: &HealthReport) -> Vec<String> {
    let mut texts: Vec<String> = report
        .entries()
        .iter()
        .map(|entry| {
            let status = message_text(entry.message_id());
            match entry.failure {
                Some(reason) => format!("{} (#{}): {status} ({reason})", entry.name, entry.node_id),
                None => format!("{} (#{}): {status}", entry.name, entry.node_id),
            }
        })
        .collect();
    if !report.all_reachable() {
        texts.push(message_text(MessageId::NodeAlert).to_string());
    }
    texts
}

fn control_error_text(err: ControlError) -> String {
    match err {
        ControlError::Busy => "busy: wait for the running action to finish".to_string(),
        other => other.to_string(),
    }
}
