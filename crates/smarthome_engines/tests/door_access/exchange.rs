#![forbid(unsafe_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use smarthome_contracts::door::{DoorAccessState, DoorOpenOutcome};
use smarthome_contracts::otp::{OtpCode, OtpLength};
use smarthome_contracts::probe::ProbeResult;
use smarthome_engines::door::{DoorAccessConfig, DoorAccessProtocol};
use smarthome_engines::otp::OtpGenerator;
use smarthome_engines::probe::{HttpProbe, ProbeConfig, UreqProbe};
use smarthome_engines::registry::NodeRegistry;

fn registry_with_door(door_url: &str) -> NodeRegistry {
    NodeRegistry::from_json_str(&format!(
        r#"{{
            "nodes": 2,
            "nodes_info": [
                {{"name": "Kitchen", "URL": "http://kitchen.invalid", "active": 1}},
                {{"name": "Door Opener", "URL": "{door_url}", "active": 1}}
            ]
        }}"#
    ))
    .unwrap()
}

// Refreshes the shared OTP while the validation call is in flight.
struct RefreshingProbe {
    otp: Arc<OtpGenerator>,
    calls: Mutex<Vec<String>>,
    refreshed_to: Mutex<Option<OtpCode>>,
}

impl HttpProbe for RefreshingProbe {
    fn get(&self, url: &str, _timeout: Duration) -> ProbeResult {
        let mut calls = self.calls.lock().unwrap();
        if calls.is_empty() {
            let mut next = self.otp.refresh();
            while url.ends_with(&format!("={next}")) {
                next = self.otp.refresh();
            }
            *self.refreshed_to.lock().unwrap() = Some(next);
        }
        calls.push(url.to_string());
        if url.contains("/opendoor") {
            ProbeResult::Success(b"esp8266 Door is Open".to_vec())
        } else {
            ProbeResult::Success(b"Ok".to_vec())
        }
    }
}

#[test]
fn at_door_it_01_refresh_mid_exchange_keeps_snapshot() {
    let otp = Arc::new(OtpGenerator::new(OtpLength::default()));
    let probe = RefreshingProbe {
        otp: otp.clone(),
        calls: Mutex::new(Vec::new()),
        refreshed_to: Mutex::new(None),
    };
    let registry = registry_with_door("http://door.invalid");
    let door = DoorAccessProtocol::bind(&registry, DoorAccessConfig::mvp_v1(), &probe).unwrap();

    let snapshot = otp.current();
    let report = door.open_door(&otp);

    let refreshed = probe.refreshed_to.lock().unwrap().clone().unwrap();
    assert_ne!(refreshed, snapshot);
    assert_eq!(otp.current(), refreshed);
    assert_eq!(report.otp_used, snapshot);
    assert_eq!(report.outcome, DoorOpenOutcome::Opened);
    let calls = probe.calls.lock().unwrap().clone();
    assert_eq!(
        calls,
        vec![
            format!("http://door.invalid/otp?pass={snapshot}"),
            format!("http://door.invalid/opendoor?pass={snapshot}"),
        ]
    );
}

struct FakeDoorFirmware {
    base_url: String,
    requests: Arc<Mutex<Vec<String>>>,
    handle: thread::JoinHandle<()>,
}

// Minimal stand-in for the door opener firmware: remembers the code sent to
// /otp and opens only when /opendoor repeats it and the lock is operational.
fn spawn_fake_door_firmware(connections: usize, lock_operational: bool) -> FakeDoorFirmware {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));
    let seen = requests.clone();
    let handle = thread::spawn(move || {
        let mut armed_code: Option<String> = None;
        for _ in 0..connections {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream.try_clone().unwrap());
            let mut request_line = String::new();
            reader.read_line(&mut request_line).unwrap();
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                    break;
                }
            }
            let target = request_line
                .split_whitespace()
                .nth(1)
                .unwrap_or("/")
                .to_string();
            seen.lock().unwrap().push(target.clone());
            let (path, pass) = match target.split_once("?pass=") {
                Some((path, pass)) => (path.to_string(), Some(pass.to_string())),
                None => (target.clone(), None),
            };
            let (status, body) = match (path.as_str(), pass) {
                ("/otp", Some(code)) => {
                    armed_code = Some(code);
                    ("200 OK", "Ok".to_string())
                }
                ("/opendoor", Some(code))
                    if lock_operational && armed_code.as_deref() == Some(code.as_str()) =>
                {
                    ("200 OK", "esp8266 Door is Open".to_string())
                }
                ("/opendoor", Some(_)) => ("200 OK", "Error code 004\n\n".to_string()),
                _ => (
                    "404 Not Found",
                    "Error 404 - Door Opener\ninvalid request\n\n".to_string(),
                ),
            };
            let mut stream = stream;
            write!(
                stream,
                "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            )
            .unwrap();
            stream.flush().unwrap();
        }
    });
    FakeDoorFirmware {
        base_url: format!("http://{addr}"),
        requests,
        handle,
    }
}

fn plain_probe() -> UreqProbe {
    UreqProbe::new(ProbeConfig {
        tls_insecure: false,
        user_agent: "smarthome-test/1.0".to_string(),
    })
    .unwrap()
}

#[test]
fn at_door_it_02_loopback_firmware_opens_with_matching_code() {
    let firmware = spawn_fake_door_firmware(2, true);
    let registry = registry_with_door(&firmware.base_url);
    let probe = plain_probe();
    let door = DoorAccessProtocol::bind(&registry, DoorAccessConfig::mvp_v1(), &probe).unwrap();
    let otp = OtpGenerator::new(OtpLength::default());

    let report = door.open_door(&otp);

    assert_eq!(report.outcome, DoorOpenOutcome::Opened);
    assert_eq!(report.terminal_state, DoorAccessState::Opened);
    firmware.handle.join().unwrap();
    let requests = firmware.requests.lock().unwrap().clone();
    assert_eq!(
        requests,
        vec![
            format!("/otp?pass={}", report.otp_used),
            format!("/opendoor?pass={}", report.otp_used),
        ]
    );
}

#[test]
fn at_door_it_03_loopback_firmware_surfaces_refusal_body() {
    let firmware = spawn_fake_door_firmware(2, false);
    let registry = registry_with_door(&firmware.base_url);
    let probe = plain_probe();
    let door = DoorAccessProtocol::bind(&registry, DoorAccessConfig::mvp_v1(), &probe).unwrap();

    let report = door.run_exchange(OtpCode::new("1234").unwrap());

    assert_eq!(
        report.outcome,
        DoorOpenOutcome::ReachableNotOpened("Error code 004\n\n".to_string())
    );
    assert_eq!(report.terminal_state, DoorAccessState::NotOpened);
    firmware.handle.join().unwrap();
}

#[test]
fn at_door_it_04_unreachable_door_node_reports_node_unreachable() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let registry = registry_with_door(&format!("http://{addr}"));
    let probe = plain_probe();
    let door = DoorAccessProtocol::bind(&registry, DoorAccessConfig::mvp_v1(), &probe).unwrap();
    let report = door.open_door(&OtpGenerator::new(OtpLength::default()));
    assert_eq!(report.outcome, DoorOpenOutcome::NodeUnreachable);
    assert_eq!(report.terminal_state, DoorAccessState::OtpRejected);
}
