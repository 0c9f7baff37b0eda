#![forbid(unsafe_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use smarthome_contracts::health::NodeHealth;
use smarthome_contracts::node::NodeId;
use smarthome_contracts::probe::ProbeFailure;
use smarthome_engines::health::{HealthCheckConfig, NodeHealthMonitor};
use smarthome_engines::probe::{ProbeConfig, UreqProbe};
use smarthome_engines::registry::NodeRegistry;

fn responding_node(delay: Duration) -> (String, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        let mut reader = BufReader::new(stream.try_clone().unwrap());
        loop {
            let mut line = String::new();
            if reader.read_line(&mut line).unwrap() == 0 || line == "\r\n" {
                break;
            }
        }
        thread::sleep(delay);
        let body = "ESP8266 Door Opener V. 0.1.2";
        let mut stream = stream;
        write!(
            stream,
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
            body.len()
        )
        .unwrap();
        stream.flush().unwrap();
    });
    (format!("http://{addr}"), handle)
}

fn silent_node(hold: Duration) -> (String, thread::JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        thread::sleep(hold);
        drop(stream);
    });
    (format!("http://{addr}"), handle)
}

fn registry(node0: &str, node1: &str, node2: &str) -> NodeRegistry {
    NodeRegistry::from_json_str(&format!(
        r#"{{
            "nodes": 3,
            "nodes_info": [
                {{"name": "Kitchen", "URL": "{node0}", "active": 1}},
                {{"name": "Door Opener", "URL": "{node1}", "active": 0}},
                {{"name": "Garden", "URL": "{node2}", "active": 1}}
            ]
        }}"#
    ))
    .unwrap()
}

fn plain_probe() -> UreqProbe {
    UreqProbe::new(ProbeConfig {
        tls_insecure: false,
        user_agent: "smarthome-test/1.0".to_string(),
    })
    .unwrap()
}

#[test]
fn at_health_it_01_disabled_node_omitted_and_timeout_marked_unreachable() {
    let (kitchen, kitchen_server) = responding_node(Duration::ZERO);
    let (garden, garden_server) = silent_node(Duration::from_millis(1_500));
    let registry = registry(&kitchen, "http://door.invalid", &garden);
    let monitor = NodeHealthMonitor::new(
        HealthCheckConfig {
            timeout: Duration::from_millis(300),
            ..HealthCheckConfig::mvp_v1()
        },
        plain_probe(),
    );

    let report = monitor.check_all(&registry);

    assert_eq!(
        report.entries(),
        &[
            NodeHealth::reachable(NodeId(0), "Kitchen".to_string()),
            NodeHealth::unreachable(NodeId(2), "Garden".to_string(), ProbeFailure::Timeout),
        ]
    );
    kitchen_server.join().unwrap();
    garden_server.join().unwrap();
}

#[test]
fn at_health_it_02_parallel_report_is_ordered_by_node_id() {
    let (kitchen, kitchen_server) = responding_node(Duration::from_millis(400));
    let (garden, garden_server) = responding_node(Duration::ZERO);
    let registry = registry(&kitchen, "http://door.invalid", &garden);
    let monitor = NodeHealthMonitor::new(
        HealthCheckConfig {
            timeout: Duration::from_secs(3),
            parallel: true,
            ..HealthCheckConfig::mvp_v1()
        },
        plain_probe(),
    );

    let report = monitor.check_all(&registry);

    let ids: Vec<NodeId> = report.entries().iter().map(|e| e.node_id).collect();
    assert_eq!(ids, vec![NodeId(0), NodeId(2)]);
    assert!(report.all_reachable());
    kitchen_server.join().unwrap();
    garden_server.join().unwrap();
}
