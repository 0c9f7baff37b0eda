#![forbid(unsafe_code)]

use std::io::{BufRead, BufReader, Write};
use std::net::TcpListener;
use std::thread;
use std::time::Duration;

use native_tls::{Identity, TlsAcceptor};
use rcgen::{CertificateParams, DnType, DnValue, KeyPair};
use smarthome_contracts::probe::{ProbeFailure, ProbeResult};
use smarthome_engines::probe::{HttpProbe, ProbeConfig, UreqProbe};

const NODE_BODY: &str = "ESP8266 Door Opener V. 0.1.2";

fn self_signed_identity() -> Identity {
    let mut params =
        CertificateParams::new(vec!["localhost".to_string(), "127.0.0.1".to_string()]).unwrap();
    params.distinguished_name.push(
        DnType::CommonName,
        DnValue::Utf8String("door-node.lan".to_string()),
    );
    let key_pair = KeyPair::generate().unwrap();
    let cert = params.self_signed(&key_pair).unwrap();
    Identity::from_pkcs8(cert.pem().as_bytes(), key_pair.serialize_pem().as_bytes()).unwrap()
}

/// Serves one HTTPS request. The handle yields whether the handshake
/// completed and a response was written.
fn https_node() -> (String, thread::JoinHandle<bool>) {
    let acceptor = TlsAcceptor::new(self_signed_identity()).unwrap();
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = thread::spawn(move || {
        let (stream, _) = listener.accept().unwrap();
        stream
            .set_read_timeout(Some(Duration::from_secs(5)))
            .unwrap();
        let Ok(mut tls) = acceptor.accept(stream) else {
            return false;
        };
        {
            let mut reader = BufReader::new(&mut tls);
            loop {
                let mut line = String::new();
                if reader.read_line(&mut line).unwrap_or(0) == 0 || line == "\r\n" {
                    break;
                }
            }
        }
        write!(
            tls,
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{NODE_BODY}",
            NODE_BODY.len()
        )
        .unwrap();
        tls.flush().unwrap();
        let _ = tls.shutdown();
        true
    });
    (format!("https://{addr}/"), handle)
}

#[test]
fn at_tls_01_default_config_accepts_self_signed_node() {
    let (url, node) = https_node();
    let probe = UreqProbe::new(ProbeConfig::mvp_v1()).unwrap();
    let result = probe.get(&url, Duration::from_secs(5));
    assert_eq!(result, ProbeResult::Success(NODE_BODY.as_bytes().to_vec()));
    assert!(node.join().unwrap());
}

#[test]
fn at_tls_02_strict_validation_rejects_self_signed_node() {
    let (url, node) = https_node();
    let probe = UreqProbe::new(ProbeConfig {
        tls_insecure: false,
        ..ProbeConfig::mvp_v1()
    })
    .unwrap();
    let result = probe.get(&url, Duration::from_secs(5));
    assert_eq!(result, ProbeResult::Failure(ProbeFailure::Tls));
    assert!(!node.join().unwrap());
}
