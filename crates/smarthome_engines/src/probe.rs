#![forbid(unsafe_code)]

use std::io::Read;
use std::sync::Arc;
use std::time::Duration;

use smarthome_contracts::probe::{ProbeFailure, ProbeResult};
use tracing::{debug, warn};

pub const PROBE_BODY_MAX_BYTES: u64 = 64 * 1024;
const PROBE_MIN_TIMEOUT_MS: u64 = 100;

pub trait HttpProbe {
    fn get(&self, url: &str, timeout: Duration) -> ProbeResult;
}

impl<P: HttpProbe + ?Sized> HttpProbe for &P {
    fn get(&self, url: &str, timeout: Duration) -> ProbeResult {
        (**self).get(url, timeout)
    }
}

impl<P: HttpProbe + ?Sized> HttpProbe for Arc<P> {
    fn get(&self, url: &str, timeout: Duration) -> ProbeResult {
        (**self).get(url, timeout)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeConfig {
    // Node firmware serves self-signed certificates; validation is skipped when set.
    pub tls_insecure: bool,
    pub user_agent: String,
}

impl ProbeConfig {
    pub fn mvp_v1() -> Self {
        Self {
            tls_insecure: true,
            user_agent: "smarthome-control-center/0.1".to_string(),
        }
    }
}

#[derive(Debug)]
pub enum ProbeBuildError {
    Tls(native_tls::Error),
}

impl std::fmt::Display for ProbeBuildError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tls(err) => write!(f, "tls connector setup failed: {err}"),
        }
    }
}

impl std::error::Error for ProbeBuildError {}

impl From<native_tls::Error> for ProbeBuildError {
    fn from(value: native_tls::Error) -> Self {
        Self::Tls(value)
    }
}

#[derive(Clone)]
pub struct UreqProbe {
    config: ProbeConfig,
    insecure_tls: Option<Arc<native_tls::TlsConnector>>,
}

impl std::fmt::Debug for UreqProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UreqProbe")
            .field("config", &self.config)
            .finish()
    }
}

impl UreqProbe {
    pub fn new(config: ProbeConfig) -> Result<Self, ProbeBuildError> {
        let insecure_tls = if config.tls_insecure {
            warn!("TLS certificate validation is disabled for node probes");
            let connector = native_tls::TlsConnector::builder()
                .danger_accept_invalid_certs(true)
                .danger_accept_invalid_hostnames(true)
                .build()?;
            Some(Arc::new(connector))
        } else {
            None
        };
        Ok(Self {
            config,
            insecure_tls,
        })
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    fn agent(&self, timeout: Duration) -> ureq::Agent {
        let timeout = timeout.max(Duration::from_millis(PROBE_MIN_TIMEOUT_MS));
        let mut builder = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .user_agent(&self.config.user_agent)
            .try_proxy_from_env(false);
        if let Some(connector) = self.insecure_tls.as_ref() {
            builder = builder.tls_connector(connector.clone());
        }
        builder.build()
    }
}

impl HttpProbe for UreqProbe {
    fn get(&self, url: &str, timeout: Duration) -> ProbeResult {
        let response = match self.agent(timeout).get(url).call() {
            Ok(response) => response,
            // The firmware does not use status codes; any answer counts as reachable.
            Err(ureq::Error::Status(status, response)) => {
                debug!(status, "probe received non-2xx status");
                response
            }
            Err(ureq::Error::Transport(transport)) => {
                let failure = probe_failure_from_transport(&transport);
                debug!(error = %failure, detail = %transport, "probe transport failure");
                return ProbeResult::Failure(failure);
            }
        };
        match read_capped_body(response.into_reader(), PROBE_BODY_MAX_BYTES) {
            Ok(body) => ProbeResult::Success(body),
            Err(err) => {
                let failure = classify_transport_error_kind(&err.to_string());
                debug!(error = %failure, "probe body read failed");
                ProbeResult::Failure(failure)
            }
        }
    }
}

/// Reads at most `max` bytes. One extra byte is requested so a body that
/// exceeds the cap can be told apart from one that fits exactly.
fn read_capped_body(reader: impl Read, max: u64) -> std::io::Result<Vec<u8>> {
    let mut body = Vec::new();
    reader.take(max.saturating_add(1)).read_to_end(&mut body)?;
    if body.len() as u64 > max {
        body.truncate(max as usize);
        debug!(max_bytes = max, "probe body truncated at size limit");
    }
    Ok(body)
}

fn probe_failure_from_transport(transport: &ureq::Transport) -> ProbeFailure {
    match transport.kind() {
        ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => ProbeFailure::InvalidUrl,
        ureq::ErrorKind::Dns => ProbeFailure::Dns,
        _ => classify_transport_error_kind(&format!("{:?} {}", transport.kind(), transport)),
    }
}

fn classify_transport_error_kind(raw: &str) -> ProbeFailure {
    let lower = raw.to_ascii_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        ProbeFailure::Timeout
    } else if lower.contains("tls") || lower.contains("ssl") || lower.contains("certificate") {
        ProbeFailure::Tls
    } else if lower.contains("dns") {
        ProbeFailure::Dns
    } else if lower.contains("connection") || lower.contains("connect") {
        ProbeFailure::Connection
    } else {
        ProbeFailure::Transport
    }
}
