// src/config.rs
//
// Orchestrator configuration.

use std::net::IpAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::{Host, Url};

use crate::error::{PipelineError, Result};

pub const DEFAULT_DAEMON_URL: &str = "https://localhost:53952";
pub const DEFAULT_BACKEND_URL: &str = "https://localhost/";
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct OrchestratorConfig {
    /// Base URL of the local signing daemon.
    pub daemon_url: String,
    pub probe_timeout_ms: u64,
    /// Base URL of the relying-party backend; plays the role of the page origin.
    pub backend_url: String,
    /// Local daemons usually serve a self-signed certificate.
    pub accept_invalid_daemon_certs: bool,
    /// Treat plain `http` on a loopback backend as a secure origin.
    pub trust_loopback_http: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            daemon_url: DEFAULT_DAEMON_URL.into(),
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
            backend_url: DEFAULT_BACKEND_URL.into(),
            accept_invalid_daemon_certs: false,
            trust_loopback_http: false,
        }
    }
}

impl OrchestratorConfig {
    pub fn validate(&self) -> Result<Endpoints> {
        let daemon = parse_base_url("daemonUrl", &self.daemon_url)?;
        let backend = parse_base_url("backendUrl", &self.backend_url)?;
        if self.probe_timeout_ms == 0 {
            return Err(PipelineError::Config("probeTimeoutMs must be positive".into()));
        }
        Ok(Endpoints {
            daemon,
            backend,
            probe_timeout: Duration::from_millis(self.probe_timeout_ms),
            accept_invalid_daemon_certs: self.accept_invalid_daemon_certs,
            trust_loopback_http: self.trust_loopback_http,
        })
    }
}

/// Validated form of [`OrchestratorConfig`].
#[derive(Debug, Clone)]
pub struct Endpoints {
    /// Both base URLs end with `/` so relative endpoint paths join beneath them.
    pub daemon: Url,
    pub backend: Url,
    pub probe_timeout: Duration,
    pub accept_invalid_daemon_certs: bool,
    pub trust_loopback_http: bool,
}

impl Endpoints {
    /// `https` only, unless `trust_loopback_http` also admits plain `http`
    /// on a loopback host.
    pub fn origin_is_secure(&self) -> bool {
        match self.backend.scheme() {
            "https" => true,
            "http" if self.trust_loopback_http => match self.backend.host() {
                Some(Host::Domain(d)) => d.eq_ignore_ascii_case("localhost"),
                Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
                Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
                None => false,
            },
            _ => false,
        }
    }

    /// Host name reported to the backend alongside prepare requests.
    pub fn origin_host(&self) -> &str {
        self.backend.host_str().unwrap_or_default()
    }

    pub fn origin(&self) -> String {
        self.backend.origin().ascii_serialization()
    }

    /// Daemon base URL as reported to the backend, without a trailing slash.
    pub fn daemon_base(&self) -> &str {
        self.daemon.as_str().trim_end_matches('/')
    }
}

fn parse_base_url(field: &str, raw: &str) -> Result<Url> {
    let mut url = Url::parse(raw).map_err(|e| PipelineError::Config(format!("{field}: {e}")))?;
    if !matches!(url.scheme(), "http" | "https") || url.host().is_none() {
        return Err(PipelineError::Config(format!("{field}: {raw} is not an http(s) URL")));
    }
    if !url.path().ends_with('/') {
        let path = format!("{}/", url.path());
        url.set_path(&path);
    }
    Ok(url)
}
