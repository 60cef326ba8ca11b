// src/transport.rs
//
// HTTP clients for the two remote parties: the local signing daemon and the
// relying-party backend.

use reqwest::header::{HeaderValue, CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use reqwest::{Client, Response};
use serde::de::DeserializeOwned;
use serde_json::value::RawValue;
use serde_json::{Map, Value};
use tracing::debug;
use url::Url;
use uuid::Uuid;

use crate::config::Endpoints;
use crate::error::{PipelineError, Result};
use crate::types::{
    AuthChallenge, AuthMethod, CapabilityInfo, PrepareArgs, PreSignRequest, SignatureResult,
    SignedAuthResponse, SignerIdentity,
};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

const JSON: &str = "application/json; charset=UTF-8";

#[derive(Debug, Clone)]
pub struct DaemonClient {
    http: Client,
    endpoints: Endpoints,
}

impl DaemonClient {
    pub fn new(endpoints: Endpoints) -> Result<Self> {
        let http = Client::builder()
            .danger_accept_invalid_certs(endpoints.accept_invalid_daemon_certs)
            .build()
            .map_err(|e| PipelineError::Config(format!("daemon client: {e}")))?;
        Ok(Self { http, endpoints })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.endpoints
            .daemon
            .join(path)
            .map_err(|e| PipelineError::Config(format!("daemon {path}: {e}")))
    }

    /// `GET /version`, never served from cache, bounded by the probe timeout.
    pub async fn version(&self) -> Result<CapabilityInfo> {
        let timeout = self.endpoints.probe_timeout;
        let res = self
            .http
            .get(self.url("version")?)
            .header(CONTENT_TYPE, JSON)
            .header(CACHE_CONTROL, HeaderValue::from_static("no-cache, no-store, max-age=0"))
            .header(PRAGMA, HeaderValue::from_static("no-cache"))
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| PipelineError::DaemonUnavailable {
                reason: if e.is_timeout() {
                    format!("no answer within {}ms", timeout.as_millis())
                } else {
                    e.to_string()
                },
            })?;
        if !res.status().is_success() {
            return Err(PipelineError::DaemonUnavailable {
                reason: format!("HTTP {}", res.status().as_u16()),
            });
        }
        let text = res.text().await.map_err(|e| PipelineError::DaemonUnavailable {
            reason: e.to_string(),
        })?;
        parse("daemon /version", &text)
    }

    /// `POST /sign` with `payload` forwarded byte for byte.
    pub async fn sign(&self, payload: &RawValue) -> Result<Map<String, Value>> {
        let res = self
            .http
            .post(self.url("sign")?)
            .header(CONTENT_TYPE, JSON)
            .body(payload.get().to_owned())
            .send()
            .await
            .map_err(|e| PipelineError::DaemonRequestFailed {
                reason: e.to_string(),
            })?;
        if !res.status().is_success() {
            return Err(PipelineError::DaemonRequestFailed {
                reason: format!("HTTP {}", res.status().as_u16()),
            });
        }
        let text = res.text().await.map_err(|e| PipelineError::DaemonRequestFailed {
            reason: e.to_string(),
        })?;
        parse("daemon /sign", &text)
    }
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    http: Client,
    endpoints: Endpoints,
}

impl BackendClient {
    pub fn new(endpoints: Endpoints) -> Result<Self> {
        let http = Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| PipelineError::Config(format!("backend client: {e}")))?;
        Ok(Self { http, endpoints })
    }

    pub fn endpoints(&self) -> &Endpoints {
        &self.endpoints
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.endpoints
            .backend
            .join(path)
            .map_err(|e| PipelineError::Config(format!("backend {path}: {e}")))
    }

    pub fn prepare_args<'a>(
        &'a self,
        info: &'a CapabilityInfo,
        method: AuthMethod,
    ) -> PrepareArgs<'a> {
        PrepareArgs {
            host: self.endpoints.origin_host(),
            version: info,
            url: self.endpoints.daemon_base(),
            method,
        }
    }

    pub async fn pre_sign(&self, args: &PrepareArgs<'_>) -> Result<PreSignRequest> {
        let req = self.http.post(self.url("pre-sign")?).json(args);
        let res = self.send_checked("pre-sign", req).await?;
        let text = read_text("pre-sign", res).await?;
        parse("pre-sign", &text)
    }

    /// `POST /sign`. Success only means the backend accepted it for storage.
    pub async fn submit_signature(
        &self,
        signature: &SignatureResult,
        correlation: Uuid,
    ) -> Result<()> {
        let req = self
            .http
            .post(self.url("sign")?)
            .header(CORRELATION_HEADER, correlation.to_string())
            .json(signature);
        self.send_checked("sign", req).await.map(drop)
    }

    pub async fn verify(&self, correlation: Uuid) -> Result<()> {
        let res = self
            .http
            .get(self.url("verify")?)
            .header(CORRELATION_HEADER, correlation.to_string())
            .send()
            .await
            .map_err(|e| request_failed("verify", e))?;
        if !res.status().is_success() {
            return Err(PipelineError::VerificationRejected {
                endpoint: "verify",
                status: res.status().as_u16(),
            });
        }
        Ok(())
    }

    pub async fn auth_challenge(&self, args: &PrepareArgs<'_>) -> Result<AuthChallenge> {
        let req = self.http.post(self.url("auth-challenge")?).json(args);
        let res = self.send_checked("auth-challenge", req).await?;
        let text = read_text("auth-challenge", res).await?;
        let raw: Box<RawValue> = parse("auth-challenge", &text)?;
        Ok(AuthChallenge::new(raw, args.method))
    }

    pub async fn authenticate(&self, response: &SignedAuthResponse) -> Result<SignerIdentity> {
        let res = self
            .http
            .post(self.url("authenticate")?)
            .json(response)
            .send()
            .await
            .map_err(|e| request_failed("authenticate", e))?;
        if !res.status().is_success() {
            return Err(PipelineError::VerificationRejected {
                endpoint: "authenticate",
                status: res.status().as_u16(),
            });
        }
        let text = read_text("authenticate", res).await?;
        parse("authenticate", &text)
    }

    /// `GET /session`. Any non-success status means there is no session.
    pub async fn session(&self) -> Result<Option<SignerIdentity>> {
        let res = self
            .http
            .get(self.url("session")?)
            .send()
            .await
            .map_err(|e| request_failed("session", e))?;
        if !res.status().is_success() {
            debug!("no session (HTTP {})", res.status().as_u16());
            return Ok(None);
        }
        let text = read_text("session", res).await?;
        parse("session", &text).map(Some)
    }

    pub async fn load_cas(&self) -> Result<String> {
        let res = self.send_checked("load-cas", self.http.get(self.url("load-cas")?)).await?;
        read_text("load-cas", res).await
    }

    async fn send_checked(
        &self,
        endpoint: &'static str,
        req: reqwest::RequestBuilder,
    ) -> Result<Response> {
        let res = req.send().await.map_err(|e| request_failed(endpoint, e))?;
        if !res.status().is_success() {
            return Err(PipelineError::BackendRequestFailed {
                endpoint,
                reason: format!("HTTP {}", res.status().as_u16()),
            });
        }
        Ok(res)
    }
}

fn request_failed(endpoint: &'static str, e: reqwest::Error) -> PipelineError {
    PipelineError::BackendRequestFailed {
        endpoint,
        reason: e.to_string(),
    }
}

async fn read_text(endpoint: &'static str, res: Response) -> Result<String> {
    res.text().await.map_err(|e| request_failed(endpoint, e))
}

fn parse<T: DeserializeOwned>(endpoint: &'static str, text: &str) -> Result<T> {
    serde_json::from_str(text)
        .map_err(|source| PipelineError::MalformedResponse { endpoint, source })
}
