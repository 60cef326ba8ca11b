// src/types.rs
use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::value::RawValue;
use serde_json::{Map, Value};

/// Field under which the originating pre-sign request travels with a signature.
pub const REQUEST_FIELD: &str = "request";
/// Field under which the original challenge travels with an auth response.
pub const SIGNED_DATA_FIELD: &str = "signedData";

/// Caller-supplied handle naming where progress for a run is reported.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PipelineTarget(String);

impl PipelineTarget {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PipelineTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PipelineTarget {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthMethod {
    #[default]
    Digisign,
}

/// Properties reported by a live signing daemon. Fresh per probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityInfo(Map<String, Value>);

impl CapabilityInfo {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// Body of `/pre-sign` and `/auth-challenge`.
#[derive(Debug, Serialize)]
pub struct PrepareArgs<'a> {
    pub host: &'a str,
    pub version: &'a CapabilityInfo,
    pub url: &'a str,
    #[serde(rename = "type")]
    pub method: AuthMethod,
}

/// What the backend wants signed. Kept as the exact bytes the backend sent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreSignRequest(Box<RawValue>);

impl PreSignRequest {
    pub fn as_raw(&self) -> &RawValue {
        &self.0
    }

    pub fn get(&self) -> &str {
        self.0.get()
    }
}

/// A daemon signature bound to the request it attests to.
#[derive(Debug, Clone)]
pub struct SignatureResult {
    fields: Map<String, Value>,
    request: PreSignRequest,
}

impl SignatureResult {
    /// Attach `request` to the daemon's output. A `request` field reported by
    /// the daemon itself is replaced.
    pub fn attach(mut fields: Map<String, Value>, request: PreSignRequest) -> Self {
        fields.remove(REQUEST_FIELD);
        Self { fields, request }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn request(&self) -> &PreSignRequest {
        &self.request
    }
}

impl Serialize for SignatureResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_with(&self.fields, REQUEST_FIELD, self.request.as_raw(), serializer)
    }
}

#[derive(Debug, Clone)]
pub struct AuthChallenge {
    raw: Box<RawValue>,
    method: AuthMethod,
}

impl AuthChallenge {
    pub fn new(raw: Box<RawValue>, method: AuthMethod) -> Self {
        Self { raw, method }
    }

    pub fn as_raw(&self) -> &RawValue {
        &self.raw
    }

    pub fn method(&self) -> AuthMethod {
        self.method
    }
}

/// Daemon answer to a challenge.
#[derive(Debug, Clone, Deserialize)]
#[serde(transparent)]
pub struct AuthResponse(Map<String, Value>);

impl From<Map<String, Value>> for AuthResponse {
    fn from(fields: Map<String, Value>) -> Self {
        Self(fields)
    }
}

impl AuthResponse {
    pub fn status(&self) -> Option<&str> {
        self.0.get("status").and_then(Value::as_str)
    }

    pub fn is_ok(&self) -> bool {
        self.status() == Some("ok")
    }

    /// Bind the response to the challenge it answers.
    pub fn bind(mut self, challenge: AuthChallenge) -> SignedAuthResponse {
        self.0.remove(SIGNED_DATA_FIELD);
        SignedAuthResponse {
            response: self,
            challenge,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SignedAuthResponse {
    response: AuthResponse,
    challenge: AuthChallenge,
}

impl SignedAuthResponse {
    pub fn challenge(&self) -> &AuthChallenge {
        &self.challenge
    }
}

impl Serialize for SignedAuthResponse {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serialize_with(
            &self.response.0,
            SIGNED_DATA_FIELD,
            self.challenge.as_raw(),
            serializer,
        )
    }
}

/// Backend-verified signer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignerIdentity {
    pub name: String,
    #[serde(flatten)]
    pub attributes: Map<String, Value>,
}

fn serialize_with<S: Serializer>(
    fields: &Map<String, Value>,
    key: &str,
    attached: &RawValue,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut map = serializer.serialize_map(Some(fields.len() + 1))?;
    for (k, v) in fields {
        map.serialize_entry(k, v)?;
    }
    map.serialize_entry(key, attached)?;
    map.end()
}
