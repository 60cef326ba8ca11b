// src/error.rs
use serde::Serialize;

use crate::status::Stage;

/// Errors raised by a single pipeline stage.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// `/version` timed out or returned a non-success status
    #[error("signing daemon unavailable: {reason}")]
    DaemonUnavailable { reason: String },

    /// Daemon `/sign` could not be reached or answered with a non-success status
    #[error("signing daemon request failed: {reason}")]
    DaemonRequestFailed { reason: String },

    /// The daemon answered, but the card refused the operation
    #[error("card declined the operation (status {status:?})")]
    CardDeclined { status: String },

    #[error("backend request to {endpoint} failed: {reason}")]
    BackendRequestFailed { endpoint: &'static str, reason: String },

    /// A finalizing backend call (`/verify`, `/authenticate`) refused a delivered payload
    #[error("backend rejected {endpoint} (HTTP {status})")]
    VerificationRejected { endpoint: &'static str, status: u16 },

    #[error("refusing to run over insecure origin {origin}")]
    PolicyViolation { origin: String },

    #[error("malformed response from {endpoint}: {source}")]
    MalformedResponse {
        endpoint: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("pipeline is already in flight")]
    AlreadyRunning,

    #[error("pipeline cancelled")]
    Cancelled,

    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Coarse classification of [`PipelineError`], carried in status events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    DaemonUnavailable,
    DaemonRequestFailed,
    CardDeclined,
    BackendRequestFailed,
    VerificationRejected,
    PolicyViolation,
    MalformedResponse,
    AlreadyRunning,
    Cancelled,
    Config,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::DaemonUnavailable { .. } => ErrorKind::DaemonUnavailable,
            Self::DaemonRequestFailed { .. } => ErrorKind::DaemonRequestFailed,
            Self::CardDeclined { .. } => ErrorKind::CardDeclined,
            Self::BackendRequestFailed { .. } => ErrorKind::BackendRequestFailed,
            Self::VerificationRejected { .. } => ErrorKind::VerificationRejected,
            Self::PolicyViolation { .. } => ErrorKind::PolicyViolation,
            Self::MalformedResponse { .. } => ErrorKind::MalformedResponse,
            Self::AlreadyRunning => ErrorKind::AlreadyRunning,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Config(_) => ErrorKind::Config,
        }
    }

    /// Tag this error with the stage it terminated.
    pub fn at(self, stage: Stage) -> PipelineFailure {
        PipelineFailure { stage, error: self }
    }
}

/// Terminal failure of a pipeline invocation.
#[derive(Debug, thiserror::Error)]
#[error("{stage} stage failed: {error}")]
pub struct PipelineFailure {
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
}

impl PipelineFailure {
    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
