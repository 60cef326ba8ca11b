// src/status.rs
//
// Progress and result notifications.
//
// The core never formats user-facing text. It emits `StatusEvent`s keyed by
// the caller's `PipelineTarget`; sinks decide how to present them (see
// `crate::presentation`).

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ErrorKind;
use crate::presentation::{describe, render_fields, Locale};
use crate::types::PipelineTarget;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Start,
    Probe,
    PreSign,
    SignDocument,
    SubmitSignature,
    VerifySignature,
    Challenge,
    SignChallenge,
    Authenticate,
    RestoreSession,
    LoadCas,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Start => "start",
            Stage::Probe => "probe",
            Stage::PreSign => "pre-sign",
            Stage::SignDocument => "sign-document",
            Stage::SubmitSignature => "submit-signature",
            Stage::VerifySignature => "verify-signature",
            Stage::Challenge => "challenge",
            Stage::SignChallenge => "sign-challenge",
            Stage::Authenticate => "authenticate",
            Stage::RestoreSession => "restore-session",
            Stage::LoadCas => "load-cas",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    DaemonInfo,
    Signed,
    Authenticated,
    SessionRestored,
    NoSession,
    CasLoaded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "phase", rename_all = "snake_case")]
pub enum StatusKind {
    InProgress { stage: Stage },
    Completed { completion: Completion },
    Failed { stage: Stage, error: ErrorKind },
}

impl StatusKind {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StatusKind::InProgress { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    pub target: PipelineTarget,
    pub run_id: Uuid,
    pub kind: StatusKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
    pub at: DateTime<Utc>,
}

impl StatusEvent {
    pub fn new(target: PipelineTarget, run_id: Uuid, kind: StatusKind) -> Self {
        Self {
            target,
            run_id,
            kind,
            detail: None,
            at: Utc::now(),
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }
}

/// Receiver of status notifications. Implementations must not block.
pub trait StatusSink: Send + Sync {
    fn notify(&self, event: StatusEvent);
}

/// Logs every event as a localized line.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink {
    locale: Locale,
}

impl TracingSink {
    pub fn new(locale: Locale) -> Self {
        Self { locale }
    }
}

impl StatusSink for TracingSink {
    fn notify(&self, event: StatusEvent) {
        let message = describe(&event.kind, self.locale);
        match event.kind {
            StatusKind::Failed { .. } => {
                warn!(ui = %event.target, run = %event.run_id, "{message}")
            }
            _ => match &event.detail {
                Some(Value::Object(fields)) => {
                    let text = render_fields(message, fields);
                    info!(ui = %event.target, run = %event.run_id, "{text}")
                }
                Some(Value::String(text)) => {
                    info!(ui = %event.target, run = %event.run_id, "{message}:\n{text}")
                }
                Some(other) => {
                    info!(ui = %event.target, run = %event.run_id, detail = %other, "{message}")
                }
                None => info!(ui = %event.target, run = %event.run_id, "{message}"),
            },
        }
    }
}

/// Forwards events to an unbounded tokio channel, e.g. a UI task.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<StatusEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<StatusEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl StatusSink for ChannelSink {
    fn notify(&self, event: StatusEvent) {
        // receiver gone means nobody is watching; not a pipeline failure
        let _ = self.tx.send(event);
    }
}
