// src/session.rs
//
// Process-wide login/signature state and session recovery.
//
// `SessionContext` holds the only state shared between pipelines. Each
// slot has a single writer:
//
// - `identity`: the authentication pipeline's terminal stage and
//   `SessionManager` (plus an explicit logout via `clear_identity`)
// - `signature`: the signing pipeline only
//
// Writes are last-write-wins; concurrent runs of the same pipeline are
// refused by its in-flight guard, so a slot never sees two writers at once.

use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::pipeline::Plumbing;
use crate::status::{Completion, Stage, StatusKind};
use crate::types::{PipelineTarget, SignatureResult, SignerIdentity};

/// Last signature produced by the signing pipeline.
#[derive(Debug, Clone, Serialize)]
pub struct SignatureRecord {
    pub result: SignatureResult,
    pub correlation_id: Uuid,
    /// Set only after the backend accepted `/verify`.
    pub verified: bool,
}

#[derive(Debug)]
pub struct SessionContext {
    identity: watch::Sender<Option<SignerIdentity>>,
    signature: watch::Sender<Option<SignatureRecord>>,
}

impl Default for SessionContext {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionContext {
    pub fn new() -> Self {
        Self {
            identity: watch::Sender::new(None),
            signature: watch::Sender::new(None),
        }
    }

    pub fn current_identity(&self) -> Option<SignerIdentity> {
        self.identity.borrow().clone()
    }

    pub fn subscribe_identity(&self) -> watch::Receiver<Option<SignerIdentity>> {
        self.identity.subscribe()
    }

    /// Logout. The backend owns the session; locally absence means logged out.
    pub fn clear_identity(&self) {
        self.identity.send_replace(None);
    }

    pub fn current_signature(&self) -> Option<SignatureRecord> {
        self.signature.borrow().clone()
    }

    pub fn subscribe_signature(&self) -> watch::Receiver<Option<SignatureRecord>> {
        self.signature.subscribe()
    }

    pub(crate) fn install_identity(&self, identity: Option<SignerIdentity>) {
        self.identity.send_replace(identity);
    }

    pub(crate) fn record_signature(&self, record: SignatureRecord) {
        self.signature.send_replace(Some(record));
    }

    pub(crate) fn mark_signature_verified(&self, correlation_id: Uuid) {
        self.signature.send_if_modified(|slot| match slot {
            Some(record) if record.correlation_id == correlation_id => {
                record.verified = true;
                true
            }
            _ => false,
        });
    }
}

/// Recovers an existing backend session, e.g. at startup.
#[derive(Clone)]
pub struct SessionManager {
    plumbing: Arc<Plumbing>,
}

impl SessionManager {
    pub fn new(plumbing: Arc<Plumbing>) -> Self {
        Self { plumbing }
    }

    /// A missing session is the normal logged-out state, not an error: every
    /// outcome other than a valid identity yields `None`.
    pub async fn restore_session(&self, target: &PipelineTarget) -> Option<SignerIdentity> {
        let run = self.plumbing.run("session", target);
        let stage = Stage::RestoreSession;
        let found = match run.stage(stage, self.plumbing.backend.session()).await {
            Ok(found) => found,
            Err(failure) => {
                match failure.error {
                    PipelineError::MalformedResponse { .. } => warn!("ignoring session: {failure}"),
                    _ => debug!("no session: {failure}"),
                }
                None
            }
        };

        self.plumbing.context.install_identity(found.clone());
        match &found {
            Some(identity) => {
                info!(user = %identity.name, "session restored");
                let detail = serde_json::to_value(identity).unwrap_or(Value::Null);
                run.notify(
                    StatusKind::Completed {
                        completion: Completion::SessionRestored,
                    },
                    Some(detail),
                );
            }
            None => run.notify(
                StatusKind::Completed {
                    completion: Completion::NoSession,
                },
                None,
            ),
        }
        found
    }
}
