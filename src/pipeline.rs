// src/pipeline.rs
//
// Linear async pipeline plumbing.
//
// A pipeline is an ordered chain of stages. Each stage is awaited through
// `PipelineRun::stage`, which announces the stage before anything is sent,
// races it against the shared cancellation token, and tags any error with the
// stage it came from. `?` then ends the chain, so stage N+1 never starts
// unless stage N succeeded. `PipelineRun::finish` is the one place where
// the outcome turns into a terminal status event.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::Endpoints;
use crate::error::{PipelineError, PipelineFailure};
use crate::session::SessionContext;
use crate::status::{Completion, Stage, StatusEvent, StatusKind, StatusSink};
use crate::transport::{BackendClient, DaemonClient};
use crate::types::PipelineTarget;

/// Collaborators shared by every component of one orchestrator.
pub struct Plumbing {
    pub daemon: DaemonClient,
    pub backend: BackendClient,
    pub context: Arc<SessionContext>,
    pub sink: Arc<dyn StatusSink>,
    pub cancel: CancellationToken,
}

impl Plumbing {
    pub fn endpoints(&self) -> &Endpoints {
        self.backend.endpoints()
    }

    pub(crate) fn run<'a>(
        &'a self,
        name: &'static str,
        target: &'a PipelineTarget,
    ) -> PipelineRun<'a> {
        PipelineRun {
            name,
            id: Uuid::new_v4(),
            target,
            sink: self.sink.as_ref(),
            cancel: self.cancel.child_token(),
        }
    }

    /// Secure-origin precondition for both pipelines; checked before any I/O.
    pub(crate) fn require_secure_origin(&self) -> Result<(), PipelineFailure> {
        let endpoints = self.endpoints();
        if endpoints.origin_is_secure() {
            return Ok(());
        }
        Err(PipelineError::PolicyViolation {
            origin: endpoints.origin(),
        }
        .at(Stage::Start))
    }
}

/// One invocation of a pipeline.
pub struct PipelineRun<'a> {
    name: &'static str,
    id: Uuid,
    target: &'a PipelineTarget,
    sink: &'a dyn StatusSink,
    cancel: CancellationToken,
}

impl PipelineRun<'_> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn notify(&self, kind: StatusKind, detail: Option<Value>) {
        let event = StatusEvent::new(self.target.clone(), self.id, kind);
        self.sink.notify(match detail {
            Some(detail) => event.with_detail(detail),
            None => event,
        });
    }

    pub async fn stage<T, F>(&self, stage: Stage, fut: F) -> Result<T, PipelineFailure>
    where
        F: Future<Output = Result<T, PipelineError>>,
    {
        if self.cancel.is_cancelled() {
            return Err(PipelineError::Cancelled.at(stage));
        }
        debug!(pipeline = self.name, run = %self.id, %stage, "stage started");
        self.notify(StatusKind::InProgress { stage }, None);
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(PipelineError::Cancelled.at(stage)),
            res = fut => res.map_err(|e| e.at(stage)),
        }
    }

    /// Emit exactly one terminal event for `outcome` and hand it back.
    pub fn finish<T>(
        &self,
        outcome: Result<T, PipelineFailure>,
        completion: Completion,
        detail: impl FnOnce(&T) -> Option<Value>,
    ) -> Result<T, PipelineFailure> {
        match &outcome {
            Ok(value) => {
                info!(pipeline = self.name, run = %self.id, "completed");
                self.notify(StatusKind::Completed { completion }, detail(value));
            }
            Err(failure) => {
                warn!(pipeline = self.name, run = %self.id, "{failure}");
                self.notify(
                    StatusKind::Failed {
                        stage: failure.stage,
                        error: failure.kind(),
                    },
                    None,
                );
            }
        }
        outcome
    }
}

/// Per-pipeline re-entrancy flag.
#[derive(Debug, Default)]
pub struct InFlight(AtomicBool);

impl InFlight {
    pub fn try_acquire(&self) -> Option<InFlightGuard<'_>> {
        self.0
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard(&self.0))
    }

    pub fn is_busy(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

pub struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}
