// src/orchestrator.rs
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::authentication::AuthenticationPipeline;
use crate::config::OrchestratorConfig;
use crate::error::{PipelineFailure, Result};
use crate::pipeline::Plumbing;
use crate::probe::CapabilityProbe;
use crate::session::{SessionContext, SessionManager};
use crate::signing::{SigningOutcome, SigningPipeline};
use crate::status::{Completion, Stage, StatusSink};
use crate::transport::{BackendClient, DaemonClient};
use crate::types::{CapabilityInfo, PipelineTarget, SignerIdentity};

/// Entry point for UI triggers. Owns one instance of every component and the
/// shared [`SessionContext`].
pub struct Orchestrator {
    plumbing: Arc<Plumbing>,
    probe: CapabilityProbe,
    signing: SigningPipeline,
    authentication: AuthenticationPipeline,
    session: SessionManager,
}

impl Orchestrator {
    pub fn new(config: &OrchestratorConfig, sink: Arc<dyn StatusSink>) -> Result<Self> {
        let endpoints = config.validate()?;
        let plumbing = Arc::new(Plumbing {
            daemon: DaemonClient::new(endpoints.clone())?,
            backend: BackendClient::new(endpoints)?,
            context: Arc::new(SessionContext::new()),
            sink,
            cancel: CancellationToken::new(),
        });
        Ok(Self {
            probe: CapabilityProbe::new(plumbing.clone()),
            signing: SigningPipeline::new(plumbing.clone()),
            authentication: AuthenticationPipeline::new(plumbing.clone()),
            session: SessionManager::new(plumbing.clone()),
            plumbing,
        })
    }

    pub fn context(&self) -> &Arc<SessionContext> {
        &self.plumbing.context
    }

    pub async fn probe(&self, target: &PipelineTarget) -> Result<CapabilityInfo, PipelineFailure> {
        self.probe.probe(target).await
    }

    pub async fn sign(&self, target: &PipelineTarget) -> Result<SigningOutcome, PipelineFailure> {
        self.signing.run(target).await
    }

    pub async fn authenticate(
        &self,
        target: &PipelineTarget,
    ) -> Result<SignerIdentity, PipelineFailure> {
        self.authentication.run(target).await
    }

    pub async fn restore_session(&self, target: &PipelineTarget) -> Option<SignerIdentity> {
        self.session.restore_session(target).await
    }

    /// Certificate authorities accepted by the backend, as served by `/load-cas`.
    pub async fn load_cas(&self, target: &PipelineTarget) -> Result<String, PipelineFailure> {
        let run = self.plumbing.run("load-cas", target);
        let outcome = run.stage(Stage::LoadCas, self.plumbing.backend.load_cas()).await;
        run.finish(outcome, Completion::CasLoaded, |text| {
            Some(Value::String(text.clone()))
        })
    }

    pub fn is_busy(&self) -> bool {
        self.signing.is_running() || self.authentication.is_running()
    }

    /// Abort every in-flight stage. Pipelines started afterwards fail with
    /// `Cancelled` at their first stage.
    pub fn cancel_all(&self) {
        self.plumbing.cancel.cancel();
    }
}
