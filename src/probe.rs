// src/probe.rs
use std::sync::Arc;

use serde_json::Value;

use crate::error::{PipelineFailure, Result};
use crate::pipeline::{Plumbing, PipelineRun};
use crate::status::{Completion, Stage};
use crate::types::{CapabilityInfo, PipelineTarget};

/// Liveness/version check of the local signing daemon. Never cached: a daemon
/// that went away since the last probe is noticed on the next one.
#[derive(Clone)]
pub struct CapabilityProbe {
    plumbing: Arc<Plumbing>,
}

impl CapabilityProbe {
    pub fn new(plumbing: Arc<Plumbing>) -> Self {
        Self { plumbing }
    }

    /// First stage of every pipeline.
    pub(crate) async fn gate(
        &self,
        run: &PipelineRun<'_>,
    ) -> Result<CapabilityInfo, PipelineFailure> {
        run.stage(Stage::Probe, self.plumbing.daemon.version()).await
    }

    /// Stand-alone probe: reports the daemon's properties to `target`.
    pub async fn probe(&self, target: &PipelineTarget) -> Result<CapabilityInfo, PipelineFailure> {
        let run = self.plumbing.run("probe", target);
        let outcome = self.gate(&run).await;
        run.finish(outcome, Completion::DaemonInfo, |info| {
            Some(Value::Object(info.fields().clone()))
        })
    }
}
