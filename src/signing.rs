// src/signing.rs
//
// Signing pipeline: probe → pre-sign → card signature → submit → verify.
//
// Submission and verification are separate round-trips so a caller can tell
// "the signature never reached the backend" (`SubmitSignature` failure) from
// "the backend has it and refuses it" (`VerifySignature` failure).

use std::sync::Arc;

use serde_json::Value;
use tracing::info;
use uuid::Uuid;

use crate::error::{PipelineError, PipelineFailure};
use crate::pipeline::{InFlight, Plumbing, PipelineRun};
use crate::probe::CapabilityProbe;
use crate::session::SignatureRecord;
use crate::status::{Completion, Stage};
use crate::types::{AuthMethod, CapabilityInfo, PipelineTarget, SignatureResult};

#[derive(Debug, Clone)]
pub struct SigningOutcome {
    pub capabilities: CapabilityInfo,
    pub signature: SignatureResult,
    /// Sent with both `/sign` and `/verify`.
    pub correlation_id: Uuid,
}

pub struct SigningPipeline {
    plumbing: Arc<Plumbing>,
    probe: CapabilityProbe,
    in_flight: InFlight,
}

impl SigningPipeline {
    pub fn new(plumbing: Arc<Plumbing>) -> Self {
        Self {
            probe: CapabilityProbe::new(plumbing.clone()),
            plumbing,
            in_flight: InFlight::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.is_busy()
    }

    pub async fn run(&self, target: &PipelineTarget) -> Result<SigningOutcome, PipelineFailure> {
        let run = self.plumbing.run("signing", target);
        let outcome = match self.plumbing.require_secure_origin() {
            Ok(()) => match self.in_flight.try_acquire() {
                Some(_guard) => self.stages(&run).await,
                None => Err(PipelineError::AlreadyRunning.at(Stage::Start)),
            },
            Err(failure) => Err(failure),
        };
        run.finish(outcome, Completion::Signed, |done| {
            serde_json::to_value(&done.signature).ok()
        })
    }

    async fn stages(&self, run: &PipelineRun<'_>) -> Result<SigningOutcome, PipelineFailure> {
        let backend = &self.plumbing.backend;
        let context = &self.plumbing.context;

        let capabilities = self.probe.gate(run).await?;

        let args = backend.prepare_args(&capabilities, AuthMethod::Digisign);
        let request = run.stage(Stage::PreSign, backend.pre_sign(&args)).await?;

        let fields = run
            .stage(Stage::SignDocument, self.plumbing.daemon.sign(request.as_raw()))
            .await?;
        if let Some(status) = fields.get("status").filter(|s| s.as_str() != Some("ok")) {
            return Err(PipelineError::CardDeclined {
                status: status_text(status),
            }
            .at(Stage::SignDocument));
        }
        let signature = SignatureResult::attach(fields, request);

        let correlation_id = Uuid::new_v4();
        context.record_signature(SignatureRecord {
            result: signature.clone(),
            correlation_id,
            verified: false,
        });

        run.stage(
            Stage::SubmitSignature,
            backend.submit_signature(&signature, correlation_id),
        )
        .await?;
        run.stage(Stage::VerifySignature, backend.verify(correlation_id))
            .await?;

        context.mark_signature_verified(correlation_id);
        info!(run = %run.id(), correlation = %correlation_id, "signature verified");
        Ok(SigningOutcome {
            capabilities,
            signature,
            correlation_id,
        })
    }
}

fn status_text(status: &Value) -> String {
    match status {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
