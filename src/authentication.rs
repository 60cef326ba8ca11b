// src/authentication.rs
//
// Authentication pipeline: probe → challenge → card response → authenticate.
// The challenge travels back to the backend untouched under `signedData`;
// the backend checks it against the one it issued. Challenges are never
// reused across runs.

use std::sync::Arc;

use tracing::{debug, info};

use crate::error::{PipelineError, PipelineFailure};
use crate::pipeline::{InFlight, Plumbing, PipelineRun};
use crate::probe::CapabilityProbe;
use crate::status::{Completion, Stage};
use crate::types::{AuthMethod, AuthResponse, PipelineTarget, SignerIdentity};

pub struct AuthenticationPipeline {
    plumbing: Arc<Plumbing>,
    probe: CapabilityProbe,
    method: AuthMethod,
    in_flight: InFlight,
}

impl AuthenticationPipeline {
    pub fn new(plumbing: Arc<Plumbing>) -> Self {
        Self {
            probe: CapabilityProbe::new(plumbing.clone()),
            plumbing,
            method: AuthMethod::default(),
            in_flight: InFlight::default(),
        }
    }

    pub fn is_running(&self) -> bool {
        self.in_flight.is_busy()
    }

    pub async fn run(&self, target: &PipelineTarget) -> Result<SignerIdentity, PipelineFailure> {
        let run = self.plumbing.run("authentication", target);
        // policy check first: an insecure origin must not cause a single request
        let outcome = match self.plumbing.require_secure_origin() {
            Ok(()) => match self.in_flight.try_acquire() {
                Some(_guard) => {
                    let outcome = self.stages(&run).await;
                    if outcome.is_err() {
                        self.plumbing.context.install_identity(None);
                    }
                    outcome
                }
                None => Err(PipelineError::AlreadyRunning.at(Stage::Start)),
            },
            Err(failure) => Err(failure),
        };
        run.finish(outcome, Completion::Authenticated, |identity| {
            serde_json::to_value(identity).ok()
        })
    }

    async fn stages(&self, run: &PipelineRun<'_>) -> Result<SignerIdentity, PipelineFailure> {
        let backend = &self.plumbing.backend;

        let capabilities = self.probe.gate(run).await?;

        let args = backend.prepare_args(&capabilities, self.method);
        let challenge = run.stage(Stage::Challenge, backend.auth_challenge(&args)).await?;

        let response = run
            .stage(Stage::SignChallenge, self.plumbing.daemon.sign(challenge.as_raw()))
            .await
            .map(AuthResponse::from)?;
        if !response.is_ok() {
            return Err(PipelineError::CardDeclined {
                status: response.status().unwrap_or("<missing>").to_owned(),
            }
            .at(Stage::SignChallenge));
        }

        let signed = response.bind(challenge);
        debug!(run = %run.id(), method = ?signed.challenge().method(), "challenge answered");
        let identity = run
            .stage(Stage::Authenticate, backend.authenticate(&signed))
            .await?;

        self.plumbing.context.install_identity(Some(identity.clone()));
        info!(run = %run.id(), user = %identity.name, "authenticated");
        Ok(identity)
    }
}
