// src/lib.rs
//! Browser-style orchestration of smart-card signing and authentication.
//!
//! Three parties take part: the caller, a local signing daemon used as an
//! opaque signing oracle, and a relying-party backend that issues pre-sign
//! requests and challenges and verifies the results. The [`Orchestrator`]
//! runs the two protocols as linear async pipelines, each gated by a probe of
//! the daemon, and reports every step to a [`StatusSink`].

pub mod authentication;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod pipeline;
pub mod presentation;
pub mod probe;
pub mod session;
pub mod signing;
pub mod status;
pub mod transport;
pub mod types;

pub use config::OrchestratorConfig;
pub use error::{ErrorKind, PipelineError, PipelineFailure};
pub use orchestrator::Orchestrator;
pub use presentation::Locale;
pub use session::{SessionContext, SignatureRecord};
pub use signing::SigningOutcome;
pub use status::{ChannelSink, Completion, Stage, StatusEvent, StatusKind, StatusSink, TracingSink};
pub use types::*;
