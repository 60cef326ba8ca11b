// src/main.rs
use std::sync::Arc;

use anyhow::Context;
use cardsign::{Locale, Orchestrator, OrchestratorConfig, PipelineTarget, TracingSink};
use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Drive the smart-card signing and authentication protocols from a terminal.
#[derive(Parser, Debug)]
#[command(name = "cardsign")]
struct Args {
    /// Base URL of the local signing daemon
    #[arg(long, env = "DAEMON_URL", default_value = cardsign::config::DEFAULT_DAEMON_URL)]
    daemon_url: String,

    /// Base URL of the relying-party backend
    #[arg(long, env = "BACKEND_URL", default_value = cardsign::config::DEFAULT_BACKEND_URL)]
    backend_url: String,

    /// How long to wait for the daemon's /version answer
    #[arg(
        long,
        env = "PROBE_TIMEOUT_MS",
        default_value_t = cardsign::config::DEFAULT_PROBE_TIMEOUT_MS
    )]
    probe_timeout_ms: u64,

    /// Trust the daemon's self-signed certificate
    #[arg(long, env = "ACCEPT_INVALID_DAEMON_CERTS", default_value = "false")]
    accept_invalid_daemon_certs: bool,

    /// Accept a plain-http backend on localhost (development only)
    #[arg(long, env = "TRUST_LOOPBACK_HTTP", default_value = "false")]
    trust_loopback_http: bool,

    /// Language of status messages (en, fi)
    #[arg(long, env = "LOCALE", default_value = "en")]
    locale: Locale,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone, Copy)]
enum Command {
    /// Show the signing daemon's version info
    Probe,
    /// Fetch, sign, submit and verify a document signature
    Sign,
    /// Authenticate with the smart card
    Auth,
    /// Show the current backend session
    Session,
    /// List the backend's certificate authorities
    Cas,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let args = Args::parse();
    let config = OrchestratorConfig {
        daemon_url: args.daemon_url,
        probe_timeout_ms: args.probe_timeout_ms,
        backend_url: args.backend_url,
        accept_invalid_daemon_certs: args.accept_invalid_daemon_certs,
        trust_loopback_http: args.trust_loopback_http,
    };
    let orchestrator = Orchestrator::new(&config, Arc::new(TracingSink::new(args.locale)))
        .context("invalid configuration")?;

    // pick up a login made earlier with the same backend session
    let login = PipelineTarget::new("loginbox");
    if let Some(user) = orchestrator.restore_session(&login).await {
        info!("logged in as {}", user.name);
    }

    let ok = match args.command {
        Command::Probe => orchestrator.probe(&"version".into()).await.is_ok(),
        Command::Sign => orchestrator.sign(&"signing".into()).await.is_ok(),
        Command::Auth => orchestrator.authenticate(&"authentication".into()).await.is_ok(),
        Command::Session => orchestrator.context().current_identity().is_some(),
        Command::Cas => orchestrator.load_cas(&"cas".into()).await.is_ok(),
    };
    if !ok {
        error!("{:?} did not complete", args.command);
        std::process::exit(1);
    }
    Ok(())
}
