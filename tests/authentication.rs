// tests/authentication.rs
mod common;

use std::time::Duration;

use cardsign::{Completion, ErrorKind, OrchestratorConfig, PipelineTarget, Stage, StatusKind};
use common::{drain, kinds, orchestrator_with, Fake, Party, Reply};
use serde_json::json;

fn target() -> PipelineTarget {
    PipelineTarget::new("authentication")
}

async fn card_fake() -> Fake {
    let fake = Fake::start().await;
    fake.reply(
        Party::Daemon,
        "sign",
        Reply::json(json!({"status": "ok", "signature": "c2ln"})),
    );
    fake
}

#[tokio::test]
async fn authenticates_and_installs_identity() {
    let fake = card_fake().await;
    let (orchestrator, mut rx) = fake.orchestrator();

    let identity = orchestrator.authenticate(&target()).await.expect("authenticated");
    assert_eq!(identity.name, "Alice");
    assert_eq!(identity.attributes["serial"], "FI-123");
    assert_eq!(orchestrator.context().current_identity(), Some(identity));

    let events = drain(&mut rx);
    assert_eq!(
        kinds(&events),
        vec![
            StatusKind::InProgress { stage: Stage::Probe },
            StatusKind::InProgress { stage: Stage::Challenge },
            StatusKind::InProgress { stage: Stage::SignChallenge },
            StatusKind::InProgress { stage: Stage::Authenticate },
            StatusKind::Completed {
                completion: Completion::Authenticated
            },
        ]
    );
    assert_eq!(events.last().unwrap().detail.as_ref().unwrap()["name"], "Alice");
}

#[tokio::test]
async fn signed_data_is_the_issued_challenge() {
    let fake = card_fake().await;
    let (orchestrator, _rx) = fake.orchestrator();

    orchestrator.authenticate(&target()).await.expect("authenticated");

    let challenge = fake.hits_to(Party::Backend, "auth-challenge")[0].reply.clone();
    assert!(challenge.contains(r#"",  "type":"digisign", "ttl": 1.0}"#));
    assert_eq!(fake.hits_to(Party::Daemon, "sign")[0].body, challenge);

    let submitted = &fake.hits_to(Party::Backend, "authenticate")[0].body;
    assert_eq!(
        *submitted,
        format!(r#"{{"signature":"c2ln","status":"ok","signedData":{challenge}}}"#)
    );
}

#[tokio::test]
async fn every_run_fetches_a_fresh_challenge() {
    let fake = card_fake().await;
    let (orchestrator, _rx) = fake.orchestrator();

    orchestrator.authenticate(&target()).await.expect("first run");
    orchestrator.authenticate(&target()).await.expect("second run");

    let issued: Vec<String> = fake
        .hits_to(Party::Backend, "auth-challenge")
        .into_iter()
        .map(|h| h.reply)
        .collect();
    assert_eq!(issued.len(), 2);
    assert_ne!(issued[0], issued[1]);
}

#[tokio::test]
async fn insecure_origin_is_a_policy_violation() {
    let fake = card_fake().await;
    let config = OrchestratorConfig {
        backend_url: "http://sign.example.org/".into(),
        ..fake.config()
    };
    let (orchestrator, mut rx) = orchestrator_with(&config);

    let failure = orchestrator.authenticate(&target()).await.unwrap_err();
    assert_eq!(failure.kind(), ErrorKind::PolicyViolation);
    assert!(fake.hits().is_empty());
    assert_eq!(drain(&mut rx).len(), 1);
}

#[tokio::test]
async fn card_decline_is_not_a_transport_failure() {
    let fake = Fake::start().await;
    fake.reply(Party::Daemon, "sign", Reply::json(json!({"status": "pin_blocked"})));
    let (orchestrator, _rx) = fake.orchestrator();

    let declined = orchestrator.authenticate(&target()).await.unwrap_err();
    assert_eq!(declined.stage, Stage::SignChallenge);
    assert_eq!(declined.kind(), ErrorKind::CardDeclined);

    fake.reply(Party::Daemon, "sign", Reply::status(500));
    let unreachable = orchestrator.authenticate(&target()).await.unwrap_err();
    assert_eq!(unreachable.stage, Stage::SignChallenge);
    assert_eq!(unreachable.kind(), ErrorKind::DaemonRequestFailed);

    assert!(fake.hits_to(Party::Backend, "authenticate").is_empty());
}

#[tokio::test]
async fn backend_rejection_clears_identity() {
    let fake = card_fake().await;
    fake.reply(Party::Backend, "session", Reply::json(json!({"name": "Bob"})));
    fake.reply(Party::Backend, "authenticate", Reply::status(401));
    let (orchestrator, _rx) = fake.orchestrator();

    orchestrator.restore_session(&"loginbox".into()).await;
    assert!(orchestrator.context().current_identity().is_some());

    let failure = orchestrator.authenticate(&target()).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Authenticate);
    assert_eq!(failure.kind(), ErrorKind::VerificationRejected);
    assert!(orchestrator.context().current_identity().is_none());
}

#[tokio::test]
async fn challenge_failure_stops_before_the_card() {
    let fake = card_fake().await;
    fake.reply(Party::Backend, "auth-challenge", Reply::status(500));
    let (orchestrator, _rx) = fake.orchestrator();

    let failure = orchestrator.authenticate(&target()).await.unwrap_err();
    assert_eq!(failure.stage, Stage::Challenge);
    assert_eq!(failure.kind(), ErrorKind::BackendRequestFailed);
    assert!(fake.hits_to(Party::Daemon, "sign").is_empty());
}

#[tokio::test]
async fn cancel_all_aborts_a_waiting_card() {
    let fake = Fake::start().await;
    fake.reply(
        Party::Daemon,
        "sign",
        Reply::json(json!({"status": "ok"})).delayed(Duration::from_secs(10)),
    );
    let (orchestrator, mut rx) = fake.orchestrator();

    let cancel = async {
        tokio::time::sleep(Duration::from_millis(200)).await;
        orchestrator.cancel_all();
    };
    let target = target();
    let (outcome, ()) = tokio::join!(orchestrator.authenticate(&target), cancel);

    let failure = outcome.unwrap_err();
    assert_eq!(failure.stage, Stage::SignChallenge);
    assert_eq!(failure.kind(), ErrorKind::Cancelled);
    assert!(fake.hits_to(Party::Backend, "authenticate").is_empty());
    assert_eq!(
        drain(&mut rx).last().unwrap().kind,
        StatusKind::Failed {
            stage: Stage::SignChallenge,
            error: ErrorKind::Cancelled
        }
    );
}
