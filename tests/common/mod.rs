// tests/common/mod.rs
//
// Fake signing daemon and fake backend. Every request is recorded; replies
// are scripted per endpoint, with defaults that make both pipelines succeed.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::http::{header::CONTENT_TYPE, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{on, MethodFilter, MethodRouter};
use axum::Router;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use cardsign::{ChannelSink, Orchestrator, OrchestratorConfig, StatusEvent, StatusKind};
use rand::RngCore;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedReceiver;
use tower_http::trace::TraceLayer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Party {
    Daemon,
    Backend,
}

#[derive(Debug, Clone)]
pub struct Reply {
    pub status: StatusCode,
    pub body: String,
    pub delay: Duration,
}

impl Reply {
    pub fn ok(body: &str) -> Self {
        Self {
            status: StatusCode::OK,
            body: body.to_owned(),
            delay: Duration::ZERO,
        }
    }

    pub fn json(body: Value) -> Self {
        Self::ok(&body.to_string())
    }

    pub fn status(status: u16) -> Self {
        Self {
            status: StatusCode::from_u16(status).unwrap(),
            body: String::new(),
            delay: Duration::ZERO,
        }
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Hit {
    pub party: Party,
    pub path: &'static str,
    pub headers: HeaderMap,
    pub body: String,
    /// Body the fake answered with.
    pub reply: String,
}

#[derive(Default)]
pub struct Script {
    replies: Mutex<HashMap<(Party, &'static str), Reply>>,
    hits: Mutex<Vec<Hit>>,
    challenges: Mutex<HashSet<String>>,
}

pub struct Fake {
    pub script: Arc<Script>,
    pub daemon_url: String,
    pub backend_url: String,
}

impl Fake {
    pub async fn start() -> Self {
        let script = Arc::new(Script::default());

        let daemon = Router::new()
            .route("/version", endpoint(&script, Party::Daemon, "version", MethodFilter::GET))
            .route("/sign", endpoint(&script, Party::Daemon, "sign", MethodFilter::POST))
            .layer(TraceLayer::new_for_http());

        let backend = Router::new()
            .route("/load-cas", backend_route(&script, "load-cas", MethodFilter::GET))
            .route("/pre-sign", backend_route(&script, "pre-sign", MethodFilter::POST))
            .route("/sign", backend_route(&script, "sign", MethodFilter::POST))
            .route("/verify", backend_route(&script, "verify", MethodFilter::GET))
            .route("/auth-challenge", backend_route(&script, "auth-challenge", MethodFilter::POST))
            .route("/authenticate", backend_route(&script, "authenticate", MethodFilter::POST))
            .route("/session", backend_route(&script, "session", MethodFilter::GET))
            .layer(TraceLayer::new_for_http());

        Self {
            daemon_url: serve(daemon).await,
            backend_url: serve(backend).await,
            script,
        }
    }

    pub fn reply(&self, party: Party, path: &'static str, reply: Reply) {
        self.script.replies.lock().unwrap().insert((party, path), reply);
    }

    pub fn hits(&self) -> Vec<Hit> {
        self.script.hits.lock().unwrap().clone()
    }

    pub fn hits_to(&self, party: Party, path: &str) -> Vec<Hit> {
        self.hits()
            .into_iter()
            .filter(|h| h.party == party && h.path == path)
            .collect()
    }

    pub fn config(&self) -> OrchestratorConfig {
        OrchestratorConfig {
            daemon_url: self.daemon_url.clone(),
            backend_url: self.backend_url.clone(),
            trust_loopback_http: true,
            ..Default::default()
        }
    }

    pub fn orchestrator(&self) -> (Orchestrator, UnboundedReceiver<StatusEvent>) {
        orchestrator_with(&self.config())
    }
}

pub fn orchestrator_with(
    config: &OrchestratorConfig,
) -> (Orchestrator, UnboundedReceiver<StatusEvent>) {
    let (sink, rx) = ChannelSink::new();
    let orchestrator = Orchestrator::new(config, Arc::new(sink)).expect("valid config");
    (orchestrator, rx)
}

pub fn drain(rx: &mut UnboundedReceiver<StatusEvent>) -> Vec<StatusEvent> {
    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    events
}

pub fn kinds(events: &[StatusEvent]) -> Vec<StatusKind> {
    events.iter().map(|e| e.kind).collect()
}

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
}

fn backend_route(
    script: &Arc<Script>,
    path: &'static str,
    method: MethodFilter,
) -> MethodRouter {
    endpoint(script, Party::Backend, path, method)
}

fn endpoint(
    script: &Arc<Script>,
    party: Party,
    path: &'static str,
    method: MethodFilter,
) -> MethodRouter {
    let script = script.clone();
    on(method, move |headers: HeaderMap, body: String| {
        let script = script.clone();
        async move { respond(script, party, path, headers, body).await }
    })
}

async fn respond(
    script: Arc<Script>,
    party: Party,
    path: &'static str,
    headers: HeaderMap,
    body: String,
) -> Response {
    let scripted = script.replies.lock().unwrap().get(&(party, path)).cloned();
    let reply = scripted.unwrap_or_else(|| default_reply(&script, party, path, &body));
    script.hits.lock().unwrap().push(Hit {
        party,
        path,
        headers,
        body,
        reply: reply.body.clone(),
    });
    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    (reply.status, [(CONTENT_TYPE, "application/json")], reply.body).into_response()
}

fn default_reply(script: &Script, party: Party, path: &str, body: &str) -> Reply {
    match (party, path) {
        (Party::Daemon, "version") => Reply::json(json!({"name": "daemon", "ver": "1.2"})),
        (Party::Daemon, "sign") => Reply::json(json!({"sig": "xyz"})),
        (Party::Backend, "pre-sign") => Reply::ok(r#"{"docHash":"abcd"}"#),
        (Party::Backend, "auth-challenge") => Reply::ok(&issue_challenge(script)),
        (Party::Backend, "authenticate") => match authenticate(script, body) {
            Ok(identity) => Reply::json(identity),
            Err((status, _)) => Reply::status(status.as_u16()),
        },
        (Party::Backend, "load-cas") => Reply::ok("DVV Gov. Root CA"),
        (Party::Backend, "session") => Reply::status(401),
        _ => Reply::ok(""),
    }
}

// ---------- FAKE RELYING PARTY ---------- //

fn issue_challenge(script: &Script) -> String {
    let nonce = gen_nonce();
    script.challenges.lock().unwrap().insert(nonce.clone());
    // spacing and `1.0` do not survive a parse/serialize cycle
    format!(r#"{{"nonce": "{nonce}",  "type":"digisign", "ttl": 1.0}}"#)
}

/// Accepts each issued challenge once.
fn authenticate(script: &Script, body: &str) -> Result<Value, (StatusCode, String)> {
    let req: Value = serde_json::from_str(body).map_err(badreq)?;
    if req.get("status").and_then(Value::as_str) != Some("ok") {
        return Err((StatusCode::BAD_REQUEST, "card status".into()));
    }
    let nonce = req
        .pointer("/signedData/nonce")
        .and_then(Value::as_str)
        .ok_or_else(|| bad("signedData"))?;
    if !script.challenges.lock().unwrap().remove(nonce) {
        return Err((StatusCode::UNAUTHORIZED, "unknown or consumed challenge".into()));
    }
    Ok(json!({"name": "Alice", "serial": "FI-123"}))
}

fn gen_nonce() -> String {
    let mut b = [0u8; 24];
    rand::thread_rng().fill_bytes(&mut b);
    URL_SAFE_NO_PAD.encode(b)
}

fn badreq<E: std::fmt::Display>(e: E) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, e.to_string())
}

fn bad(s: &'static str) -> (StatusCode, String) {
    (StatusCode::BAD_REQUEST, format!("missing/invalid {}", s))
}
