// src/presentation.rs
//
// Human-readable rendering of status events.
//
// Kept apart from the orchestration core so that the core carries no
// locale-specific text.

use std::fmt::Write as _;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ErrorKind;
use crate::status::{Completion, Stage, StatusKind};

const MAX_INLINE_VALUE: usize = 100;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Fi,
}

impl FromStr for Locale {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "en" => Ok(Locale::En),
            "fi" => Ok(Locale::Fi),
            other => Err(format!("unsupported locale {other:?}")),
        }
    }
}

pub fn describe(kind: &StatusKind, locale: Locale) -> &'static str {
    match (kind, locale) {
        (StatusKind::InProgress { stage }, Locale::En) => progress_en(*stage),
        (StatusKind::InProgress { stage }, Locale::Fi) => progress_fi(*stage),
        (StatusKind::Completed { completion }, Locale::En) => completed_en(*completion),
        (StatusKind::Completed { completion }, Locale::Fi) => completed_fi(*completion),
        (StatusKind::Failed { stage, error }, Locale::En) => failed_en(*stage, *error),
        (StatusKind::Failed { stage, error }, Locale::Fi) => failed_fi(*stage, *error),
    }
}

fn progress_en(stage: Stage) -> &'static str {
    match stage {
        Stage::Start => "starting",
        Stage::Probe => "connecting to the signing daemon",
        Stage::PreSign => "fetching data for signing",
        Stage::SignDocument => "signing with the card",
        Stage::SubmitSignature => "sending signature",
        Stage::VerifySignature => "verifying signature",
        Stage::Challenge => "starting authentication",
        Stage::SignChallenge => "waiting for the smart card",
        Stage::Authenticate => "sending authentication",
        Stage::RestoreSession => "checking session",
        Stage::LoadCas => "loading certificate authorities",
    }
}

fn progress_fi(stage: Stage) -> &'static str {
    match stage {
        Stage::Start => "aloitetaan",
        Stage::Probe => "yhdistetään digisigniin",
        Stage::PreSign => "haetaan tiedot allekirjoitusta varten",
        Stage::SignDocument => "allekirjoitetaan kortilla",
        Stage::SubmitSignature => "lähetetään",
        Stage::VerifySignature => "varmistetaan allekirjoitus",
        Stage::Challenge => "aloitetaan tunnistautuminen",
        Stage::SignChallenge => "toimikortti",
        Stage::Authenticate => "lähetetään tiedot",
        Stage::RestoreSession => "tarkistetaan istunto",
        Stage::LoadCas => "haetaan varmentajat",
    }
}

fn completed_en(completion: Completion) -> &'static str {
    match completion {
        Completion::DaemonInfo => "signing daemon version info",
        Completion::Signed => "signed successfully",
        Completion::Authenticated => "user authenticated",
        Completion::SessionRestored => "signed in",
        Completion::NoSession => "not signed in",
        Completion::CasLoaded => "certificate authorities",
    }
}

fn completed_fi(completion: Completion) -> &'static str {
    match completion {
        Completion::DaemonInfo => "versiotiedot",
        Completion::Signed => "allekirjoitettu",
        Completion::Authenticated => "käyttäjä tunnistettu",
        Completion::SessionRestored => "kirjautunut",
        Completion::NoSession => "ei kirjautunut",
        Completion::CasLoaded => "varmentajat",
    }
}

fn failed_en(stage: Stage, error: ErrorKind) -> &'static str {
    match (stage, error) {
        (_, ErrorKind::DaemonUnavailable) => "signing daemon unavailable",
        (_, ErrorKind::PolicyViolation) => "refusing to continue over an insecure connection",
        (_, ErrorKind::AlreadyRunning) => "already in progress",
        (_, ErrorKind::Cancelled) => "cancelled",
        (_, ErrorKind::CardDeclined) => "card declined",
        (_, ErrorKind::Config) => "invalid configuration",
        (_, ErrorKind::MalformedResponse) => "unexpected response",
        (Stage::PreSign, _) => "pre-sign failed",
        (Stage::SignDocument, _) => "signing failed",
        (Stage::SubmitSignature, _) => "submission failed",
        (Stage::VerifySignature, _) => "signature rejected",
        (Stage::Challenge, _) => "challenge request failed",
        (Stage::SignChallenge, _) => "signing daemon request failed",
        (Stage::Authenticate, _) => "backend rejected authentication",
        (Stage::LoadCas, _) => "could not load certificate authorities",
        _ => "failed",
    }
}

fn failed_fi(stage: Stage, error: ErrorKind) -> &'static str {
    match (stage, error) {
        (_, ErrorKind::DaemonUnavailable) => "Digisign ei käytettävissä",
        (_, ErrorKind::PolicyViolation) => "vaatii https-yhteyden",
        (_, ErrorKind::AlreadyRunning) => "toiminto on jo käynnissä",
        (_, ErrorKind::Cancelled) => "keskeytetty",
        (_, ErrorKind::CardDeclined) => "kortti hylkäsi toiminnon",
        (_, ErrorKind::Config) => "virheelliset asetukset",
        (_, ErrorKind::MalformedResponse) => "odottamaton vastaus",
        (Stage::PreSign, _) => "allekirjoituksen valmistelu epäonnistui",
        (Stage::SignDocument, _) => "allekirjoitus epäonnistui",
        (Stage::SubmitSignature, _) => "lähetys epäonnistui",
        (Stage::VerifySignature, _) => "allekirjoitusta ei hyväksytä",
        (Stage::Challenge, _) => "haasteen haku epäonnistui",
        (Stage::SignChallenge, _) => "digisign-pyyntö epäonnistui",
        (Stage::Authenticate, _) => "tunnistautumista ei hyväksytty",
        (Stage::LoadCas, _) => "varmentajien haku epäonnistui",
        _ => "epäonnistui",
    }
}

/// Plain-text listing of a JSON object. Sequences become numbered items and
/// long values are elided.
pub fn render_fields(title: &str, fields: &Map<String, Value>) -> String {
    let mut out = format!("{title}:");
    for (key, value) in fields {
        match value {
            Value::Array(items) => {
                let _ = write!(out, "\n  - {key}:");
                for (i, item) in items.iter().enumerate() {
                    let _ = write!(out, "\n      {}. {}", i + 1, short(item));
                }
            }
            _ => {
                let _ = write!(out, "\n  - {key}: {}", short(value));
            }
        }
    }
    out
}

fn short(value: &Value) -> String {
    let s = match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    };
    if s.chars().count() <= MAX_INLINE_VALUE {
        return s;
    }
    let head: String = s.chars().take(MAX_INLINE_VALUE).collect();
    format!("{head}…")
}
