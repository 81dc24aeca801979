//! Client for the translation collaborator.
//!
//! Translation is best-effort by contract: a timeout, a non-success status or
//! a malformed body all degrade to the untranslated text rather than failing
//! the send. `translate` therefore returns an outcome, not a `Result`: the
//! caller must handle both arms explicitly.

#![allow(async_fn_in_trait)]

use std::time::Duration;

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Default request deadline. Deployments in the wild run 5–10 s.
pub const DEFAULT_DEADLINE: Duration = Duration::from_secs(5);

pub trait Translator {
    /// Translate `text` from `source` (usually `"auto"`) into `target`.
    /// Issues at most one network request.
    async fn translate(&self, text: &str, source: &str, target: &str) -> TranslationOutcome;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationOutcome {
    Translated(String),
    /// The collaborator could not deliver in time or in shape; the caller
    /// proceeds with the original text.
    Degraded(DegradeReason),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DegradeReason {
    DeadlineExceeded,
    /// Non-success HTTP status, e.g. the service's 400 on empty input or 500
    /// on engine failure.
    Status(u16),
    /// 200 but no `translatedText` field in the body.
    MalformedBody,
    Transport,
}

#[derive(Serialize)]
struct TranslateRequest<'a> {
    text: &'a str,
    source: &'a str,
    target: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateResponse {
    translated_text: Option<String>,
    #[allow(dead_code)]
    detected_source: Option<String>,
}

/// `POST {endpoint}` with `{text, source, target}`, expecting
/// `{translatedText, detectedSource?}` back. No retries.
#[derive(Clone)]
pub struct HttpTranslator {
    client: Client,
    endpoint: String,
    deadline: Duration,
}

impl HttpTranslator {
    pub fn new(endpoint: impl Into<String>, deadline: Duration) -> Self {
        Self {
            client: Client::new(),
            endpoint: endpoint.into(),
            deadline,
        }
    }

    async fn request(&self, text: &str, source: &str, target: &str) -> TranslationOutcome {
        let body = TranslateRequest {
            text,
            source,
            target,
        };

        let response = match self.client.post(&self.endpoint).json(&body).send().await {
            Ok(response) => response,
            Err(_) => return TranslationOutcome::Degraded(DegradeReason::Transport),
        };

        let status = response.status();
        if !status.is_success() {
            return TranslationOutcome::Degraded(DegradeReason::Status(status.as_u16()));
        }

        match response.json::<TranslateResponse>().await {
            Ok(TranslateResponse {
                translated_text: Some(text),
                ..
            }) => TranslationOutcome::Translated(text),
            _ => TranslationOutcome::Degraded(DegradeReason::MalformedBody),
        }
    }
}

impl Translator for HttpTranslator {
    async fn translate(&self, text: &str, source: &str, target: &str) -> TranslationOutcome {
        // The deadline covers the whole exchange, body read included. The
        // in-flight request is simply abandoned on expiry.
        let outcome = match tokio::time::timeout(self.deadline, self.request(text, source, target))
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => TranslationOutcome::Degraded(DegradeReason::DeadlineExceeded),
        };

        if let TranslationOutcome::Degraded(reason) = &outcome {
            warn!(?reason, %target, "translation degraded, keeping original text");
        }
        outcome
    }
}
