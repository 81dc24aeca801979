//! The verified-send pipeline: translate under a deadline, encode the image,
//! commit to the log. Translation failures degrade; only the commit itself
//! can fail the send.

use base64::Engine;
use base64::engine::general_purpose::STANDARD as B64;
use tracing::{debug, warn};
use uuid::Uuid;

use thread_backend::MessageLog;
use thread_translate::{DegradeReason, HttpTranslator, TranslationOutcome, Translator};
use thread_types::error::SendError;
use thread_types::models::{ImageUpload, MessageDraft};

use crate::config::ThreadConfig;
use crate::gate::VerifiedSession;

/// How the translation stage went for one send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationStatus {
    /// No-op language or no text; the collaborator was never called.
    Skipped,
    Applied,
    /// The collaborator failed; the message went out with the original text.
    Degraded(DegradeReason),
}

#[derive(Debug, Clone)]
pub struct SendReceipt {
    pub message_id: Uuid,
    pub translation: TranslationStatus,
}

pub struct SendPipeline<L, T> {
    log: L,
    translator: T,
    noop_lang: String,
}

impl<L, T> SendPipeline<L, T>
where
    L: MessageLog,
    T: Translator,
{
    pub fn new(log: L, translator: T, noop_lang: impl Into<String>) -> Self {
        Self {
            log,
            translator,
            noop_lang: noop_lang.into(),
        }
    }

    /// Send one message. Preconditions: the caller holds a `VerifiedSession`
    /// and the image (if any) already passed ingestion.
    ///
    /// Emits at most one translation request and exactly one log append on
    /// success. A `Commit` error means nothing was sent; the same inputs can
    /// be retried, though retrying a send that actually landed duplicates it;
    /// at-most-once per user action is the caller's job.
    pub async fn send(
        &self,
        author: &VerifiedSession,
        raw_text: &str,
        image: Option<ImageUpload>,
        target_lang: &str,
    ) -> Result<SendReceipt, SendError> {
        let text = raw_text.trim();
        if text.is_empty() && image.is_none() {
            return Err(SendError::EmptyMessage);
        }

        let (display_text, translation) = if text.is_empty() || target_lang == self.noop_lang {
            (text.to_string(), TranslationStatus::Skipped)
        } else {
            match self.translator.translate(text, "auto", target_lang).await {
                TranslationOutcome::Translated(translated) => {
                    (translated, TranslationStatus::Applied)
                }
                TranslationOutcome::Degraded(reason) => {
                    warn!(?reason, "sending untranslated text");
                    (text.to_string(), TranslationStatus::Degraded(reason))
                }
            }
        };

        // Keep the author's wording only when translation changed it.
        let original_text = (display_text != text).then(|| text.to_string());
        let image = image.map(|upload| encode_data_uri(&upload));

        let draft = MessageDraft {
            author_id: author.uid(),
            display_text,
            original_text,
            image,
        };
        let message_id = self.log.append(draft).await?;
        debug!(%message_id, "message committed");

        Ok(SendReceipt {
            message_id,
            translation,
        })
    }
}

impl<L> SendPipeline<L, HttpTranslator>
where
    L: MessageLog,
{
    /// Build the translation stage from deployment config.
    pub fn from_config(log: L, config: &ThreadConfig) -> Self {
        let translator =
            HttpTranslator::new(config.translate_url.clone(), config.translate_deadline);
        Self::new(log, translator, config.noop_lang.clone())
    }
}

/// Self-contained inline form of a validated upload.
fn encode_data_uri(upload: &ImageUpload) -> String {
    format!(
        "data:{};base64,{}",
        upload.content_type.mime(),
        B64.encode(&upload.bytes)
    )
}
