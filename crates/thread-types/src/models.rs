use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::IngestError;

/// Largest accepted image payload, in raw bytes (pre-base64).
pub const MAX_IMAGE_BYTES: usize = 750_000;

/// A committed chat entry. Immutable once the log accepts it, except for
/// `created_at` transitioning from pending (`None`) to the server-assigned
/// timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub author_id: Uuid,
    /// Text shown by default: the translated form when translation ran and
    /// succeeded, the author's original otherwise.
    pub display_text: String,
    /// The text as typed. Set only when translation changed it, so the UI can
    /// toggle between the two forms.
    pub original_text: Option<String>,
    /// Inline image as a `data:` URI, if the message carries one.
    pub image: Option<String>,
    /// Server-assigned ordering key. `None` until the log confirms commit.
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn is_pending(&self) -> bool {
        self.created_at.is_none()
    }
}

/// What the send pipeline hands to the log. The log assigns `id` and
/// `created_at` on commit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MessageDraft {
    pub author_id: Uuid,
    pub display_text: String,
    pub original_text: Option<String>,
    pub image: Option<String>,
}

/// One outstanding 6-digit verification attempt, keyed by account in the
/// shared store. Re-issuance overwrites it wholesale; last writer wins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationChallenge {
    pub code: String,
    pub expires_at: DateTime<Utc>,
    pub verified: bool,
}

impl VerificationChallenge {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }
}

/// Identity-provider session snapshot for the signed-in account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub uid: Uuid,
    pub email: String,
    /// Set when the provider itself tracks email verification (the
    /// provider-managed variant). Ignored by the self-issued-code variant.
    pub provider_verified: bool,
}

/// Accepted image encodings. Anything else is rejected at ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ImageContentType {
    Jpeg,
    Png,
}

impl ImageContentType {
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "image/jpeg" => Some(Self::Jpeg),
            "image/png" => Some(Self::Png),
            _ => None,
        }
    }

    pub fn mime(&self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
        }
    }
}

/// A raw image payload that already passed ingestion. The send pipeline
/// trusts this type and never re-validates.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub content_type: ImageContentType,
    pub bytes: Bytes,
}

impl ImageUpload {
    /// Caller-facing ingestion: allow-list the content type and enforce the
    /// size ceiling before anything reaches the pipeline.
    pub fn ingest(content_type: &str, bytes: Bytes) -> Result<Self, IngestError> {
        let content_type = ImageContentType::from_mime(content_type)
            .ok_or_else(|| IngestError::UnsupportedType(content_type.to_string()))?;

        if bytes.len() > MAX_IMAGE_BYTES {
            return Err(IngestError::TooLarge {
                actual: bytes.len(),
                limit: MAX_IMAGE_BYTES,
            });
        }

        Ok(Self {
            content_type,
            bytes,
        })
    }
}
