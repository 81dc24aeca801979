use thiserror::Error;

/// Sign-up / sign-in failures. All are surfaced to the user; none are
/// retried automatically.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("an account already exists for this email")]
    DuplicateAccount,

    #[error("username is already taken")]
    UsernameTaken,

    #[error("username must not be empty")]
    EmptyUsername,

    #[error("not signed in")]
    NotSignedIn,

    #[error("identity provider unavailable: {0}")]
    Provider(String),
}

/// Verification-code submission failures, most specific first: the gate
/// checks existence, then expiry, then equality.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VerifyError {
    #[error("no verification code has been issued")]
    NoChallenge,

    #[error("verification code has expired")]
    Expired,

    #[error("verification code does not match")]
    Mismatch,

    #[error("not signed in")]
    NotSignedIn,

    #[error("verification store unavailable: {0}")]
    Store(String),
}

/// The log rejected the append. The message was not sent and the caller may
/// retry with the same inputs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("message log append failed: {0}")]
pub struct CommitError(pub String);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// Neither trimmed text nor an image: rejected locally, no network call.
    #[error("message must contain text or an image")]
    EmptyMessage,

    #[error(transparent)]
    Commit(#[from] CommitError),
}

/// Image rejected before the pipeline ever sees it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IngestError {
    #[error("unsupported image type {0}: only JPEG and PNG are accepted")]
    UnsupportedType(String),

    #[error("image is {actual} bytes, over the {limit}-byte limit")]
    TooLarge { actual: usize, limit: usize },
}
