use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::watch;
use uuid::Uuid;

use thread_types::error::{AuthError, CommitError};
use thread_types::models::{Message, MessageDraft, Session, VerificationChallenge};

/// The hosted identity provider. Owns credentials and session state; the
/// application never sees a password hash.
pub trait IdentityProvider {
    async fn create_account(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError>;

    async fn sign_out(&self);

    async fn current_session(&self) -> Option<Session>;

    /// Session-change subscription. Holds `None` while signed out.
    fn watch_session(&self) -> watch::Receiver<Option<Session>>;

    /// Ask the provider to send its own verification email (provider-managed
    /// variant only).
    async fn request_email_verification(&self) -> Result<(), AuthError>;

    /// Re-query the provider and return a fresh session snapshot, picking up
    /// any change to the verified flag.
    async fn refresh_session(&self) -> Result<Session, AuthError>;
}

/// The shared, server-ordered message log.
pub trait MessageLog {
    /// Append a draft. The log assigns the id; the server timestamp follows
    /// asynchronously via the subscription snapshots.
    async fn append(&self, draft: MessageDraft) -> Result<Uuid, CommitError>;

    fn subscribe(&self) -> LogSubscription;
}

/// A live handle onto the log. Each change produces a full replacement
/// snapshot; dropping the handle unsubscribes.
pub struct LogSubscription {
    rx: watch::Receiver<Arc<Vec<Message>>>,
}

impl LogSubscription {
    pub fn new(rx: watch::Receiver<Arc<Vec<Message>>>) -> Self {
        Self { rx }
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> Arc<Vec<Message>> {
        self.rx.borrow().clone()
    }

    /// Wait for the next snapshot. Returns `None` once the log side is gone.
    pub async fn next(&mut self) -> Option<Arc<Vec<Message>>> {
        self.rx.changed().await.ok()?;
        Some(self.rx.borrow_and_update().clone())
    }
}

/// uid → username mapping, append-only at signup.
pub trait UserDirectory {
    /// Uniqueness precheck. Run before the account is created so a taken
    /// username never leaves a half-registered account behind.
    async fn username_taken(&self, username: &str) -> Result<bool, AuthError>;

    /// Record the mapping. Also enforces uniqueness in case two signups
    /// raced past the precheck.
    async fn claim_username(&self, uid: Uuid, username: &str) -> Result<(), AuthError>;

    async fn username_of(&self, uid: Uuid) -> Option<String>;

    fn subscribe(&self) -> watch::Receiver<Arc<HashMap<Uuid, String>>>;
}

/// Per-account storage for the outstanding verification challenge
/// (self-issued-code variant). `put` overwrites; last writer wins.
pub trait ChallengeStore {
    async fn put(&self, uid: Uuid, challenge: VerificationChallenge) -> anyhow::Result<()>;

    async fn get(&self, uid: Uuid) -> anyhow::Result<Option<VerificationChallenge>>;

    async fn mark_verified(&self, uid: Uuid) -> anyhow::Result<()>;
}

/// Delivery channel for issued codes: email in production, a recorded
/// synchronous display in the local simulation.
pub trait CodeDelivery {
    async fn deliver(&self, email: &str, code: &str) -> anyhow::Result<()>;
}
