//! In-memory collaborators. These back the local-simulation mode and the
//! test suites; they are not a server implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use argon2::password_hash::{SaltString, rand_core::OsRng};
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::Utc;
use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use thread_types::error::{AuthError, CommitError};
use thread_types::models::{Message, MessageDraft, Session, VerificationChallenge};

use crate::traits::{
    ChallengeStore, CodeDelivery, IdentityProvider, LogSubscription, MessageLog, UserDirectory,
};

// -- Identity --

struct StoredAccount {
    uid: Uuid,
    password_hash: String,
    provider_verified: bool,
}

/// Email/password identity provider with Argon2id-hashed credentials and a
/// watch-based session feed.
#[derive(Clone)]
pub struct MemoryIdentity {
    inner: Arc<IdentityInner>,
}

struct IdentityInner {
    accounts: Mutex<HashMap<String, StoredAccount>>,
    session_tx: watch::Sender<Option<Session>>,
}

impl MemoryIdentity {
    pub fn new() -> Self {
        let (session_tx, _) = watch::channel(None);
        Self {
            inner: Arc::new(IdentityInner {
                accounts: Mutex::new(HashMap::new()),
                session_tx,
            }),
        }
    }

    /// Simulates the account owner completing the provider's email-link flow.
    pub fn complete_email_verification(&self, email: &str) {
        let Ok(mut accounts) = self.inner.accounts.lock() else {
            return;
        };
        if let Some(account) = accounts.get_mut(email) {
            account.provider_verified = true;
        }
    }

    fn lock_accounts(
        &self,
    ) -> Result<MutexGuard<'_, HashMap<String, StoredAccount>>, AuthError> {
        self.inner
            .accounts
            .lock()
            .map_err(|_| AuthError::Provider("account store lock poisoned".into()))
    }
}

impl IdentityProvider for MemoryIdentity {
    async fn create_account(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let mut accounts = self.lock_accounts()?;
        if accounts.contains_key(email) {
            return Err(AuthError::DuplicateAccount);
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Provider(e.to_string()))?
            .to_string();

        let uid = Uuid::new_v4();
        accounts.insert(
            email.to_string(),
            StoredAccount {
                uid,
                password_hash,
                provider_verified: false,
            },
        );
        drop(accounts);

        let session = Session {
            uid,
            email: email.to_string(),
            provider_verified: false,
        };
        self.inner.session_tx.send_replace(Some(session.clone()));
        Ok(session)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<Session, AuthError> {
        let accounts = self.lock_accounts()?;
        let account = accounts.get(email).ok_or(AuthError::InvalidCredentials)?;

        let parsed_hash = PasswordHash::new(&account.password_hash)
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)?;

        let session = Session {
            uid: account.uid,
            email: email.to_string(),
            provider_verified: account.provider_verified,
        };
        drop(accounts);

        self.inner.session_tx.send_replace(Some(session.clone()));
        Ok(session)
    }

    async fn sign_out(&self) {
        self.inner.session_tx.send_replace(None);
    }

    async fn current_session(&self) -> Option<Session> {
        self.inner.session_tx.borrow().clone()
    }

    fn watch_session(&self) -> watch::Receiver<Option<Session>> {
        self.inner.session_tx.subscribe()
    }

    async fn request_email_verification(&self) -> Result<(), AuthError> {
        let session = self
            .inner
            .session_tx
            .borrow()
            .clone()
            .ok_or(AuthError::NotSignedIn)?;
        info!(email = %session.email, "provider verification email requested (simulated)");
        Ok(())
    }

    async fn refresh_session(&self) -> Result<Session, AuthError> {
        let current = self
            .inner
            .session_tx
            .borrow()
            .clone()
            .ok_or(AuthError::NotSignedIn)?;

        let accounts = self.lock_accounts()?;
        let account = accounts
            .get(&current.email)
            .ok_or(AuthError::InvalidCredentials)?;
        let session = Session {
            uid: account.uid,
            email: current.email.clone(),
            provider_verified: account.provider_verified,
        };
        drop(accounts);

        self.inner.session_tx.send_replace(Some(session.clone()));
        Ok(session)
    }
}

// -- Message log --

/// Ordered in-memory log publishing full replacement snapshots on every
/// change, the way the hosted store's subscription behaves.
#[derive(Clone)]
pub struct MemoryLog {
    inner: Arc<LogInner>,
}

struct LogInner {
    messages: Mutex<Vec<Message>>,
    tx: watch::Sender<Arc<Vec<Message>>>,
    auto_confirm: bool,
    fail_appends: AtomicBool,
}

impl MemoryLog {
    pub fn new() -> Self {
        Self::build(true)
    }

    /// Appends stay pending (`created_at = None`) until `confirm_all` runs.
    /// Lets tests exercise the local-echo window before the server assigns
    /// timestamps.
    pub fn with_manual_confirm() -> Self {
        Self::build(false)
    }

    fn build(auto_confirm: bool) -> Self {
        let (tx, _) = watch::channel(Arc::new(Vec::new()));
        Self {
            inner: Arc::new(LogInner {
                messages: Mutex::new(Vec::new()),
                tx,
                auto_confirm,
                fail_appends: AtomicBool::new(false),
            }),
        }
    }

    /// Make subsequent appends fail with `CommitError`.
    pub fn fail_appends(&self, fail: bool) {
        self.inner.fail_appends.store(fail, Ordering::Relaxed);
    }

    /// Assign server timestamps to all pending messages, in insertion order.
    pub fn confirm_all(&self) {
        let Ok(mut messages) = self.inner.messages.lock() else {
            return;
        };
        for message in messages.iter_mut().filter(|m| m.is_pending()) {
            message.created_at = Some(Utc::now());
        }
        self.inner.tx.send_replace(Arc::new(messages.clone()));
    }
}

impl MessageLog for MemoryLog {
    async fn append(&self, draft: MessageDraft) -> Result<Uuid, CommitError> {
        if self.inner.fail_appends.load(Ordering::Relaxed) {
            return Err(CommitError("log unreachable (simulated)".into()));
        }

        let mut messages = self
            .inner
            .messages
            .lock()
            .map_err(|_| CommitError("log lock poisoned".into()))?;

        let id = Uuid::new_v4();
        let created_at = if self.inner.auto_confirm {
            Some(Utc::now())
        } else {
            None
        };
        messages.push(Message {
            id,
            author_id: draft.author_id,
            display_text: draft.display_text,
            original_text: draft.original_text,
            image: draft.image,
            created_at,
        });
        self.inner.tx.send_replace(Arc::new(messages.clone()));
        Ok(id)
    }

    fn subscribe(&self) -> LogSubscription {
        LogSubscription::new(self.inner.tx.subscribe())
    }
}

// -- User directory --

#[derive(Clone)]
pub struct MemoryDirectory {
    inner: Arc<DirectoryInner>,
}

struct DirectoryInner {
    map: Mutex<HashMap<Uuid, String>>,
    tx: watch::Sender<Arc<HashMap<Uuid, String>>>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(Arc::new(HashMap::new()));
        Self {
            inner: Arc::new(DirectoryInner {
                map: Mutex::new(HashMap::new()),
                tx,
            }),
        }
    }

    fn lock_map(&self) -> Result<MutexGuard<'_, HashMap<Uuid, String>>, AuthError> {
        self.inner
            .map
            .lock()
            .map_err(|_| AuthError::Provider("directory lock poisoned".into()))
    }
}

impl UserDirectory for MemoryDirectory {
    async fn username_taken(&self, username: &str) -> Result<bool, AuthError> {
        let map = self.lock_map()?;
        Ok(map.values().any(|existing| existing == username))
    }

    async fn claim_username(&self, uid: Uuid, username: &str) -> Result<(), AuthError> {
        let mut map = self.lock_map()?;
        // Re-check under the lock in case two signups raced the precheck.
        if map.values().any(|existing| existing == username) {
            return Err(AuthError::UsernameTaken);
        }
        map.insert(uid, username.to_string());
        self.inner.tx.send_replace(Arc::new(map.clone()));
        Ok(())
    }

    async fn username_of(&self, uid: Uuid) -> Option<String> {
        self.inner.map.lock().ok()?.get(&uid).cloned()
    }

    fn subscribe(&self) -> watch::Receiver<Arc<HashMap<Uuid, String>>> {
        self.inner.tx.subscribe()
    }
}

// -- Challenge store --

#[derive(Clone)]
pub struct MemoryChallenges {
    inner: Arc<Mutex<HashMap<Uuid, VerificationChallenge>>>,
}

impl MemoryChallenges {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl ChallengeStore for MemoryChallenges {
    async fn put(&self, uid: Uuid, challenge: VerificationChallenge) -> anyhow::Result<()> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("challenge store lock poisoned"))?;
        map.insert(uid, challenge);
        Ok(())
    }

    async fn get(&self, uid: Uuid) -> anyhow::Result<Option<VerificationChallenge>> {
        let map = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("challenge store lock poisoned"))?;
        Ok(map.get(&uid).cloned())
    }

    async fn mark_verified(&self, uid: Uuid) -> anyhow::Result<()> {
        let mut map = self
            .inner
            .lock()
            .map_err(|_| anyhow::anyhow!("challenge store lock poisoned"))?;
        if let Some(challenge) = map.get_mut(&uid) {
            challenge.verified = true;
        }
        Ok(())
    }
}

// -- Code delivery --

/// Simulated email delivery: logs the code and keeps it readable, standing
/// in for the email send in local mode.
#[derive(Clone)]
pub struct RecordingDelivery {
    sent: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingDelivery {
    pub fn new() -> Self {
        Self {
            sent: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// The most recently delivered code, if any.
    pub fn last_code(&self) -> Option<String> {
        self.sent
            .lock()
            .ok()?
            .last()
            .map(|(_, code)| code.clone())
    }

    pub fn delivered_count(&self) -> usize {
        self.sent.lock().map(|sent| sent.len()).unwrap_or(0)
    }
}

impl CodeDelivery for RecordingDelivery {
    async fn deliver(&self, email: &str, code: &str) -> anyhow::Result<()> {
        info!(%email, "verification code delivered (simulated)");
        self.sent
            .lock()
            .map_err(|_| anyhow::anyhow!("delivery record lock poisoned"))?
            .push((email.to_string(), code.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn duplicate_account_is_rejected() {
        let identity = MemoryIdentity::new();
        identity
            .create_account("alice@example.com", "hunter22")
            .await
            .unwrap();

        let err = identity
            .create_account("alice@example.com", "other-password")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::DuplicateAccount);
    }

    #[tokio::test]
    async fn sign_in_verifies_the_password() {
        let identity = MemoryIdentity::new();
        identity
            .create_account("alice@example.com", "hunter22")
            .await
            .unwrap();
        identity.sign_out().await;

        let err = identity
            .sign_in("alice@example.com", "wrong")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);

        let session = identity
            .sign_in("alice@example.com", "hunter22")
            .await
            .unwrap();
        assert_eq!(session.email, "alice@example.com");
    }

    #[tokio::test]
    async fn refresh_picks_up_provider_verification() {
        let identity = MemoryIdentity::new();
        let session = identity
            .create_account("bob@example.com", "hunter22")
            .await
            .unwrap();
        assert!(!session.provider_verified);

        identity.complete_email_verification("bob@example.com");
        let refreshed = identity.refresh_session().await.unwrap();
        assert!(refreshed.provider_verified);
    }

    #[tokio::test]
    async fn log_publishes_replacement_snapshots() {
        let log = MemoryLog::new();
        let mut sub = log.subscribe();
        assert!(sub.snapshot().is_empty());

        let draft = MessageDraft {
            author_id: Uuid::new_v4(),
            display_text: "hello".to_string(),
            original_text: None,
            image: None,
        };
        let id = log.append(draft).await.unwrap();

        let snapshot = sub.next().await.unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].id, id);
        assert!(snapshot[0].created_at.is_some());
    }

    #[tokio::test]
    async fn manual_confirm_log_leaves_appends_pending() {
        let log = MemoryLog::with_manual_confirm();
        let draft = MessageDraft {
            author_id: Uuid::new_v4(),
            display_text: "pending".to_string(),
            original_text: None,
            image: None,
        };
        log.append(draft).await.unwrap();

        let sub = log.subscribe();
        assert!(sub.snapshot()[0].is_pending());

        log.confirm_all();
        assert!(!log.subscribe().snapshot()[0].is_pending());
    }

    #[tokio::test]
    async fn failing_log_rejects_appends() {
        let log = MemoryLog::new();
        log.fail_appends(true);

        let draft = MessageDraft {
            author_id: Uuid::new_v4(),
            display_text: "never lands".to_string(),
            original_text: None,
            image: None,
        };
        assert!(log.append(draft).await.is_err());
        assert!(log.subscribe().snapshot().is_empty());
    }

    #[tokio::test]
    async fn directory_enforces_unique_usernames() {
        let directory = MemoryDirectory::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        assert!(!directory.username_taken("alice").await.unwrap());
        directory.claim_username(a, "alice").await.unwrap();
        assert!(directory.username_taken("alice").await.unwrap());

        let err = directory.claim_username(b, "alice").await.unwrap_err();
        assert_eq!(err, AuthError::UsernameTaken);
        assert_eq!(directory.username_of(a).await.as_deref(), Some("alice"));
        assert_eq!(directory.username_of(b).await, None);
    }

    #[tokio::test]
    async fn challenge_store_overwrites_on_put() {
        let store = MemoryChallenges::new();
        let uid = Uuid::new_v4();

        let first = VerificationChallenge {
            code: "111111".to_string(),
            expires_at: Utc::now() + chrono::Duration::minutes(10),
            verified: false,
        };
        let second = VerificationChallenge {
            code: "222222".to_string(),
            ..first.clone()
        };

        store.put(uid, first).await.unwrap();
        store.put(uid, second).await.unwrap();

        let stored = store.get(uid).await.unwrap().unwrap();
        assert_eq!(stored.code, "222222");
    }
}
