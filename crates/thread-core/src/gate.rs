//! The verification gate: `Unauthenticated → Unverified → Verified`, with
//! posting rights only in the final state.

use chrono::{Duration, Utc};
use rand::Rng;
use tracing::{debug, info};
use uuid::Uuid;

use thread_backend::{ChallengeStore, CodeDelivery, IdentityProvider, UserDirectory};
use thread_types::error::{AuthError, VerifyError};
use thread_types::models::{Session, VerificationChallenge};

use crate::config::VerificationMode;

/// Challenges are good for ten minutes from issuance.
pub const CHALLENGE_TTL_MINUTES: i64 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateStatus {
    Unauthenticated,
    Unverified,
    Verified,
}

/// Proof of a verified session. Only the gate can mint one; the send
/// pipeline and the live view require it, so unverified accounts cannot
/// reach either by construction.
#[derive(Debug, Clone)]
pub struct VerifiedSession {
    session: Session,
}

impl VerifiedSession {
    pub(crate) fn new(session: Session) -> Self {
        Self { session }
    }

    pub fn uid(&self) -> Uuid {
        self.session.uid
    }

    pub fn email(&self) -> &str {
        &self.session.email
    }

    pub fn session(&self) -> &Session {
        &self.session
    }
}

enum GateState {
    Unauthenticated,
    Unverified(Session),
    Verified(Session),
}

/// One gate type covers both verification strategies; the mode is picked by
/// configuration, not by forking the implementation.
pub struct VerificationGate<I, U, C, D> {
    identity: I,
    directory: U,
    challenges: C,
    delivery: D,
    mode: VerificationMode,
    state: GateState,
}

impl<I, U, C, D> VerificationGate<I, U, C, D>
where
    I: IdentityProvider,
    U: UserDirectory,
    C: ChallengeStore,
    D: CodeDelivery,
{
    pub fn new(
        identity: I,
        directory: U,
        challenges: C,
        delivery: D,
        mode: VerificationMode,
    ) -> Self {
        Self {
            identity,
            directory,
            challenges,
            delivery,
            mode,
            state: GateState::Unauthenticated,
        }
    }

    pub fn status(&self) -> GateStatus {
        match self.state {
            GateState::Unauthenticated => GateStatus::Unauthenticated,
            GateState::Unverified(_) => GateStatus::Unverified,
            GateState::Verified(_) => GateStatus::Verified,
        }
    }

    pub fn session(&self) -> Option<&Session> {
        match &self.state {
            GateState::Unauthenticated => None,
            GateState::Unverified(session) | GateState::Verified(session) => Some(session),
        }
    }

    /// The posting capability, available once verified.
    pub fn verified_session(&self) -> Option<VerifiedSession> {
        match &self.state {
            GateState::Verified(session) => Some(VerifiedSession::new(session.clone())),
            _ => None,
        }
    }

    /// Create the account, claim the username, and start verification.
    ///
    /// The username uniqueness precheck runs before `create_account`, so a
    /// taken name never leaves a half-registered account in the provider.
    pub async fn sign_up(
        &mut self,
        email: &str,
        password: &str,
        username: &str,
    ) -> Result<GateStatus, AuthError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(AuthError::EmptyUsername);
        }
        if self.directory.username_taken(username).await? {
            return Err(AuthError::UsernameTaken);
        }

        let session = self.identity.create_account(email, password).await?;
        self.directory.claim_username(session.uid, username).await?;
        info!(uid = %session.uid, %username, "account created");

        self.after_auth(session).await
    }

    pub async fn sign_in(&mut self, email: &str, password: &str) -> Result<GateStatus, AuthError> {
        let session = self.identity.sign_in(email, password).await?;
        debug!(uid = %session.uid, "signed in");
        self.after_auth(session).await
    }

    /// Shared tail of sign-up and sign-in: land in `Verified` if this account
    /// already passed verification, otherwise kick off a fresh round.
    async fn after_auth(&mut self, session: Session) -> Result<GateStatus, AuthError> {
        let already_verified = match self.mode {
            VerificationMode::ProviderManaged => session.provider_verified,
            VerificationMode::SelfIssuedCode => self
                .challenges
                .get(session.uid)
                .await
                .map_err(|e| AuthError::Provider(e.to_string()))?
                .map(|challenge| challenge.verified)
                .unwrap_or(false),
        };

        if already_verified {
            self.state = GateState::Verified(session);
        } else {
            self.state = GateState::Unverified(session.clone());
            match self.mode {
                VerificationMode::SelfIssuedCode => self.issue_challenge(&session).await?,
                VerificationMode::ProviderManaged => {
                    self.identity.request_email_verification().await?
                }
            }
        }
        Ok(self.status())
    }

    pub async fn sign_out(&mut self) {
        self.identity.sign_out().await;
        self.state = GateState::Unauthenticated;
    }

    /// Re-request verification: a fresh code (invalidating any prior one) in
    /// the self-issued variant, another provider email in the other.
    pub async fn request_verification(&mut self) -> Result<(), AuthError> {
        let session = match &self.state {
            GateState::Unverified(session) => session.clone(),
            GateState::Verified(_) => return Ok(()),
            GateState::Unauthenticated => return Err(AuthError::NotSignedIn),
        };

        match self.mode {
            VerificationMode::SelfIssuedCode => self.issue_challenge(&session).await,
            VerificationMode::ProviderManaged => self.identity.request_email_verification().await,
        }
    }

    async fn issue_challenge(&self, session: &Session) -> Result<(), AuthError> {
        let code = rand::rng().random_range(100_000..=999_999).to_string();
        let challenge = VerificationChallenge {
            code: code.clone(),
            expires_at: Utc::now() + Duration::minutes(CHALLENGE_TTL_MINUTES),
            verified: false,
        };

        // Overwrites any outstanding challenge; the old code stops working.
        self.challenges
            .put(session.uid, challenge)
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;
        self.delivery
            .deliver(&session.email, &code)
            .await
            .map_err(|e| AuthError::Provider(e.to_string()))?;

        info!(uid = %session.uid, "verification challenge issued");
        Ok(())
    }

    /// Check a submitted code: existence, then expiry, then equality, so the
    /// caller gets the most specific diagnosis.
    pub async fn submit_code(&mut self, input: &str) -> Result<VerifiedSession, VerifyError> {
        let session = match &self.state {
            GateState::Unverified(session) => session.clone(),
            GateState::Verified(session) => return Ok(VerifiedSession::new(session.clone())),
            GateState::Unauthenticated => return Err(VerifyError::NotSignedIn),
        };

        let challenge = self
            .challenges
            .get(session.uid)
            .await
            .map_err(|e| VerifyError::Store(e.to_string()))?
            .ok_or(VerifyError::NoChallenge)?;

        if challenge.is_expired(Utc::now()) {
            return Err(VerifyError::Expired);
        }
        if input != challenge.code {
            return Err(VerifyError::Mismatch);
        }

        self.challenges
            .mark_verified(session.uid)
            .await
            .map_err(|e| VerifyError::Store(e.to_string()))?;
        info!(uid = %session.uid, "account verified");

        self.state = GateState::Verified(session.clone());
        Ok(VerifiedSession::new(session))
    }

    /// Re-query the verification source and mirror it: the provider's flag in
    /// the provider-managed variant, the challenge store in the self-issued
    /// one (covers verifying on another device).
    pub async fn refresh(&mut self) -> Result<GateStatus, AuthError> {
        match &self.state {
            GateState::Unauthenticated => return Err(AuthError::NotSignedIn),
            GateState::Unverified(_) | GateState::Verified(_) => {}
        }

        match self.mode {
            VerificationMode::ProviderManaged => {
                let session = self.identity.refresh_session().await?;
                self.state = if session.provider_verified {
                    GateState::Verified(session)
                } else {
                    GateState::Unverified(session)
                };
            }
            VerificationMode::SelfIssuedCode => {
                // state is non-empty here, checked above
                if let Some(session) = self.session().cloned() {
                    let verified = self
                        .challenges
                        .get(session.uid)
                        .await
                        .map_err(|e| AuthError::Provider(e.to_string()))?
                        .map(|challenge| challenge.verified)
                        .unwrap_or(false);
                    self.state = if verified {
                        GateState::Verified(session)
                    } else {
                        GateState::Unverified(session)
                    };
                }
            }
        }
        Ok(self.status())
    }
}

#[cfg(test)]
mod tests {
    use thread_backend::{MemoryChallenges, MemoryDirectory, MemoryIdentity, RecordingDelivery};
    use thread_types::error::{AuthError, VerifyError};

    use super::*;

    type TestGate =
        VerificationGate<MemoryIdentity, MemoryDirectory, MemoryChallenges, RecordingDelivery>;

    struct Harness {
        gate: TestGate,
        identity: MemoryIdentity,
        directory: MemoryDirectory,
        challenges: MemoryChallenges,
        delivery: RecordingDelivery,
    }

    fn harness(mode: VerificationMode) -> Harness {
        let identity = MemoryIdentity::new();
        let directory = MemoryDirectory::new();
        let challenges = MemoryChallenges::new();
        let delivery = RecordingDelivery::new();
        let gate = VerificationGate::new(
            identity.clone(),
            directory.clone(),
            challenges.clone(),
            delivery.clone(),
            mode,
        );
        Harness {
            gate,
            identity,
            directory,
            challenges,
            delivery,
        }
    }

    #[tokio::test]
    async fn sign_up_issues_a_code_and_submit_verifies() {
        let mut h = harness(VerificationMode::SelfIssuedCode);

        let status = h
            .gate
            .sign_up("alice@example.com", "hunter22", "alice")
            .await
            .unwrap();
        assert_eq!(status, GateStatus::Unverified);
        assert!(h.gate.verified_session().is_none());

        let code = h.delivery.last_code().unwrap();
        assert_eq!(code.len(), 6);

        let verified = h.gate.submit_code(&code).await.unwrap();
        assert_eq!(verified.email(), "alice@example.com");
        assert_eq!(h.gate.status(), GateStatus::Verified);
    }

    #[tokio::test]
    async fn wrong_code_is_a_mismatch() {
        let mut h = harness(VerificationMode::SelfIssuedCode);
        h.gate
            .sign_up("alice@example.com", "hunter22", "alice")
            .await
            .unwrap();

        let err = h.gate.submit_code("000000").await.unwrap_err();
        assert_eq!(err, VerifyError::Mismatch);
        assert_eq!(h.gate.status(), GateStatus::Unverified);
    }

    #[tokio::test]
    async fn expired_code_is_rejected_even_when_it_matches() {
        let mut h = harness(VerificationMode::SelfIssuedCode);
        h.gate
            .sign_up("alice@example.com", "hunter22", "alice")
            .await
            .unwrap();

        let uid = h.gate.session().unwrap().uid;
        let code = h.delivery.last_code().unwrap();

        // Backdate the stored challenge past its window.
        h.challenges
            .put(
                uid,
                VerificationChallenge {
                    code: code.clone(),
                    expires_at: Utc::now() - Duration::seconds(1),
                    verified: false,
                },
            )
            .await
            .unwrap();

        let err = h.gate.submit_code(&code).await.unwrap_err();
        assert_eq!(err, VerifyError::Expired);
    }

    #[tokio::test]
    async fn reissue_invalidates_the_previous_code() {
        let mut h = harness(VerificationMode::SelfIssuedCode);
        h.gate
            .sign_up("alice@example.com", "hunter22", "alice")
            .await
            .unwrap();

        let uid = h.gate.session().unwrap().uid;

        // Plant a known outstanding challenge. "000000" sits outside the
        // generator's 100000..=999999 draw, so the reissue cannot collide.
        h.challenges
            .put(
                uid,
                VerificationChallenge {
                    code: "000000".to_string(),
                    expires_at: Utc::now() + Duration::minutes(CHALLENGE_TTL_MINUTES),
                    verified: false,
                },
            )
            .await
            .unwrap();

        h.gate.request_verification().await.unwrap();
        assert_eq!(h.delivery.delivered_count(), 2);

        let err = h.gate.submit_code("000000").await.unwrap_err();
        assert_eq!(err, VerifyError::Mismatch);

        let second = h.delivery.last_code().unwrap();
        h.gate.submit_code(&second).await.unwrap();
    }

    #[tokio::test]
    async fn taken_username_fails_before_any_account_exists() {
        let mut h = harness(VerificationMode::SelfIssuedCode);
        h.gate
            .sign_up("alice@example.com", "hunter22", "alice")
            .await
            .unwrap();

        let mut other = VerificationGate::new(
            h.identity.clone(),
            h.directory.clone(),
            h.challenges.clone(),
            h.delivery.clone(),
            VerificationMode::SelfIssuedCode,
        );
        let err = other
            .sign_up("bob@example.com", "hunter22", "alice")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::UsernameTaken);

        // The precheck fired before create_account: bob has no account.
        let err = other
            .sign_in("bob@example.com", "hunter22")
            .await
            .unwrap_err();
        assert_eq!(err, AuthError::InvalidCredentials);
    }

    #[tokio::test]
    async fn verification_survives_sign_out_and_back_in() {
        let mut h = harness(VerificationMode::SelfIssuedCode);
        h.gate
            .sign_up("alice@example.com", "hunter22", "alice")
            .await
            .unwrap();
        let code = h.delivery.last_code().unwrap();
        h.gate.submit_code(&code).await.unwrap();

        h.gate.sign_out().await;
        assert_eq!(h.gate.status(), GateStatus::Unauthenticated);

        let status = h
            .gate
            .sign_in("alice@example.com", "hunter22")
            .await
            .unwrap();
        assert_eq!(status, GateStatus::Verified);
        // No new code was issued for an already-verified account.
        assert_eq!(h.delivery.delivered_count(), 1);
    }

    #[tokio::test]
    async fn provider_managed_mode_mirrors_the_provider_flag() {
        let mut h = harness(VerificationMode::ProviderManaged);
        h.gate
            .sign_up("bob@example.com", "hunter22", "bob")
            .await
            .unwrap();
        assert_eq!(h.gate.status(), GateStatus::Unverified);

        // No local code exists in this variant.
        let err = h.gate.submit_code("123456").await.unwrap_err();
        assert_eq!(err, VerifyError::NoChallenge);

        // User clicks the provider's email link, then the gate refreshes.
        h.identity.complete_email_verification("bob@example.com");
        let status = h.gate.refresh().await.unwrap();
        assert_eq!(status, GateStatus::Verified);
        assert!(h.gate.verified_session().is_some());
    }

    #[tokio::test]
    async fn operations_require_a_session() {
        let mut h = harness(VerificationMode::SelfIssuedCode);
        assert_eq!(
            h.gate.request_verification().await.unwrap_err(),
            AuthError::NotSignedIn
        );
        assert_eq!(
            h.gate.submit_code("123456").await.unwrap_err(),
            VerifyError::NotSignedIn
        );
        assert_eq!(h.gate.refresh().await.unwrap_err(), AuthError::NotSignedIn);
    }
}
