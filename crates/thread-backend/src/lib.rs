//! Collaborator interfaces the send pipeline and verification gate depend on,
//! plus in-memory implementations used for local simulation and tests.
//!
//! The real identity provider, message log, user directory and challenge
//! store are hosted services; this crate only defines the narrow surface the
//! core consumes.

// Collaborators are driven from a single session task, so the async trait
// methods carry no Send bound.
#![allow(async_fn_in_trait)]

pub mod memory;
pub mod traits;

pub use memory::{
    MemoryChallenges, MemoryDirectory, MemoryIdentity, MemoryLog, RecordingDelivery,
};
pub use traits::{
    ChallengeStore, CodeDelivery, IdentityProvider, LogSubscription, MessageLog, UserDirectory,
};
