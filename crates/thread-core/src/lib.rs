//! Core of the thread chat application: the verification gate that decides
//! who may post, the verified-send pipeline (translate with a deadline,
//! encode the image, commit to the log), and the live message view.
//!
//! Identity, the message log, the user directory and the translation service
//! are external collaborators, consumed through the traits in
//! `thread-backend` and `thread-translate`.

pub mod config;
pub mod gate;
pub mod pipeline;
pub mod view;

pub use config::{ThreadConfig, VerificationMode};
pub use gate::{GateStatus, VerificationGate, VerifiedSession};
pub use pipeline::{SendPipeline, SendReceipt, TranslationStatus};
pub use view::LiveMessageView;
