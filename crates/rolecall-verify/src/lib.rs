//! # rolecall-verify
//!
//! The verification engine: the role catalog and its classifier, the
//! per-member dialogue state machine, moderator summaries, and
//! [`VerificationService`] which runs sessions against a guild.

pub mod catalog;
pub mod classifier;
pub mod dialogue;
pub mod prompts;
pub mod reply;
pub mod service;
pub mod store;
pub mod summary;
pub mod transcript;

pub use catalog::{CatalogHandle, CategorizedRoles, RoleCatalog};
pub use classifier::{RoleCatalogClassifier, candidate_roles};
pub use dialogue::{ConversationState, DialogueController, DialogueState, TurnKind, TurnOutcome};
pub use prompts::Prompts;
pub use reply::{Classification, OracleReply, RoleDiff, UnassignableSkill, parse_reply};
pub use service::{
    BatchReport, CatalogStats, DmDelivery, RoleApplyFailure, ServiceSettings, SessionHandle,
    SessionReport, StartOrigin, StartOutcome, VerificationService,
};
pub use store::CatalogStore;
pub use summary::{SummaryGenerator, WelcomeGenerator};
pub use transcript::{Transcript, Turn, TurnSpeaker};
