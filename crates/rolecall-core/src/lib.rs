//! # rolecall-core
//!
//! Shared vocabulary for the rolecall workspace: Discord identifiers, the
//! fixed role categories, chat messages exchanged with the oracle, and the
//! unified error type.

pub mod error;
pub mod message;
pub mod tool;
pub mod types;

pub use error::{RolecallError, Result};
pub use message::{Message, Speaker};
pub use tool::{Tool, ToolCall};
pub use types::*;
