//! # rolecall-config
//!
//! Configuration for the bot. Reads `rolecall.toml`, then fills gaps from
//! environment variables and `*_FILE` secret files. Loaded once at start.

pub mod loader;
pub mod schema;

pub use loader::ConfigLoader;
pub use schema::RolecallConfig;
pub use schema::{ConfigWarning, WarningSeverity};
