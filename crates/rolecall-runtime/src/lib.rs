//! # rolecall-runtime
//!
//! The event loop: takes gateway events, brings the verification service up
//! when the guild becomes available, and fans member-facing events out to
//! their own tasks.

pub mod handlers;
pub mod runtime;

pub use handlers::Handlers;
pub use runtime::BotRuntime;
