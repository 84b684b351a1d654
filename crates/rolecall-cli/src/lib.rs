//! # rolecall-cli
//!
//! Command-line interface for the rolecall bot.
//!
//! ## Commands
//!
//! - `rolecall start`: Connect to Discord and run the bot
//! - `rolecall config`: Show the effective configuration
//! - `rolecall doctor`: Check configuration, prompts and the oracle

pub mod commands;

pub use commands::Cli;
