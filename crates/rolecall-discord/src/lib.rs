//! # rolecall-discord
//!
//! Thin Discord adapter: a Gateway WebSocket client that turns dispatches
//! into typed [`GatewayEvent`]s, a REST client for messages, DMs, member
//! roles and interactions, and the [`GuildApi`] seam the rest of the bot
//! depends on (with an in-memory [`MockGuild`] for tests).

pub mod api;
pub mod commands;
pub mod events;
pub mod gateway;
pub mod mock;
pub mod rest;

pub use api::{Embed, EmbedField, GuildApi, InteractionRef};
pub use events::{CommandInvocation, GatewayEvent};
pub use gateway::DiscordGateway;
pub use mock::{Followup, MockGuild, RoleOp};
pub use rest::DiscordRest;
