use rolecall_core::{ApplicationId, ChannelId, GuildId, Member, Role, UserId};
use serde_json::Value;
use std::collections::HashMap;

use crate::api::{InteractionRef, parse_member, parse_role};

/// Interaction type for application commands.
const INTERACTION_APPLICATION_COMMAND: u64 = 2;
/// Option types for subcommands / subcommand groups.
const OPTION_SUB_COMMAND: u64 = 1;
const OPTION_SUB_COMMAND_GROUP: u64 = 2;

/// Events the bot reacts to, decoded from Gateway dispatches.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    Connected,
    Disconnected(Option<String>),
    Ready {
        bot_user_id: UserId,
        application_id: Option<ApplicationId>,
        guild_ids: Vec<GuildId>,
    },
    /// GUILD_CREATE: the guild became available, with its roles.
    GuildAvailable {
        guild_id: GuildId,
        name: String,
        roles: Vec<Role>,
    },
    /// GUILD_ROLE_CREATE / UPDATE / DELETE.
    RolesChanged { guild_id: GuildId },
    MemberJoined { guild_id: GuildId, member: Member },
    /// A message in a DM channel from a non-bot user.
    DirectMessage {
        channel_id: ChannelId,
        author: UserId,
        content: String,
    },
    Command(CommandInvocation),
}

/// A slash-command invocation.
#[derive(Debug, Clone)]
pub struct CommandInvocation {
    pub interaction: InteractionRef,
    pub guild_id: Option<GuildId>,
    pub channel_id: Option<ChannelId>,
    /// The invoking member (only set inside a guild).
    pub member: Option<Member>,
    /// Top-level command name, e.g. "admin".
    pub name: String,
    /// Subcommand name, e.g. "verify-user".
    pub subcommand: Option<String>,
    /// Leaf option values keyed by option name.
    pub options: HashMap<String, Value>,
}

impl CommandInvocation {
    pub fn option_user(&self, name: &str) -> Option<UserId> {
        self.options.get(name)?.as_str()?.parse().ok()
    }

    pub fn option_int(&self, name: &str) -> Option<i64> {
        self.options.get(name)?.as_i64()
    }

    /// `"admin verify-user"` style path for logging and routing.
    pub fn path(&self) -> String {
        match self.subcommand {
            Some(ref sub) => format!("{} {}", self.name, sub),
            None => self.name.clone(),
        }
    }
}

/// Decode a DISPATCH payload. `bot_user_id` filters out the bot's own messages.
pub fn parse_dispatch(
    event_name: &str,
    data: &Value,
    bot_user_id: Option<UserId>,
) -> Option<GatewayEvent> {
    match event_name {
        "READY" => {
            let bot_user_id = data["user"]["id"].as_str()?.parse().ok()?;
            let application_id = data["application"]["id"]
                .as_str()
                .and_then(|s| s.parse().ok());
            let guild_ids = data["guilds"]
                .as_array()
                .map(|arr| {
                    arr.iter()
                        .filter_map(|g| g["id"].as_str().and_then(|s| s.parse().ok()))
                        .collect()
                })
                .unwrap_or_default();
            Some(GatewayEvent::Ready {
                bot_user_id,
                application_id,
                guild_ids,
            })
        }
        "GUILD_CREATE" => {
            let guild_id = data["id"].as_str()?.parse().ok()?;
            let roles = data["roles"]
                .as_array()
                .map(|arr| arr.iter().filter_map(parse_role).collect())
                .unwrap_or_default();
            Some(GatewayEvent::GuildAvailable {
                guild_id,
                name: data["name"].as_str().unwrap_or("").to_string(),
                roles,
            })
        }
        "GUILD_ROLE_CREATE" | "GUILD_ROLE_UPDATE" | "GUILD_ROLE_DELETE" => {
            let guild_id = data["guild_id"].as_str()?.parse().ok()?;
            Some(GatewayEvent::RolesChanged { guild_id })
        }
        "GUILD_MEMBER_ADD" => {
            let guild_id = data["guild_id"].as_str()?.parse().ok()?;
            let member = parse_member(data)?;
            Some(GatewayEvent::MemberJoined { guild_id, member })
        }
        "MESSAGE_CREATE" => {
            // Guild messages are not part of the verification dialogue.
            if !data["guild_id"].is_null() {
                return None;
            }
            if data["author"]["bot"].as_bool().unwrap_or(false) {
                return None;
            }
            let author: UserId = data["author"]["id"].as_str()?.parse().ok()?;
            if Some(author) == bot_user_id {
                return None;
            }
            let content = data["content"].as_str().unwrap_or("").trim().to_string();
            if content.is_empty() {
                return None;
            }
            Some(GatewayEvent::DirectMessage {
                channel_id: data["channel_id"].as_str()?.parse().ok()?,
                author,
                content,
            })
        }
        "INTERACTION_CREATE" => parse_command(data).map(GatewayEvent::Command),
        _ => None,
    }
}

fn parse_command(data: &Value) -> Option<CommandInvocation> {
    if data["type"].as_u64() != Some(INTERACTION_APPLICATION_COMMAND) {
        return None;
    }
    let interaction = InteractionRef {
        id: data["id"].as_str()?.to_string(),
        token: data["token"].as_str()?.to_string(),
        application_id: data["application_id"].as_str()?.parse().ok()?,
    };

    let command = &data["data"];
    let name = command["name"].as_str()?.to_string();

    // Walk down through subcommand groups / subcommands to the leaf options.
    let mut subcommand_parts = Vec::new();
    let mut options = command["options"].as_array().cloned().unwrap_or_default();
    while let Some(first) = options.first().cloned() {
        match first["type"].as_u64() {
            Some(OPTION_SUB_COMMAND) | Some(OPTION_SUB_COMMAND_GROUP) => {
                if let Some(n) = first["name"].as_str() {
                    subcommand_parts.push(n.to_string());
                }
                options = first["options"].as_array().cloned().unwrap_or_default();
            }
            _ => break,
        }
    }

    let options = options
        .into_iter()
        .filter_map(|o| Some((o["name"].as_str()?.to_string(), o["value"].clone())))
        .collect();

    Some(CommandInvocation {
        interaction,
        guild_id: data["guild_id"].as_str().and_then(|s| s.parse().ok()),
        channel_id: data["channel_id"].as_str().and_then(|s| s.parse().ok()),
        member: parse_member(&data["member"]),
        name,
        subcommand: if subcommand_parts.is_empty() {
            None
        } else {
            Some(subcommand_parts.join(" "))
        },
        options,
    })
}
