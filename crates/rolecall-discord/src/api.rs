use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rolecall_core::{ApplicationId, ChannelId, GuildId, Member, Result, Role, RoleId, UserId};
use serde::{Deserialize, Serialize};

/// Embed colors used by notifications.
pub mod colors {
    pub const BLUE: u32 = 0x3498DB;
    pub const GREEN: u32 = 0x2ECC71;
    pub const ORANGE: u32 = 0xE67E22;
    pub const RED: u32 = 0xE74C3C;
}

/// A Discord rich embed, serialized in the REST API shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Embed {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub color: Option<u32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<EmbedField>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub footer: Option<EmbedFooter>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedField {
    pub name: String,
    pub value: String,
    #[serde(default)]
    pub inline: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbedFooter {
    pub text: String,
}

impl Embed {
    pub fn new(title: impl Into<String>, description: impl Into<String>, color: u32) -> Self {
        Self {
            title: Some(title.into()),
            description: Some(description.into()),
            color: Some(color),
            timestamp: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn field(mut self, name: impl Into<String>, value: impl Into<String>, inline: bool) -> Self {
        self.fields.push(EmbedField {
            name: name.into(),
            value: value.into(),
            inline,
        });
        self
    }

    pub fn footer(mut self, text: impl Into<String>) -> Self {
        self.footer = Some(EmbedFooter { text: text.into() });
        self
    }
}

/// Handle needed to answer an application-command interaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InteractionRef {
    pub id: String,
    pub token: String,
    pub application_id: ApplicationId,
}

/// Everything the bot needs from Discord, as one mockable seam.
#[async_trait]
pub trait GuildApi: Send + Sync {
    /// All roles of a guild.
    async fn list_roles(&self, guild: GuildId) -> Result<Vec<Role>>;

    /// A single member, or `None` if they are not (or no longer) in the guild.
    async fn get_member(&self, guild: GuildId, user: UserId) -> Result<Option<Member>>;

    /// Every member of the guild (paged under the hood).
    async fn list_members(&self, guild: GuildId) -> Result<Vec<Member>>;

    async fn add_member_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> Result<()>;

    async fn remove_member_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> Result<()>;

    /// Open (or fetch) the DM channel with a user.
    async fn open_dm(&self, user: UserId) -> Result<ChannelId>;

    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<()>;

    async fn send_embed(&self, channel: ChannelId, embed: &Embed) -> Result<()>;

    /// Best-effort typing indicator.
    async fn trigger_typing(&self, channel: ChannelId) -> Result<()>;

    /// Acknowledge an interaction; the answer follows via [`GuildApi::followup`].
    async fn defer_interaction(&self, interaction: &InteractionRef, ephemeral: bool) -> Result<()>;

    async fn followup(&self, interaction: &InteractionRef, text: &str, ephemeral: bool) -> Result<()>;

    /// Replace the guild's slash commands with `commands`.
    async fn register_commands(
        &self,
        application: ApplicationId,
        guild: GuildId,
        commands: &serde_json::Value,
    ) -> Result<()>;
}

/// Parse a guild member object (`{user: {...}, nick, roles}`).
pub fn parse_member(data: &serde_json::Value) -> Option<Member> {
    let user = &data["user"];
    let user_id = user["id"].as_str()?.parse::<UserId>().ok()?;
    let username = user["username"].as_str().unwrap_or("unknown").to_string();
    let display_name = data["nick"]
        .as_str()
        .or_else(|| user["global_name"].as_str())
        .map(str::to_string);
    let roles = data["roles"]
        .as_array()
        .map(|arr| {
            arr.iter()
                .filter_map(|r| r.as_str().and_then(|s| s.parse::<RoleId>().ok()))
                .collect()
        })
        .unwrap_or_default();
    Some(Member {
        user_id,
        username,
        display_name,
        bot: user["bot"].as_bool().unwrap_or(false),
        roles,
    })
}

/// Parse a role object (`{id, name, position, managed}`).
pub fn parse_role(data: &serde_json::Value) -> Option<Role> {
    Some(Role {
        id: data["id"].as_str()?.parse::<RoleId>().ok()?,
        name: data["name"].as_str()?.to_string(),
        position: data["position"].as_i64().unwrap_or(0),
        managed: data["managed"].as_bool().unwrap_or(false),
    })
}
