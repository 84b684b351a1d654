use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use rolecall_core::{
    ApplicationId, ChannelId, GuildId, Member, Result, Role, RoleId, RolecallError, UserId,
};
use serde_json::{Value, json};
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::{Embed, GuildApi, InteractionRef, parse_member, parse_role};

pub const DISCORD_API_BASE: &str = "https://discord.com/api/v10";

/// Interaction callback type: deferred channel message with source.
const CALLBACK_DEFERRED_MESSAGE: u8 = 5;
/// Message flag: only visible to the invoker.
const FLAG_EPHEMERAL: u64 = 1 << 6;
/// Page size for member listing.
const MEMBER_PAGE: usize = 1000;
/// How many times a 429 is waited out before giving up.
const RATE_LIMIT_RETRIES: u32 = 2;

/// Discord REST API client.
#[derive(Clone)]
pub struct DiscordRest {
    token: String,
    client: reqwest::Client,
    base: String,
}

impl DiscordRest {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            client: reqwest::Client::new(),
            base: DISCORD_API_BASE.into(),
        }
    }

    /// Point at a different API base (e.g. a local proxy).
    pub fn with_base(mut self, base: impl Into<String>) -> Self {
        self.base = base.into();
        self
    }

    /// Send a request, waiting out 429s, and return the JSON body (Null when empty).
    async fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
        body: Option<&Value>,
        reason: Option<&str>,
    ) -> Result<Value> {
        let url = format!("{}{}", self.base, path);
        let mut attempt = 0u32;

        loop {
            let mut req = self
                .client
                .request(method.clone(), &url)
                .header("Authorization", format!("Bot {}", self.token));
            if !query.is_empty() {
                req = req.query(query);
            }
            if let Some(b) = body {
                req = req.json(b);
            }
            if let Some(r) = reason {
                req = req.header("X-Audit-Log-Reason", sanitize_reason(r));
            }

            let resp = req
                .send()
                .await
                .map_err(|e| RolecallError::Discord(format!("HTTP error: {e}")))?;

            let status = resp.status();
            if status == StatusCode::TOO_MANY_REQUESTS {
                let data: Value = resp.json().await.unwrap_or_default();
                let retry_after = data["retry_after"].as_f64().unwrap_or(1.0);
                if attempt < RATE_LIMIT_RETRIES {
                    warn!(path, retry_after, "Discord rate limited, waiting");
                    tokio::time::sleep(Duration::from_secs_f64(retry_after.max(0.0))).await;
                    attempt += 1;
                    continue;
                }
                return Err(RolecallError::RateLimited {
                    retry_after_secs: retry_after.ceil() as u64,
                });
            }

            if !status.is_success() {
                let text = resp.text().await.unwrap_or_default();
                warn!(status = %status, path, body = %text, "Discord API error");
                return Err(RolecallError::DiscordApi {
                    status: status.as_u16(),
                    body: text,
                });
            }

            if status == StatusCode::NO_CONTENT {
                return Ok(Value::Null);
            }
            let text = resp
                .text()
                .await
                .map_err(|e| RolecallError::Discord(format!("reading body: {e}")))?;
            if text.is_empty() {
                return Ok(Value::Null);
            }
            return Ok(serde_json::from_str(&text)?);
        }
    }
}

/// Audit-log reasons travel in a header: keep them printable and short.
fn sanitize_reason(reason: &str) -> String {
    reason
        .chars()
        .filter(|c| c.is_ascii() && !c.is_ascii_control())
        .take(256)
        .collect()
}

#[async_trait]
impl GuildApi for DiscordRest {
    async fn list_roles(&self, guild: GuildId) -> Result<Vec<Role>> {
        let data = self
            .execute(Method::GET, &format!("/guilds/{guild}/roles"), &[], None, None)
            .await?;
        Ok(data
            .as_array()
            .map(|arr| arr.iter().filter_map(parse_role).collect())
            .unwrap_or_default())
    }

    async fn get_member(&self, guild: GuildId, user: UserId) -> Result<Option<Member>> {
        match self
            .execute(
                Method::GET,
                &format!("/guilds/{guild}/members/{user}"),
                &[],
                None,
                None,
            )
            .await
        {
            Ok(data) => Ok(parse_member(&data)),
            Err(RolecallError::DiscordApi { status: 404, .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    async fn list_members(&self, guild: GuildId) -> Result<Vec<Member>> {
        let mut members = Vec::new();
        let mut after = UserId(0);
        loop {
            let data = self
                .execute(
                    Method::GET,
                    &format!("/guilds/{guild}/members"),
                    &[
                        ("limit", MEMBER_PAGE.to_string()),
                        ("after", after.to_string()),
                    ],
                    None,
                    None,
                )
                .await?;
            let page: Vec<Member> = data
                .as_array()
                .map(|arr| arr.iter().filter_map(parse_member).collect())
                .unwrap_or_default();
            let count = page.len();
            if let Some(last) = page.iter().map(|m| m.user_id).max() {
                after = last;
            }
            members.extend(page);
            if count < MEMBER_PAGE {
                break;
            }
        }
        debug!(guild = %guild, count = members.len(), "listed guild members");
        Ok(members)
    }

    async fn add_member_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> Result<()> {
        self.execute(
            Method::PUT,
            &format!("/guilds/{guild}/members/{user}/roles/{role}"),
            &[],
            None,
            Some(reason),
        )
        .await
        .map_err(|e| role_error(role, e))?;
        Ok(())
    }

    async fn remove_member_role(
        &self,
        guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> Result<()> {
        self.execute(
            Method::DELETE,
            &format!("/guilds/{guild}/members/{user}/roles/{role}"),
            &[],
            None,
            Some(reason),
        )
        .await
        .map_err(|e| role_error(role, e))?;
        Ok(())
    }

    async fn open_dm(&self, user: UserId) -> Result<ChannelId> {
        let body = json!({ "recipient_id": user.to_string() });
        let data = self
            .execute(Method::POST, "/users/@me/channels", &[], Some(&body), None)
            .await?;
        data["id"]
            .as_str()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| RolecallError::Discord("DM channel response has no id".into()))
    }

    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<()> {
        let body = json!({ "content": text });
        self.execute(
            Method::POST,
            &format!("/channels/{channel}/messages"),
            &[],
            Some(&body),
            None,
        )
        .await?;
        Ok(())
    }

    async fn send_embed(&self, channel: ChannelId, embed: &Embed) -> Result<()> {
        let body = json!({ "embeds": [embed] });
        self.execute(
            Method::POST,
            &format!("/channels/{channel}/messages"),
            &[],
            Some(&body),
            None,
        )
        .await?;
        Ok(())
    }

    async fn trigger_typing(&self, channel: ChannelId) -> Result<()> {
        let _ = self
            .execute(
                Method::POST,
                &format!("/channels/{channel}/typing"),
                &[],
                None,
                None,
            )
            .await;
        Ok(())
    }

    async fn defer_interaction(&self, interaction: &InteractionRef, ephemeral: bool) -> Result<()> {
        let mut body = json!({ "type": CALLBACK_DEFERRED_MESSAGE });
        if ephemeral {
            body["data"] = json!({ "flags": FLAG_EPHEMERAL });
        }
        self.execute(
            Method::POST,
            &format!(
                "/interactions/{}/{}/callback",
                interaction.id, interaction.token
            ),
            &[],
            Some(&body),
            None,
        )
        .await?;
        Ok(())
    }

    async fn followup(&self, interaction: &InteractionRef, text: &str, ephemeral: bool) -> Result<()> {
        let mut body = json!({ "content": text });
        if ephemeral {
            body["flags"] = json!(FLAG_EPHEMERAL);
        }
        self.execute(
            Method::POST,
            &format!(
                "/webhooks/{}/{}",
                interaction.application_id, interaction.token
            ),
            &[],
            Some(&body),
            None,
        )
        .await?;
        Ok(())
    }

    async fn register_commands(
        &self,
        application: ApplicationId,
        guild: GuildId,
        commands: &Value,
    ) -> Result<()> {
        self.execute(
            Method::PUT,
            &format!("/applications/{application}/guilds/{guild}/commands"),
            &[],
            Some(commands),
            None,
        )
        .await?;
        Ok(())
    }
}

/// Permission and hierarchy failures become `RoleApply`; transient ones stay as-is
/// so callers can retry.
fn role_error(role: RoleId, err: RolecallError) -> RolecallError {
    if err.is_transient() {
        return err;
    }
    match err {
        RolecallError::DiscordApi { status, body } => RolecallError::RoleApply {
            role_id: role.get(),
            reason: format!("HTTP {status}: {body}"),
        },
        other => other,
    }
}
