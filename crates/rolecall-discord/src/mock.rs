use async_trait::async_trait;
use parking_lot::Mutex;
use rolecall_core::{
    ApplicationId, ChannelId, GuildId, Member, Result, Role, RoleId, RolecallError, UserId,
};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

use crate::api::{Embed, GuildApi, InteractionRef};

/// First id handed out for mock DM channels.
const DM_CHANNEL_BASE: u64 = 900_000_000_000;

/// A recorded role mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleOp {
    pub user: UserId,
    pub role: RoleId,
    pub added: bool,
    pub reason: String,
}

/// A recorded interaction followup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Followup {
    pub interaction_id: String,
    pub text: String,
    pub ephemeral: bool,
}

#[derive(Default)]
struct GuildState {
    roles: Vec<Role>,
    members: HashMap<UserId, Member>,
    dm_channels: HashMap<UserId, ChannelId>,
    messages: Vec<(ChannelId, String)>,
    embeds: Vec<(ChannelId, Embed)>,
    role_ops: Vec<RoleOp>,
    deferred: Vec<String>,
    followups: Vec<Followup>,
    registered: Vec<(GuildId, Value)>,
    failing_roles: HashSet<RoleId>,
    flaky_roles: HashMap<RoleId, u32>,
    dm_blocked: HashSet<UserId>,
}

/// In-memory guild for testing. Records every outbound call.
#[derive(Default)]
pub struct MockGuild {
    state: Mutex<GuildState>,
}

impl MockGuild {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_roles(self, roles: impl IntoIterator<Item = Role>) -> Self {
        self.state.lock().roles.extend(roles);
        self
    }

    pub fn with_member(self, member: Member) -> Self {
        self.state.lock().members.insert(member.user_id, member);
        self
    }

    /// Every add/remove of `role` fails permanently (missing permissions).
    pub fn with_failing_role(self, role: RoleId) -> Self {
        self.state.lock().failing_roles.insert(role);
        self
    }

    /// The next `times` add/remove calls for `role` fail with a 502.
    pub fn with_flaky_role(self, role: RoleId, times: u32) -> Self {
        self.state.lock().flaky_roles.insert(role, times);
        self
    }

    /// The user has DMs closed.
    pub fn with_dm_blocked(self, user: UserId) -> Self {
        self.state.lock().dm_blocked.insert(user);
        self
    }

    pub fn add_member(&self, member: Member) {
        self.state.lock().members.insert(member.user_id, member);
    }

    pub fn remove_member(&self, user: UserId) {
        self.state.lock().members.remove(&user);
    }

    pub fn member(&self, user: UserId) -> Option<Member> {
        self.state.lock().members.get(&user).cloned()
    }

    pub fn member_roles(&self, user: UserId) -> Vec<RoleId> {
        self.member(user).map(|m| m.roles).unwrap_or_default()
    }

    pub fn dm_channel(&self, user: UserId) -> Option<ChannelId> {
        self.state.lock().dm_channels.get(&user).copied()
    }

    /// Texts sent to a user's DM channel, in order.
    pub fn dms_to(&self, user: UserId) -> Vec<String> {
        let Some(channel) = self.dm_channel(user) else {
            return Vec::new();
        };
        self.messages_in(channel)
    }

    pub fn messages_in(&self, channel: ChannelId) -> Vec<String> {
        self.state
            .lock()
            .messages
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, t)| t.clone())
            .collect()
    }

    pub fn embeds_in(&self, channel: ChannelId) -> Vec<Embed> {
        self.state
            .lock()
            .embeds
            .iter()
            .filter(|(c, _)| *c == channel)
            .map(|(_, e)| e.clone())
            .collect()
    }

    pub fn role_ops(&self) -> Vec<RoleOp> {
        self.state.lock().role_ops.clone()
    }

    pub fn role_ops_for(&self, user: UserId) -> Vec<RoleOp> {
        self.role_ops().into_iter().filter(|op| op.user == user).collect()
    }

    pub fn deferred(&self) -> Vec<String> {
        self.state.lock().deferred.clone()
    }

    pub fn followups(&self) -> Vec<Followup> {
        self.state.lock().followups.clone()
    }

    pub fn registered_commands(&self) -> Vec<(GuildId, Value)> {
        self.state.lock().registered.clone()
    }

    fn mutate_role(
        &self,
        user: UserId,
        role: RoleId,
        added: bool,
        reason: &str,
    ) -> Result<()> {
        let mut state = self.state.lock();
        if state.failing_roles.contains(&role) {
            return Err(RolecallError::RoleApply {
                role_id: role.get(),
                reason: "HTTP 403: Missing Permissions".into(),
            });
        }
        if let Some(left) = state.flaky_roles.get_mut(&role)
            && *left > 0
        {
            *left -= 1;
            return Err(RolecallError::DiscordApi {
                status: 502,
                body: "Bad Gateway".into(),
            });
        }
        let Some(member) = state.members.get_mut(&user) else {
            return Err(RolecallError::DiscordApi {
                status: 404,
                body: "Unknown Member".into(),
            });
        };
        if added {
            if !member.roles.contains(&role) {
                member.roles.push(role);
            }
        } else {
            member.roles.retain(|r| *r != role);
        }
        state.role_ops.push(RoleOp {
            user,
            role,
            added,
            reason: reason.to_string(),
        });
        Ok(())
    }
}

fn dm_forbidden() -> RolecallError {
    RolecallError::DiscordApi {
        status: 403,
        body: "Cannot send messages to this user".into(),
    }
}

#[async_trait]
impl GuildApi for MockGuild {
    async fn list_roles(&self, _guild: GuildId) -> Result<Vec<Role>> {
        Ok(self.state.lock().roles.clone())
    }

    async fn get_member(&self, _guild: GuildId, user: UserId) -> Result<Option<Member>> {
        Ok(self.member(user))
    }

    async fn list_members(&self, _guild: GuildId) -> Result<Vec<Member>> {
        let mut members: Vec<Member> = self.state.lock().members.values().cloned().collect();
        members.sort_by_key(|m| m.user_id);
        Ok(members)
    }

    async fn add_member_role(
        &self,
        _guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> Result<()> {
        self.mutate_role(user, role, true, reason)
    }

    async fn remove_member_role(
        &self,
        _guild: GuildId,
        user: UserId,
        role: RoleId,
        reason: &str,
    ) -> Result<()> {
        self.mutate_role(user, role, false, reason)
    }

    async fn open_dm(&self, user: UserId) -> Result<ChannelId> {
        let mut state = self.state.lock();
        if state.dm_blocked.contains(&user) {
            return Err(dm_forbidden());
        }
        let next = ChannelId(DM_CHANNEL_BASE + state.dm_channels.len() as u64);
        Ok(*state.dm_channels.entry(user).or_insert(next))
    }

    async fn send_message(&self, channel: ChannelId, text: &str) -> Result<()> {
        let mut state = self.state.lock();
        let blocked = state
            .dm_channels
            .iter()
            .any(|(user, c)| *c == channel && state.dm_blocked.contains(user));
        if blocked {
            return Err(dm_forbidden());
        }
        state.messages.push((channel, text.to_string()));
        Ok(())
    }

    async fn send_embed(&self, channel: ChannelId, embed: &Embed) -> Result<()> {
        self.state.lock().embeds.push((channel, embed.clone()));
        Ok(())
    }

    async fn trigger_typing(&self, _channel: ChannelId) -> Result<()> {
        Ok(())
    }

    async fn defer_interaction(&self, interaction: &InteractionRef, _ephemeral: bool) -> Result<()> {
        self.state.lock().deferred.push(interaction.id.clone());
        Ok(())
    }

    async fn followup(&self, interaction: &InteractionRef, text: &str, ephemeral: bool) -> Result<()> {
        self.state.lock().followups.push(Followup {
            interaction_id: interaction.id.clone(),
            text: text.to_string(),
            ephemeral,
        });
        Ok(())
    }

    async fn register_commands(
        &self,
        _application: ApplicationId,
        guild: GuildId,
        commands: &Value,
    ) -> Result<()> {
        self.state.lock().registered.push((guild, commands.clone()));
        Ok(())
    }
}
