//! Binds the dialogue controller to a guild: opens DMs, routes replies to
//! the right session, applies role changes and keeps moderators informed.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use rolecall_config::RolecallConfig;
use rolecall_config::schema::RolesConfig;
use rolecall_core::{
    Category, ChannelId, GuildId, Member, Result, RoleId, RolecallError, SessionId, UserId,
};
use rolecall_discord::api::colors;
use rolecall_discord::{Embed, GuildApi};
use rolecall_llm::OracleClient;

use crate::catalog::{CatalogHandle, CategorizedRoles, RoleCatalog};
use crate::classifier::{RoleCatalogClassifier, candidate_roles};
use crate::dialogue::{ConversationState, DialogueController, DialogueState};
use crate::prompts::Prompts;
use crate::reply::{RoleDiff, UnassignableSkill};
use crate::store::CatalogStore;
use crate::summary::{SummaryGenerator, WelcomeGenerator};
use crate::transcript::TurnSpeaker;

/// Buffered DM replies per session.
const SESSION_INBOX: usize = 16;

pub const TIMEOUT_MESSAGE: &str =
    "It looks like you've been inactive, so this verification timed out. Use `/assign-roles` to start again.";
pub const INTERNAL_ERROR_MESSAGE: &str =
    "An unexpected error occurred. Try `/assign-roles` again or contact an admin.";

/// Tunables and identifiers the service works with.
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub guild_id: GuildId,
    pub guild_name: String,
    pub roles: RolesConfig,
    pub notification_channel: Option<ChannelId>,
    pub welcome_channel: Option<ChannelId>,
    pub admin_roles: Vec<RoleId>,
    pub max_turns: u32,
    pub max_history: usize,
    pub summary_max_chars: usize,
    pub session_timeout: Duration,
    pub role_apply_retries: u32,
    pub role_retry_delay: Duration,
    pub batch_delay: Duration,
}

impl ServiceSettings {
    pub fn from_config(config: &RolecallConfig, guild_id: GuildId, guild_name: impl Into<String>) -> Self {
        Self {
            guild_id,
            guild_name: guild_name.into(),
            roles: config.roles.clone(),
            notification_channel: config.discord.notification_channel_id,
            welcome_channel: config.discord.welcome_channel_id,
            admin_roles: config.discord.admin_role_ids.clone(),
            max_turns: config.verification.max_turns,
            max_history: config.verification.max_history_messages,
            summary_max_chars: config.verification.summary_max_chars,
            session_timeout: Duration::from_secs(config.verification.session_timeout_secs),
            role_apply_retries: config.verification.role_apply_retries,
            role_retry_delay: Duration::from_millis(500),
            batch_delay: Duration::from_millis(config.verification.batch_delay_ms),
        }
    }
}

/// Where a verification request came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOrigin {
    Joined,
    Command,
    Admin,
    Batch,
}

/// What happened to a DM handed to [`VerificationService::forward_dm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmDelivery {
    Delivered,
    NoSession,
    /// The session still has a full inbox of unanswered messages.
    Busy,
}

/// Result of trying to open a session.
#[derive(Debug)]
pub enum StartOutcome {
    Started(SessionHandle),
    AlreadyActive,
    IsBot,
    NotInGuild,
    /// No categorized roles yet; nothing was changed.
    CatalogNotReady,
    /// The greeting DM could not be delivered; the member was marked unverified.
    DmUnavailable,
}

#[derive(Debug)]
pub struct SessionHandle {
    pub session_id: SessionId,
    pub is_update: bool,
    pub task: JoinHandle<SessionReport>,
}

/// A role change that could not be applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleApplyFailure {
    pub role: RoleId,
    pub added: bool,
    pub error: String,
}

/// What a finished session did.
#[derive(Debug, Clone)]
pub struct SessionReport {
    pub user_id: UserId,
    pub state: DialogueState,
    pub reason: String,
    pub turns: u32,
    /// Skill-role changes (status roles excluded).
    pub diff: RoleDiff,
    pub failures: Vec<RoleApplyFailure>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub selected: usize,
    pub started: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CatalogStats {
    pub offered: usize,
    pub programming_languages: usize,
    pub experience_levels: usize,
    pub operating_systems: usize,
}

impl CatalogStats {
    fn of(catalog: &RoleCatalog, offered: usize) -> Self {
        Self {
            offered,
            programming_languages: catalog.roles(Category::ProgrammingLanguage).len(),
            experience_levels: catalog.roles(Category::ExperienceLevel).len(),
            operating_systems: catalog.roles(Category::OperatingSystem).len(),
        }
    }
}

pub struct VerificationService {
    api: Arc<dyn GuildApi>,
    settings: ServiceSettings,
    controller: DialogueController,
    summaries: SummaryGenerator,
    welcomes: WelcomeGenerator,
    classifier: RoleCatalogClassifier,
    store: CatalogStore,
    catalog: CatalogHandle,
    sessions: DashMap<UserId, mpsc::Sender<String>>,
}

impl VerificationService {
    pub fn new(
        api: Arc<dyn GuildApi>,
        oracle: OracleClient,
        prompts: Arc<Prompts>,
        store: CatalogStore,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            controller: DialogueController::new(
                oracle.clone(),
                Arc::clone(&prompts),
                settings.max_history,
            ),
            summaries: SummaryGenerator::new(
                oracle.clone(),
                Arc::clone(&prompts),
                settings.summary_max_chars,
            ),
            welcomes: WelcomeGenerator::new(oracle.clone(), Arc::clone(&prompts)),
            classifier: RoleCatalogClassifier::new(oracle, prompts),
            api,
            settings,
            store,
            catalog: CatalogHandle::default(),
            sessions: DashMap::new(),
        }
    }

    pub fn settings(&self) -> &ServiceSettings {
        &self.settings
    }

    pub fn catalog(&self) -> &CatalogHandle {
        &self.catalog
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn has_session(&self, user: UserId) -> bool {
        self.sessions.contains_key(&user)
    }

    pub fn is_admin(&self, member: &Member) -> bool {
        self.settings.admin_roles.iter().any(|r| member.has_role(*r))
    }

    // ── Sessions ───────────────────────────────────────────────

    /// Open a verification (or update) session with `member`.
    pub async fn start_verification(
        self: &Arc<Self>,
        member: Member,
        origin: StartOrigin,
    ) -> Result<StartOutcome> {
        info!(user = %member.user_id, name = member.name(), ?origin, "starting verification");
        if member.bot {
            return Ok(StartOutcome::IsBot);
        }

        let catalog = self.catalog.snapshot();
        if catalog.is_empty() {
            warn!(user = %member.user_id, "role catalog is empty; cannot verify yet");
            return Ok(StartOutcome::CatalogNotReady);
        }

        let (tx, rx) = mpsc::channel(SESSION_INBOX);
        match self.sessions.entry(member.user_id) {
            Entry::Occupied(_) => {
                info!(user = %member.user_id, "verification already underway");
                return Ok(StartOutcome::AlreadyActive);
            }
            Entry::Vacant(slot) => {
                slot.insert(tx);
            }
        }

        let managed = catalog.role_ids();
        let prior: BTreeSet<RoleId> = member
            .roles
            .iter()
            .filter(|r| managed.contains(r))
            .copied()
            .collect();
        let holds_verified = self
            .settings
            .roles
            .verified
            .is_some_and(|v| member.has_role(v));
        let mut state = ConversationState::new(member.user_id, self.settings.max_turns);
        if holds_verified || !prior.is_empty() {
            state = state.with_prior_roles(prior);
        }
        let is_update = state.is_update();

        if let Some(in_progress) = self.settings.roles.in_progress
            && !member.has_role(in_progress)
            && let Err(e) = self
                .apply_change(member.user_id, in_progress, true, "Verification started")
                .await
        {
            warn!(user = %member.user_id, error = %e, "could not mark verification in progress");
        }

        let greeting = greeting_text(&member, &self.settings.guild_name);
        let dm = match self.open_dm_and_send(member.user_id, &greeting).await {
            Ok(dm) => dm,
            Err(e) => {
                warn!(user = %member.user_id, error = %e, "cannot DM member");
                self.sessions.remove(&member.user_id);
                state.abandon();
                self.conclude(&member, &state, "Failed to send DM (DMs possibly disabled).")
                    .await;
                return Ok(StartOutcome::DmUnavailable);
            }
        };
        state
            .transcript
            .push(TurnSpeaker::Assistant, greeting);

        let session_id = state.session_id;
        let service = Arc::clone(self);
        let task = tokio::spawn(async move { service.run_session(member, dm, rx, state).await });
        Ok(StartOutcome::Started(SessionHandle {
            session_id,
            is_update,
            task,
        }))
    }

    /// Route a DM to the member's open session. `false` if there is none.
    /// Queue a DM on its session's inbox without waiting, so messages from
    /// one member reach the dialogue in the order they were received.
    pub fn forward_dm(&self, user: UserId, content: String) -> DmDelivery {
        let Some(tx) = self.sessions.get(&user).map(|tx| tx.clone()) else {
            return DmDelivery::NoSession;
        };
        match tx.try_send(content) {
            Ok(()) => DmDelivery::Delivered,
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(user = %user, "session inbox full; dropping message");
                DmDelivery::Busy
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(user = %user, "session ended before the message arrived");
                DmDelivery::NoSession
            }
        }
    }

    async fn open_dm_and_send(&self, user: UserId, text: &str) -> Result<ChannelId> {
        let dm = self.api.open_dm(user).await?;
        self.api.send_message(dm, text).await?;
        Ok(dm)
    }

    async fn run_session(
        self: Arc<Self>,
        member: Member,
        dm: ChannelId,
        mut inbox: mpsc::Receiver<String>,
        mut state: ConversationState,
    ) -> SessionReport {
        let user = member.user_id;
        let reason: String = loop {
            let input = match tokio::time::timeout(self.settings.session_timeout, inbox.recv()).await
            {
                Ok(Some(text)) => text,
                Ok(None) => {
                    state.abandon();
                    break "Session cancelled.".into();
                }
                Err(_) => {
                    info!(user = %user, "verification DM timed out");
                    if let Err(e) = self.api.send_message(dm, TIMEOUT_MESSAGE).await {
                        warn!(user = %user, error = %e, "could not send timeout notice");
                    }
                    state.abandon();
                    break "User inactive in DM.".into();
                }
            };

            let _ = self.api.trigger_typing(dm).await;
            let catalog = self.catalog.snapshot();
            let current_names = state
                .prior_roles
                .as_ref()
                .map(|prior| catalog.names_of(prior))
                .unwrap_or_default();

            let outcome = match self
                .controller
                .take_turn(&mut state, &catalog, &input, &current_names)
                .await
            {
                Ok(outcome) => outcome,
                Err(e) => {
                    error!(user = %user, error = %e, "verification turn failed");
                    let _ = self.api.send_message(dm, INTERNAL_ERROR_MESSAGE).await;
                    state.abandon();
                    break "Internal error during DM conversation.".into();
                }
            };

            if let Err(e) = self.api.send_message(dm, &outcome.message).await {
                warn!(user = %user, error = %e, "cannot DM member mid-session");
                state.abandon();
                break "Failed to send DM (DMs disabled mid-process).".into();
            }

            for skill in &outcome.unassignable_skills {
                self.notify_unmappable_skill(&member, skill).await;
            }

            match outcome.state {
                DialogueState::Confirmed => break "Member confirmed the proposed roles.".into(),
                DialogueState::FinalForced => break "Roles assigned on the final attempt.".into(),
                DialogueState::Abandoned => {
                    break "No roles could be determined on the final attempt.".into();
                }
                DialogueState::Gathering | DialogueState::ProposalPending => {
                    debug!(user = %user, turns_left = state.turns_left(), "waiting for next reply");
                }
            }
        };

        self.conclude(&member, &state, &reason).await
    }

    /// Apply the session's result to the member and notify moderators.
    async fn conclude(&self, member: &Member, state: &ConversationState, reason: &str) -> SessionReport {
        self.sessions.remove(&member.user_id);
        info!(user = %member.user_id, state = ?state.state, reason, "concluding verification");

        let mut report = SessionReport {
            user_id: member.user_id,
            state: state.state,
            reason: reason.to_string(),
            turns: state.turns_taken,
            diff: RoleDiff::default(),
            failures: Vec::new(),
        };

        let current = match self.api.get_member(self.settings.guild_id, member.user_id).await {
            Ok(Some(m)) => m,
            Ok(None) => {
                warn!(user = %member.user_id, "member left the guild; no roles changed");
                return report;
            }
            Err(e) => {
                warn!(user = %member.user_id, error = %e, "could not refresh member; using cached roles");
                member.clone()
            }
        };

        let catalog = self.catalog.snapshot();
        let roles = &self.settings.roles;
        let mut add: Vec<RoleId> = Vec::new();
        let mut remove: Vec<RoleId> = Vec::new();

        if let Some(r) = roles.in_progress
            && current.has_role(r)
        {
            remove.push(r);
        }

        if state.state.applies_roles() {
            let managed = catalog.role_ids();
            let target: BTreeSet<RoleId> = state
                .final_role_ids()
                .into_iter()
                .filter(|r| managed.contains(r))
                .collect();
            let held: BTreeSet<RoleId> = current
                .roles
                .iter()
                .filter(|r| managed.contains(r))
                .copied()
                .collect();
            report.diff = RoleDiff::between(&held, &target);
            add.extend(&report.diff.add);
            remove.extend(&report.diff.remove);

            if let Some(r) = roles.verified
                && !current.has_role(r)
            {
                add.push(r);
            }
            if let Some(r) = roles.unverified
                && current.has_role(r)
            {
                remove.push(r);
            }
        } else if let Some(r) = roles.unverified
            && !current.has_role(r)
            && !roles.verified.is_some_and(|v| current.has_role(v))
        {
            add.push(r);
        }

        let audit = format!("Verification: {reason}");
        for role in remove {
            if let Err(e) = self.apply_change(member.user_id, role, false, &audit).await {
                report.failures.push(RoleApplyFailure {
                    role,
                    added: false,
                    error: e.to_string(),
                });
            }
        }
        for role in add {
            if let Err(e) = self.apply_change(member.user_id, role, true, &audit).await {
                report.failures.push(RoleApplyFailure {
                    role,
                    added: true,
                    error: e.to_string(),
                });
            }
        }
        if report.failures.is_empty() {
            info!(
                user = %member.user_id,
                added = report.diff.add.len(),
                removed = report.diff.remove.len(),
                "role changes applied"
            );
        } else {
            self.notify_role_failures(member, &report.failures).await;
        }

        self.notify_conclusion(member, state, &report, &catalog).await;
        report
    }

    /// One add or remove, retried on transient Discord errors.
    async fn apply_change(&self, user: UserId, role: RoleId, add: bool, reason: &str) -> Result<()> {
        let guild = self.settings.guild_id;
        let mut attempt = 0u32;
        loop {
            let result = if add {
                self.api.add_member_role(guild, user, role, reason).await
            } else {
                self.api.remove_member_role(guild, user, role, reason).await
            };
            match result {
                Ok(()) => {
                    debug!(user = %user, role = %role, add, "role change applied");
                    return Ok(());
                }
                Err(e) if e.is_transient() && attempt < self.settings.role_apply_retries => {
                    let delay = self
                        .settings
                        .role_retry_delay
                        .saturating_mul(2u32.saturating_pow(attempt));
                    warn!(user = %user, role = %role, attempt = attempt + 1, error = %e, "retrying role change");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(user = %user, role = %role, add, error = %e, "role change failed");
                    return Err(RolecallError::RoleApply {
                        role_id: role.get(),
                        reason: e.to_string(),
                    });
                }
            }
        }
    }

    // ── Moderator notifications ────────────────────────────────

    async fn notify(&self, embed: Embed) {
        let Some(channel) = self.settings.notification_channel else {
            debug!(title = ?embed.title, "no notification channel; skipping");
            return;
        };
        if let Err(e) = self.api.send_embed(channel, &embed).await {
            error!(channel = %channel, error = %e, "failed to send moderator notification");
        }
    }

    async fn notify_unmappable_skill(&self, member: &Member, skill: &UnassignableSkill) {
        let category = if skill.category.trim().is_empty() {
            "Unknown Category"
        } else {
            skill.category.as_str()
        };
        info!(user = %member.user_id, skill = %skill.skill, category, "unmappable skill mentioned");
        let embed = Embed::new(
            "🔔 Unmappable Skill Alert",
            format!(
                "User {} (`{}`) mentioned a skill for which no corresponding role was found.",
                member.mention(),
                member.user_id
            ),
            colors::ORANGE,
        )
        .field("User Name", &member.username, true)
        .field("Skill Mentioned", format!("`{}`", skill.skill), true)
        .field("Suggested Category", format!("`{category}`"), true)
        .footer("Consider adding this as a new role if appropriate.");
        self.notify(embed).await;
    }

    async fn notify_role_failures(&self, member: &Member, failures: &[RoleApplyFailure]) {
        let lines: Vec<String> = failures
            .iter()
            .map(|f| {
                format!(
                    "{} <@&{}>: {}",
                    if f.added { "add" } else { "remove" },
                    f.role,
                    f.error
                )
            })
            .collect();
        let embed = Embed::new(
            format!("⚠️ Role Assignment Incomplete: {}", member.name()),
            format!(
                "Some role changes for {} could not be applied. Check that the bot's role sits above the managed roles.\n{}",
                member.mention(),
                lines.join("\n")
            ),
            colors::RED,
        );
        self.notify(embed).await;
    }

    async fn notify_conclusion(
        &self,
        member: &Member,
        state: &ConversationState,
        report: &SessionReport,
        catalog: &RoleCatalog,
    ) {
        let embed = if state.state.applies_roles() {
            let names = catalog.names_of(&state.final_role_ids());
            let listed = if names.is_empty() {
                "None".to_string()
            } else {
                names.join(", ")
            };
            let embed = if state.is_update() {
                Embed::new(
                    format!("🔄 User Roles Updated: {}", member.name()),
                    format!("{} has updated their roles.\n**New skill roles:** {listed}", member.mention()),
                    colors::ORANGE,
                )
                .field("Added", role_mentions(&report.diff.add), true)
                .field("Removed", role_mentions(&report.diff.remove), true)
            } else {
                let summary = self.summaries.generate(&state.transcript, &names).await;
                let description = summary.unwrap_or_else(|| {
                    format!("User successfully verified.\nAssigned roles: {listed}.\n(Summary unavailable.)")
                });
                Embed::new(
                    format!("✅ New User Verified: {}", member.name()),
                    description,
                    colors::GREEN,
                )
            };
            embed.footer(if state.state == DialogueState::FinalForced {
                "Concluded on the final attempt without explicit confirmation."
            } else {
                "Confirmed by the member."
            })
        } else {
            Embed::new(
                format!("❌ Verification Not Completed: {}", member.name()),
                format!(
                    "{} could not complete verification.\nReason: {}\nStatus: Unverified",
                    member.mention(),
                    report.reason
                ),
                colors::RED,
            )
        };
        self.notify(embed).await;
    }

    // ── Role catalog ───────────────────────────────────────────

    /// Load the persisted catalog, or classify from scratch when there is
    /// none (or `force`). Failures keep the current snapshot.
    pub async fn load_catalog(&self, force: bool) -> Result<CatalogStats> {
        if !force {
            match self.store.load() {
                Ok(Some(doc)) => {
                    let roles = self.api.list_roles(self.settings.guild_id).await?;
                    let catalog = RoleCatalog::resolve(&doc, &roles);
                    let stats = CatalogStats::of(&catalog, doc.total());
                    info!(roles = catalog.len(), path = %self.store.path().display(), "loaded role catalog");
                    self.catalog.replace(catalog);
                    return Ok(stats);
                }
                Ok(None) => info!("no persisted role catalog; classifying guild roles"),
                Err(e) => warn!(error = %e, "persisted role catalog unreadable; classifying again"),
            }
        }
        self.rebuild_catalog().await
    }

    /// Classify the guild's roles with the oracle, persist, and swap in the
    /// new snapshot. Nothing changes if any step before the swap fails.
    pub async fn rebuild_catalog(&self) -> Result<CatalogStats> {
        let guild = self.settings.guild_id;
        let roles = self.api.list_roles(guild).await?;
        let candidates = candidate_roles(guild, &roles, &self.settings.roles)?;
        let pairs: Vec<(String, RoleId)> = candidates.iter().map(|r| (r.name.clone(), r.id)).collect();

        let doc: CategorizedRoles = self.classifier.classify(&pairs).await?;
        let catalog = RoleCatalog::resolve(&doc, &roles);
        let stats = CatalogStats::of(&catalog, pairs.len());
        if let Err(e) = self.store.save(&doc) {
            error!(error = %e, "could not persist role catalog; keeping it in memory only");
        }
        self.catalog.replace(catalog);
        Ok(stats)
    }

    /// Re-resolve the persisted names after guild roles changed.
    pub async fn refresh_catalog(&self) -> Result<()> {
        let Some(doc) = self.store.load()? else {
            return Ok(());
        };
        let roles = self.api.list_roles(self.settings.guild_id).await?;
        self.catalog.replace(RoleCatalog::resolve(&doc, &roles));
        debug!("role catalog refreshed after role change");
        Ok(())
    }

    // ── Members & admin operations ─────────────────────────────

    /// Welcome message (if a channel is configured) and a fresh session.
    pub async fn on_member_join(self: &Arc<Self>, member: Member) -> Result<StartOutcome> {
        if member.bot {
            return Ok(StartOutcome::IsBot);
        }
        if let Some(channel) = self.settings.welcome_channel {
            let text = self
                .welcomes
                .generate(member.name(), &member.user_id.to_string(), &self.settings.guild_name)
                .await;
            if let Err(e) = self.api.send_message(channel, &text).await {
                warn!(channel = %channel, error = %e, "could not post welcome message");
            }
        }
        self.start_verification(member, StartOrigin::Joined).await
    }

    /// `/admin verify-user`.
    pub async fn verify_user(self: &Arc<Self>, user: UserId) -> Result<StartOutcome> {
        match self.api.get_member(self.settings.guild_id, user).await? {
            Some(member) => self.start_verification(member, StartOrigin::Admin).await,
            None => Ok(StartOutcome::NotInGuild),
        }
    }

    /// `/admin initiate-verification-batch`: DM up to `count` members that
    /// hold the unverified role and nothing else of the status set.
    pub async fn initiate_batch(self: &Arc<Self>, count: usize) -> Result<BatchReport> {
        let roles = &self.settings.roles;
        let unverified = roles.unverified.ok_or_else(|| RolecallError::ConfigValidation {
            field: "roles.unverified".into(),
            reason: "required for batch verification".into(),
        })?;

        let members = self.api.list_members(self.settings.guild_id).await?;
        let batch: Vec<Member> = members
            .into_iter()
            .filter(|m| !m.bot && m.has_role(unverified))
            .filter(|m| !roles.verified.is_some_and(|r| m.has_role(r)))
            .filter(|m| !roles.in_progress.is_some_and(|r| m.has_role(r)))
            .filter(|m| !self.has_session(m.user_id))
            .take(count)
            .collect();

        let mut report = BatchReport {
            selected: batch.len(),
            ..Default::default()
        };
        for (i, member) in batch.into_iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings.batch_delay).await;
            }
            let user = member.user_id;
            match self.start_verification(member, StartOrigin::Batch).await {
                Ok(StartOutcome::Started(_)) => report.started += 1,
                Ok(other) => {
                    debug!(user = %user, outcome = ?other, "batch member not started");
                    report.failed += 1;
                }
                Err(e) => {
                    warn!(user = %user, error = %e, "batch verification failed to start");
                    report.failed += 1;
                }
            }
        }
        info!(
            selected = report.selected,
            started = report.started,
            failed = report.failed,
            "verification batch complete"
        );
        Ok(report)
    }

    /// `/admin reset-stale-verifications`: members stuck in progress (with
    /// no open session) or holding no status role go back to unverified.
    pub async fn reset_stale(&self) -> Result<usize> {
        let roles = &self.settings.roles;
        let unverified = roles.unverified.ok_or_else(|| RolecallError::ConfigValidation {
            field: "roles.unverified".into(),
            reason: "required to reset verifications".into(),
        })?;

        let members = self.api.list_members(self.settings.guild_id).await?;
        let mut reset = 0;
        for member in members {
            if member.bot || self.has_session(member.user_id) {
                continue;
            }
            let verified = roles.verified.is_some_and(|r| member.has_role(r));
            let in_progress = roles.in_progress.is_some_and(|r| member.has_role(r));
            let has_unverified = member.has_role(unverified);
            let stale = (in_progress && !verified) || (!verified && !has_unverified && !in_progress);
            if !stale {
                continue;
            }

            let reason = "Reset stale verification";
            let mut ok = true;
            if in_progress
                && let Some(r) = roles.in_progress
            {
                ok &= self.apply_change(member.user_id, r, false, reason).await.is_ok();
            }
            if !has_unverified {
                ok &= self
                    .apply_change(member.user_id, unverified, true, reason)
                    .await
                    .is_ok();
            }
            if ok {
                reset += 1;
                info!(user = %member.user_id, "reset to unverified");
            }
        }
        Ok(reset)
    }
}

fn greeting_text(member: &Member, guild_name: &str) -> String {
    let mention = member.mention();
    format!(
        "Hello {mention}! To begin your verification with **{guild_name}**, please tell me about your skills \
         (programming languages, experience level, operating systems).\n\n\
         ¡Hola {mention}! Para comenzar tu verificación con **{guild_name}**, cuéntame sobre tus habilidades \
         (lenguajes de programación, nivel de experiencia, sistemas operativos)."
    )
}

fn role_mentions(ids: &[RoleId]) -> String {
    if ids.is_empty() {
        "—".into()
    } else {
        ids.iter().map(|r| format!("<@&{r}>")).collect::<Vec<_>>().join(" ")
    }
}
