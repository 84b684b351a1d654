//! Per-event work once the guild is ready. The async handlers are awaited
//! inside their own task by the runtime loop, so none of them may block it.
//! DMs are the exception: they are forwarded inline to keep their order.

use std::sync::Arc;
use tracing::{debug, error, info, warn};

use rolecall_core::{ChannelId, Member, Result, UserId};
use rolecall_discord::commands::{
    ADMIN, ADMIN_BATCH, ADMIN_REBUILD_CATALOG, ADMIN_RESET_STALE, ADMIN_VERIFY_USER, ASSIGN_ROLES,
    MAX_BATCH,
};
use rolecall_discord::{CommandInvocation, GuildApi};
use rolecall_verify::{DmDelivery, StartOrigin, StartOutcome, VerificationService};

pub const NO_SESSION_REPLY: &str =
    "There's no verification in progress. Use `/assign-roles` in the server to start one.";
pub const NOT_READY_REPLY: &str = "I'm still starting up. Please try again in a minute.";
pub const NOT_ADMIN_REPLY: &str = "You don't have permission to use this command.";
pub const BUSY_REPLY: &str = "I'm still working through your earlier messages. Please wait for my reply.";

#[derive(Clone)]
pub struct Handlers {
    api: Arc<dyn GuildApi>,
    service: Arc<VerificationService>,
}

impl Handlers {
    pub fn new(api: Arc<dyn GuildApi>, service: Arc<VerificationService>) -> Self {
        Self { api, service }
    }

    pub fn service(&self) -> &Arc<VerificationService> {
        &self.service
    }

    pub async fn on_member_join(&self, member: Member) {
        let user = member.user_id;
        match self.service.on_member_join(member).await {
            Ok(outcome) => debug!(user = %user, outcome = ?outcome, "member join handled"),
            Err(e) => error!(user = %user, error = %e, "could not start verification for new member"),
        }
    }

    /// Forward a DM to its session, or point the member at the command.
    /// Must be called from the event loop itself; only the reply to an
    /// undeliverable DM is sent from a separate task.
    pub fn on_direct_message(&self, channel: ChannelId, author: UserId, content: String) {
        let reply = match self.service.forward_dm(author, content) {
            DmDelivery::Delivered => return,
            DmDelivery::NoSession => {
                debug!(user = %author, "DM without an active session");
                NO_SESSION_REPLY
            }
            DmDelivery::Busy => BUSY_REPLY,
        };
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            if let Err(e) = api.send_message(channel, reply).await {
                warn!(user = %author, error = %e, "could not answer DM");
            }
        });
    }

    pub async fn on_command(&self, cmd: CommandInvocation) {
        if let Err(e) = self.api.defer_interaction(&cmd.interaction, true).await {
            warn!(command = %cmd.path(), error = %e, "could not defer interaction");
        }
        let reply = self.command_reply(&cmd).await;
        if let Err(e) = self.api.followup(&cmd.interaction, &reply, true).await {
            error!(command = %cmd.path(), error = %e, "could not send command followup");
        }
    }

    async fn command_reply(&self, cmd: &CommandInvocation) -> String {
        let guild = self.service.settings().guild_id;
        if cmd.guild_id != Some(guild) {
            return "This command only works in the server I manage.".into();
        }
        let Some(ref member) = cmd.member else {
            return "This command only works in the server I manage.".into();
        };
        info!(user = %member.user_id, command = %cmd.path(), "slash command");

        match (cmd.name.as_str(), cmd.subcommand.as_deref()) {
            (ASSIGN_ROLES, _) => {
                let outcome = self
                    .service
                    .start_verification(member.clone(), StartOrigin::Command)
                    .await;
                self_start_reply(outcome)
            }
            (ADMIN, _) if !self.service.is_admin(member) => {
                warn!(user = %member.user_id, command = %cmd.path(), "admin command refused");
                NOT_ADMIN_REPLY.into()
            }
            (ADMIN, Some(ADMIN_VERIFY_USER)) => {
                let Some(target) = cmd.option_user("member") else {
                    return "Please choose a member.".into();
                };
                let outcome = self.service.verify_user(target).await;
                admin_start_reply(target, outcome)
            }
            (ADMIN, Some(ADMIN_BATCH)) => {
                let count = cmd.option_int("count").unwrap_or(0);
                if !(1..=MAX_BATCH).contains(&count) {
                    return format!("The count must be between 1 and {MAX_BATCH}.");
                }
                match self.service.initiate_batch(count as usize).await {
                    Ok(report) if report.selected == 0 => {
                        "No unverified members are waiting for verification.".into()
                    }
                    Ok(report) => format!(
                        "Batch finished: {} selected, {} started, {} could not be started.",
                        report.selected, report.started, report.failed
                    ),
                    Err(e) => format!("Batch verification failed: {e}"),
                }
            }
            (ADMIN, Some(ADMIN_RESET_STALE)) => match self.service.reset_stale().await {
                Ok(0) => "No stale verifications found.".into(),
                Ok(n) => format!("Reset {n} member(s) to unverified."),
                Err(e) => format!("Reset failed: {e}"),
            },
            (ADMIN, Some(ADMIN_REBUILD_CATALOG)) => match self.service.rebuild_catalog().await {
                Ok(stats) => format!(
                    "Role categories rebuilt from {} role(s): {} programming language, {} experience level, {} operating system.",
                    stats.offered,
                    stats.programming_languages,
                    stats.experience_levels,
                    stats.operating_systems
                ),
                Err(e) => format!("Rebuild failed, the previous categories are still in use: {e}"),
            },
            _ => {
                warn!(command = %cmd.path(), "unknown command");
                "Unknown command.".into()
            }
        }
    }

    pub async fn on_roles_changed(&self) {
        if let Err(e) = self.service.refresh_catalog().await {
            warn!(error = %e, "could not refresh role catalog");
        }
    }
}

fn self_start_reply(outcome: Result<StartOutcome>) -> String {
    match outcome {
        Ok(StartOutcome::Started(handle)) if handle.is_update => {
            "I've sent you a DM. Let's review your roles there!".into()
        }
        Ok(StartOutcome::Started(_)) => "I've sent you a DM to get started!".into(),
        Ok(StartOutcome::AlreadyActive) => {
            "You already have a verification in progress. Please check your DMs.".into()
        }
        Ok(StartOutcome::DmUnavailable) => {
            "I couldn't send you a DM. Please allow direct messages from server members and try again."
                .into()
        }
        Ok(StartOutcome::CatalogNotReady) => NOT_READY_REPLY.into(),
        Ok(StartOutcome::IsBot | StartOutcome::NotInGuild) => "Nothing to do.".into(),
        Err(e) => {
            error!(error = %e, "verification could not start");
            "Something went wrong starting verification. Please contact an admin.".into()
        }
    }
}

fn admin_start_reply(target: UserId, outcome: Result<StartOutcome>) -> String {
    match outcome {
        Ok(StartOutcome::Started(_)) => format!("Verification started for <@{target}>."),
        Ok(StartOutcome::AlreadyActive) => format!("<@{target}> already has a verification in progress."),
        Ok(StartOutcome::IsBot) => "Bots can't be verified.".into(),
        Ok(StartOutcome::NotInGuild) => format!("<@{target}> is not a member of this server."),
        Ok(StartOutcome::DmUnavailable) => {
            format!("Couldn't DM <@{target}>; they have been marked unverified.")
        }
        Ok(StartOutcome::CatalogNotReady) => {
            "Role categories aren't built yet. Run `/admin rebuild-role-categories` first.".into()
        }
        Err(e) => format!("Could not start verification: {e}"),
    }
}
