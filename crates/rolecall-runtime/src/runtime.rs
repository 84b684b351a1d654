use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use rolecall_config::RolecallConfig;
use rolecall_core::{ApplicationId, GuildId, Result, RolecallError};
use rolecall_discord::{DiscordGateway, DiscordRest, GatewayEvent, GuildApi, commands};
use rolecall_llm::OracleClient;
use rolecall_verify::{CatalogStore, Prompts, ServiceSettings, VerificationService};

use crate::handlers::{Handlers, NOT_READY_REPLY};

/// The bot process: owns the gateway event stream and builds the
/// verification service once the target guild is available.
pub struct BotRuntime {
    config: RolecallConfig,
    api: Arc<dyn GuildApi>,
    oracle: OracleClient,
    prompts: Arc<Prompts>,
    application_id: Option<ApplicationId>,
    handlers: Option<Handlers>,
}

impl BotRuntime {
    pub fn new(config: RolecallConfig, api: Arc<dyn GuildApi>, oracle: OracleClient) -> Result<Self> {
        let prompts = Arc::new(Prompts::load(&config.paths)?);
        Ok(Self {
            config,
            api,
            oracle,
            prompts,
            application_id: None,
            handlers: None,
        })
    }

    /// The service, once the guild has been seen.
    pub fn service(&self) -> Option<Arc<VerificationService>> {
        self.handlers.as_ref().map(|h| Arc::clone(h.service()))
    }

    /// Connect to Discord with `token` and run until Ctrl-C.
    pub async fn run_gateway(config: RolecallConfig, token: String, oracle: OracleClient) -> Result<()> {
        let api: Arc<dyn GuildApi> = Arc::new(DiscordRest::new(token.clone()));
        let runtime = Self::new(config, api, oracle)?;

        let mut gateway = DiscordGateway::new(token);
        let events = gateway.start()?;
        let result = runtime.run(events).await;
        gateway.stop();
        result
    }

    /// Process gateway events until the stream closes or Ctrl-C.
    pub async fn run(mut self, mut events: mpsc::Receiver<GatewayEvent>) -> Result<()> {
        info!(
            model = self.oracle.model(),
            provider = self.oracle.provider_name(),
            guild = ?self.config.discord.guild_id,
            "starting rolecall runtime"
        );

        loop {
            tokio::select! {
                event = events.recv() => match event {
                    Some(event) => self.dispatch(event).await,
                    None => {
                        warn!("gateway event stream closed");
                        break;
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    info!("shutdown signal received");
                    break;
                }
            }
        }

        if let Some(service) = self.service() {
            let open = service.active_sessions();
            if open > 0 {
                warn!(sessions = open, "shutting down with verification sessions still open");
            }
        }
        info!("rolecall runtime stopped");
        Ok(())
    }

    /// Handle one event. Lifecycle events and DM forwarding run inline;
    /// other member-facing work is spawned so a slow oracle call never holds
    /// up the loop.
    pub async fn dispatch(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::Connected => debug!("gateway connected"),
            GatewayEvent::Disconnected(reason) => {
                warn!(reason = reason.as_deref().unwrap_or("unknown"), "gateway disconnected");
            }
            GatewayEvent::Ready {
                bot_user_id,
                application_id,
                guild_ids,
            } => {
                info!(bot = %bot_user_id, guilds = guild_ids.len(), "gateway ready");
                self.application_id = application_id;
                if let Some(target) = self.config.discord.guild_id
                    && !guild_ids.contains(&target)
                {
                    warn!(guild = %target, "configured guild is not among the bot's guilds");
                }
            }
            GatewayEvent::GuildAvailable { guild_id, name, .. } => {
                self.on_guild_available(guild_id, name).await;
            }
            GatewayEvent::RolesChanged { guild_id } => {
                if let Some(h) = self.handlers_for(guild_id) {
                    tokio::spawn(async move { h.on_roles_changed().await });
                }
            }
            GatewayEvent::MemberJoined { guild_id, member } => {
                if let Some(h) = self.handlers_for(guild_id) {
                    tokio::spawn(async move { h.on_member_join(member).await });
                }
            }
            GatewayEvent::DirectMessage {
                channel_id,
                author,
                content,
            } => match self.handlers {
                Some(ref h) => h.on_direct_message(channel_id, author, content),
                None => debug!(user = %author, "DM before guild is ready; ignoring"),
            },
            GatewayEvent::Command(cmd) => match self.handlers.clone() {
                Some(h) => {
                    tokio::spawn(async move { h.on_command(cmd).await });
                }
                None => {
                    let api = Arc::clone(&self.api);
                    tokio::spawn(async move {
                        let _ = api.defer_interaction(&cmd.interaction, true).await;
                        let _ = api.followup(&cmd.interaction, NOT_READY_REPLY, true).await;
                    });
                }
            },
        }
    }

    fn handlers_for(&self, guild: GuildId) -> Option<Handlers> {
        self.handlers
            .as_ref()
            .filter(|h| h.service().settings().guild_id == guild)
            .cloned()
    }

    /// First sight of the target guild builds the service, registers the
    /// slash commands and loads the catalog. Later sightings (reconnects)
    /// only refresh the catalog.
    async fn on_guild_available(&mut self, guild_id: GuildId, name: String) {
        if let Some(h) = self.handlers_for(guild_id) {
            debug!(guild = %guild_id, "guild available again; refreshing catalog");
            tokio::spawn(async move { h.on_roles_changed().await });
            return;
        }
        if self.handlers.is_some() {
            debug!(guild = %guild_id, "ignoring additional guild");
            return;
        }
        if let Some(target) = self.config.discord.guild_id
            && target != guild_id
        {
            debug!(guild = %guild_id, "not the configured guild");
            return;
        }

        info!(guild = %guild_id, name = %name, "managing guild");
        let settings = ServiceSettings::from_config(&self.config, guild_id, name);
        let store = CatalogStore::new(self.config.paths.categorized_roles.clone());
        let service = Arc::new(VerificationService::new(
            Arc::clone(&self.api),
            self.oracle.clone(),
            Arc::clone(&self.prompts),
            store,
            settings,
        ));

        if let Err(e) = self.register_commands(guild_id).await {
            error!(guild = %guild_id, error = %e, "slash command registration failed");
        }

        let force = self.config.verification.rebuild_catalog_on_startup;
        match service.load_catalog(force).await {
            Ok(stats) => info!(
                programming_languages = stats.programming_languages,
                experience_levels = stats.experience_levels,
                operating_systems = stats.operating_systems,
                "role catalog ready"
            ),
            Err(e) => error!(
                error = %e,
                "role catalog unavailable; run /admin rebuild-role-categories once the cause is fixed"
            ),
        }

        self.handlers = Some(Handlers::new(Arc::clone(&self.api), service));
    }

    async fn register_commands(&self, guild: GuildId) -> Result<()> {
        let app = self
            .application_id
            .ok_or_else(|| RolecallError::Discord("application id unknown; READY not received".into()))?;
        self.api
            .register_commands(app, guild, &commands::definitions())
            .await?;
        info!(guild = %guild, "slash commands registered");
        Ok(())
    }
}
