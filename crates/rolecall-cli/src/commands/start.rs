use std::path::Path;
use tracing::info;

use rolecall_config::RolecallConfig;
use rolecall_core::{Result, RolecallError};
use rolecall_runtime::BotRuntime;

use super::build_oracle;

pub(super) async fn cmd_start(config: RolecallConfig, config_path: &Path) -> Result<()> {
    let token = config
        .discord
        .token
        .clone()
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| {
            RolecallError::Config(
                "no Discord bot token; set DISCORD_BOT_TOKEN, DISCORD_BOT_TOKEN_FILE or discord.token_file"
                    .into(),
            )
        })?;

    println!("🔐 rolecall v{}", env!("CARGO_PKG_VERSION"));
    println!("   Config: {}", config_path.display());
    println!("   Oracle: {} ({})", config.oracle.model, config.oracle.api_url);
    match config.discord.guild_id {
        Some(g) => println!("   Guild: {g}"),
        None => println!("   Guild: first guild the bot is in"),
    }
    println!(
        "   Sessions: {} turn(s), {}s inactivity timeout",
        config.verification.max_turns, config.verification.session_timeout_secs
    );
    if config.discord.notification_channel_id.is_none() {
        println!("   ⚠️  No notification channel; moderator summaries go to the log only");
    }
    println!();

    let oracle = build_oracle(&config)?;
    info!(model = oracle.model(), "oracle configured");

    BotRuntime::run_gateway(config, token, oracle).await
}
