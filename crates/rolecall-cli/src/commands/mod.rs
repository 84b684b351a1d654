use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use rolecall_config::{ConfigLoader, RolecallConfig, WarningSeverity};
use rolecall_core::{Result, RolecallError};
use rolecall_llm::openai::OpenAiProvider;
use rolecall_llm::{OracleClient, RetryPolicy};
use rolecall_verify::{CatalogStore, Prompts};

mod start;

const REDACTED: &str = "***";

/// rolecall: LLM-guided member verification for Discord
#[derive(Parser)]
#[command(name = "rolecall", version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to rolecall.toml config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level override (e.g. debug, info, warn, error)
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Enable verbose output (debug logging)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all log output (errors only)
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Discord and run the verification bot
    Start,
    /// Show the effective configuration (secrets redacted)
    Config {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check configuration, prompt files, the role catalog and the oracle
    Doctor {
        /// Skip the live oracle health check
        #[arg(long)]
        offline: bool,
    },
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        // Load config first so we can use it for log format
        let config_loader = ConfigLoader::load(self.config.as_deref())?;
        let config = config_loader.get();

        // --verbose > --quiet > --log-level > config
        let log_level = if self.verbose {
            "debug"
        } else if self.quiet {
            "error"
        } else {
            self.log_level.as_deref().unwrap_or(&config.logging.level)
        };
        init_tracing(&config, log_level)?;

        match self.command {
            Commands::Start => start::cmd_start(config, config_loader.path()).await,
            Commands::Config { json } => Self::cmd_config(config, json),
            Commands::Doctor { offline } => Self::cmd_doctor(config, offline).await,
        }
    }

    fn cmd_config(config: RolecallConfig, json: bool) -> Result<()> {
        let config = redact(config);
        if json {
            println!("{}", serde_json::to_string_pretty(&config)?);
        } else {
            println!(
                "{}",
                toml::to_string_pretty(&config).map_err(|e| RolecallError::Config(e.to_string()))?
            );
        }
        Ok(())
    }

    async fn cmd_doctor(config: RolecallConfig, offline: bool) -> Result<()> {
        println!("🩺 rolecall doctor");
        println!();

        let warnings = match config.validate() {
            Ok(w) => w,
            Err(e) => {
                println!("{e}");
                return Ok(());
            }
        };

        let mut warn_count = 0;
        let mut info_count = 0;
        for w in &warnings {
            println!("  {w}");
            match w.severity {
                WarningSeverity::Warning => warn_count += 1,
                WarningSeverity::Info => info_count += 1,
                WarningSeverity::Error => {}
            }
        }

        let mut ok = 0;
        let mut failed = 0;

        match Prompts::load(&config.paths) {
            Ok(_) => ok += 1,
            Err(e) => {
                println!("  ❌ paths: {e}");
                failed += 1;
            }
        }

        let store = CatalogStore::new(config.paths.categorized_roles.clone());
        match store.load() {
            Ok(Some(doc)) => {
                println!(
                    "  ✅ role catalog: {} role(s) in {}",
                    doc.total(),
                    store.path().display()
                );
                ok += 1;
            }
            Ok(None) => {
                println!(
                    "  💡 role catalog: {} not found — roles will be classified on first start",
                    store.path().display()
                );
                info_count += 1;
            }
            Err(e) => {
                println!("  ❌ role catalog: {e}");
                failed += 1;
            }
        }

        if !offline {
            let oracle = build_oracle(&config)?;
            match oracle.health_check().await {
                Ok(()) => {
                    println!("  ✅ oracle: {} reachable ({})", config.oracle.api_url, oracle.model());
                    ok += 1;
                }
                Err(e) => {
                    println!("  ❌ oracle: {e}");
                    failed += 1;
                }
            }
        }

        println!();
        println!(
            "  ✅ {ok} checks passed, ❌ {failed} failed, ⚠️  {warn_count} warnings, 💡 {info_count} suggestions"
        );
        Ok(())
    }
}

/// OpenAI-compatible provider wrapped with the configured retry policy.
pub(crate) fn build_oracle(config: &RolecallConfig) -> Result<OracleClient> {
    let oracle = &config.oracle;
    let provider = OpenAiProvider::new(
        oracle.api_url.clone(),
        oracle.api_key.clone(),
        Duration::from_secs(oracle.request_timeout_secs),
    )?;
    Ok(
        OracleClient::new(Arc::new(provider), oracle.model.clone(), oracle.max_tokens).with_retry(
            RetryPolicy {
                max_retries: oracle.max_retries,
                base_delay: Duration::from_millis(oracle.retry_base_delay_ms),
            },
        ),
    )
}

/// RUST_LOG wins over `level`; output goes to stdout or the configured file.
fn init_tracing(config: &RolecallConfig, level: &str) -> Result<()> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    let (writer, ansi) = match config.logging.file {
        Some(ref path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            (BoxMakeWriter::new(Mutex::new(file)), false)
        }
        None => (BoxMakeWriter::new(std::io::stdout), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi);
    match config.logging.format.as_str() {
        "json" => builder.json().with_target(true).init(),
        "compact" => builder.compact().with_target(false).init(),
        _ => builder.with_target(false).init(),
    }
    Ok(())
}

fn redact(mut config: RolecallConfig) -> RolecallConfig {
    if config.discord.token.is_some() {
        config.discord.token = Some(REDACTED.into());
    }
    if config.oracle.api_key.is_some() {
        config.oracle.api_key = Some(REDACTED.into());
    }
    config
}
