use std::path::{Path, PathBuf};
use tracing::{info, warn};

use rolecall_core::{Result, RolecallError};

use crate::schema::RolecallConfig;

/// Loads the rolecall configuration once at process start.
pub struct ConfigLoader {
    config: RolecallConfig,
    config_path: PathBuf,
}

impl ConfigLoader {
    /// Resolve the config path:
    /// explicit path > ROLECALL_CONFIG env > ./rolecall.toml > <config dir>/rolecall/rolecall.toml
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        if let Ok(p) = std::env::var("ROLECALL_CONFIG") {
            return PathBuf::from(p);
        }
        let local = PathBuf::from("rolecall.toml");
        if local.exists() {
            return local;
        }
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("rolecall")
            .join("rolecall.toml")
    }

    /// Load the config from disk, falling back to defaults, then apply the
    /// process environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// Same as [`ConfigLoader::load`] with an explicit environment lookup.
    pub fn load_with_env<F>(path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config_path = Self::resolve_path(path);
        let config = if config_path.exists() {
            info!(?config_path, "loading configuration");
            let raw = std::fs::read_to_string(&config_path)?;
            toml::from_str::<RolecallConfig>(&raw).map_err(|e| {
                RolecallError::Config(format!(
                    "failed to parse {}: {}",
                    config_path.display(),
                    e
                ))
            })?
        } else if path.is_some() {
            return Err(RolecallError::Config(format!(
                "config file not found: {}",
                config_path.display()
            )));
        } else {
            warn!(?config_path, "config file not found, using defaults");
            RolecallConfig::default()
        };

        let config = Self::apply_env_overrides(config, &env);
        let config = Self::resolve_secret_files(config)?;

        // Validate config: log warnings, fail on errors
        match config.validate() {
            Ok(warnings) => {
                for w in &warnings {
                    warn!("{}", w);
                }
            }
            Err(e) => {
                return Err(RolecallError::Config(e));
            }
        }

        Ok(Self {
            config,
            config_path,
        })
    }

    /// Get a copy of the loaded config.
    pub fn get(&self) -> RolecallConfig {
        self.config.clone()
    }

    /// Path the config was resolved from (may not exist).
    pub fn path(&self) -> &Path {
        &self.config_path
    }

    /// Env vars override model, endpoint and log level; secrets only fill in
    /// when the config file doesn't set them.
    pub fn apply_env_overrides<F>(mut config: RolecallConfig, env: &F) -> RolecallConfig
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = env("LLM_API_URL") {
            config.oracle.api_url = v;
        }
        if let Some(v) = env("LLM_MODEL_NAME") {
            config.oracle.model = v;
        }
        if let Some(v) = env("ROLECALL_LOG_LEVEL") {
            config.logging.level = v;
        }
        if config.discord.token.is_none() {
            if let Some(v) = env("DISCORD_BOT_TOKEN") {
                config.discord.token = Some(v);
            } else if config.discord.token_file.is_none()
                && let Some(v) = env("DISCORD_BOT_TOKEN_FILE")
            {
                config.discord.token_file = Some(PathBuf::from(v));
            }
        }
        if config.oracle.api_key.is_none() {
            if let Some(v) = env("LLM_API_TOKEN") {
                config.oracle.api_key = Some(v);
            } else if config.oracle.api_key_file.is_none()
                && let Some(v) = env("LLM_API_TOKEN_FILE")
            {
                config.oracle.api_key_file = Some(PathBuf::from(v));
            }
        }
        config
    }

    /// Read `*_file` secrets for values not already set inline.
    fn resolve_secret_files(mut config: RolecallConfig) -> Result<RolecallConfig> {
        if config.discord.token.is_none()
            && let Some(ref path) = config.discord.token_file
        {
            config.discord.token = Some(read_secret(path, "discord.token_file")?);
        }
        if config.oracle.api_key.is_none()
            && let Some(ref path) = config.oracle.api_key_file
        {
            config.oracle.api_key = Some(read_secret(path, "oracle.api_key_file")?);
        }
        Ok(config)
    }
}

fn read_secret(path: &Path, field: &str) -> Result<String> {
    let raw = std::fs::read_to_string(path).map_err(|e| RolecallError::ConfigValidation {
        field: field.into(),
        reason: format!("cannot read {}: {}", path.display(), e),
    })?;
    let secret = raw.trim().to_string();
    if secret.is_empty() {
        return Err(RolecallError::ConfigValidation {
            field: field.into(),
            reason: format!("{} is empty", path.display()),
        });
    }
    Ok(secret)
}
