use rolecall_core::{ChannelId, GuildId, RoleId};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration, maps to `rolecall.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RolecallConfig {
    pub discord: DiscordConfig,
    pub oracle: OracleConfig,
    pub verification: VerificationConfig,
    pub roles: RolesConfig,
    pub paths: PathsConfig,
    pub logging: LoggingConfig,
}

// ── Discord ────────────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscordConfig {
    /// Bot token. Prefer `token_file` or `DISCORD_BOT_TOKEN` over inlining it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    /// File containing the bot token (e.g. a mounted secret).
    pub token_file: Option<PathBuf>,
    /// Guild the bot manages. When unset, the first guild seen on READY is used.
    pub guild_id: Option<GuildId>,
    /// Members holding any of these roles may run `/admin` commands.
    pub admin_role_ids: Vec<RoleId>,
    /// Channel that receives moderator notifications.
    pub notification_channel_id: Option<ChannelId>,
    /// Channel that receives welcome messages for new members.
    pub welcome_channel_id: Option<ChannelId>,
}

// ── Oracle ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    /// Full chat-completions endpoint URL.
    pub api_url: String,
    /// Optional bearer token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub api_key_file: Option<PathBuf>,
    pub model: String,
    /// Per-request HTTP timeout.
    pub request_timeout_secs: u64,
    pub max_tokens: u32,
    /// Retries after the first attempt on transient failures.
    pub max_retries: u32,
    /// Base delay for exponential backoff (doubles each retry).
    pub retry_base_delay_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:8000/v1/chat/completions".into(),
            api_key: None,
            api_key_file: None,
            model: "gpt-4o-mini".into(),
            request_timeout_secs: 60,
            max_tokens: 1024,
            max_retries: 2,
            retry_base_delay_ms: 800,
        }
    }
}

// ── Verification ───────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Number of user turns per session; the last one is the final attempt.
    pub max_turns: u32,
    /// Inactivity timeout while waiting for the member's next DM.
    pub session_timeout_secs: u64,
    /// Transcript messages sent to the oracle per turn.
    pub max_history_messages: usize,
    /// Character budget of user text fed to the admin summary.
    pub summary_max_chars: usize,
    /// Retries per individual role change on transient Discord errors.
    pub role_apply_retries: u32,
    /// Re-run the role catalog classifier on startup even if a catalog file exists.
    pub rebuild_catalog_on_startup: bool,
    /// Pause between DMs when starting a batch of verifications.
    pub batch_delay_ms: u64,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            max_turns: 3,
            session_timeout_secs: 900,
            max_history_messages: 12,
            summary_max_chars: 1800,
            role_apply_retries: 2,
            rebuild_catalog_on_startup: false,
            batch_delay_ms: 1000,
        }
    }
}

// ── Status roles ───────────────────────────────────────────────

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RolesConfig {
    pub verified: Option<RoleId>,
    pub unverified: Option<RoleId>,
    pub in_progress: Option<RoleId>,
    /// Only roles positioned below this one are offered to the classifier.
    pub hierarchy_boundary: Option<RoleId>,
}

impl RolesConfig {
    /// Status roles are never part of the skill catalog.
    pub fn status_roles(&self) -> Vec<RoleId> {
        [self.verified, self.unverified, self.in_progress]
            .into_iter()
            .flatten()
            .collect()
    }
}

// ── Paths ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Persisted category → role-name document.
    pub categorized_roles: PathBuf,
    /// Prompt overrides. Unset entries use the built-in templates.
    pub verification_prompt: Option<PathBuf>,
    pub summary_prompt: Option<PathBuf>,
    pub categorization_prompt: Option<PathBuf>,
    pub welcome_prompt: Option<PathBuf>,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            categorized_roles: PathBuf::from("data/categorized_roles.json"),
            verification_prompt: None,
            summary_prompt: None,
            categorization_prompt: None,
            welcome_prompt: None,
        }
    }
}

// ── Logging ────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
    /// Output format: "pretty", "json", "compact".
    pub format: String,
    /// Log file path (None = stdout only).
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "pretty".into(),
            file: None,
        }
    }
}

// ── Validation ─────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub field: String,
    pub message: String,
    pub severity: WarningSeverity,
    pub hint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WarningSeverity {
    Error,
    Warning,
    Info,
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let icon = match self.severity {
            WarningSeverity::Error => "❌",
            WarningSeverity::Warning => "⚠️ ",
            WarningSeverity::Info => "💡",
        };
        write!(f, "{} {}: {}", icon, self.field, self.message)?;
        if let Some(ref h) = self.hint {
            write!(f, "\n   ↳ {}", h)?;
        }
        Ok(())
    }
}

/// Upper bound for `oracle.max_retries` and `verification.role_apply_retries`.
/// Retries back off exponentially, so larger values only mean hours of waiting.
pub const MAX_RETRIES: u32 = 10;

impl RolecallConfig {
    /// Validate the config and return a list of warnings/errors.
    /// Returns `Err` with all messages joined if any severity is Error.
    pub fn validate(&self) -> Result<Vec<ConfigWarning>, String> {
        let mut warnings = Vec::new();

        // ── Discord token ───
        if self.discord.token.as_deref().is_none_or(str::is_empty) {
            warnings.push(ConfigWarning {
                field: "discord.token".into(),
                message: "no bot token configured — `rolecall start` will refuse to run".into(),
                severity: WarningSeverity::Warning,
                hint: Some("Set DISCORD_BOT_TOKEN, DISCORD_BOT_TOKEN_FILE, or discord.token_file".into()),
            });
        }

        // ── Notification channel ───
        if self.discord.notification_channel_id.is_none() {
            warnings.push(ConfigWarning {
                field: "discord.notification_channel_id".into(),
                message: "no moderator channel — summaries and role failures will only be logged".into(),
                severity: WarningSeverity::Info,
                hint: None,
            });
        }

        if self.discord.admin_role_ids.is_empty() {
            warnings.push(ConfigWarning {
                field: "discord.admin_role_ids".into(),
                message: "no admin roles — /admin commands will be rejected for everyone".into(),
                severity: WarningSeverity::Warning,
                hint: Some("List moderator role IDs, e.g. admin_role_ids = [\"123\"]".into()),
            });
        }

        // ── Oracle endpoint ───
        if self.oracle.api_url.trim().is_empty() {
            warnings.push(ConfigWarning {
                field: "oracle.api_url".into(),
                message: "api_url is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set LLM_API_URL or oracle.api_url to a chat-completions endpoint".into()),
            });
        } else if !self.oracle.api_url.starts_with("http://")
            && !self.oracle.api_url.starts_with("https://")
        {
            warnings.push(ConfigWarning {
                field: "oracle.api_url".into(),
                message: format!("'{}' is not an http(s) URL", self.oracle.api_url),
                severity: WarningSeverity::Error,
                hint: None,
            });
        }

        if self.oracle.model.trim().is_empty() {
            warnings.push(ConfigWarning {
                field: "oracle.model".into(),
                message: "model is empty".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set LLM_MODEL_NAME or oracle.model".into()),
            });
        }

        if self.oracle.max_tokens == 0 {
            warnings.push(ConfigWarning {
                field: "oracle.max_tokens".into(),
                message: "max_tokens is 0 — the oracle won't produce output".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 1024".into()),
            });
        }

        if self.oracle.request_timeout_secs == 0 {
            warnings.push(ConfigWarning {
                field: "oracle.request_timeout_secs".into(),
                message: "timeout is 0".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 60".into()),
            });
        }

        for (field, retries) in [
            ("oracle.max_retries", self.oracle.max_retries),
            ("verification.role_apply_retries", self.verification.role_apply_retries),
        ] {
            if retries > MAX_RETRIES {
                warnings.push(ConfigWarning {
                    field: field.into(),
                    message: format!("{retries} retries is more than the maximum of {MAX_RETRIES}"),
                    severity: WarningSeverity::Error,
                    hint: Some("Set to e.g. 2".into()),
                });
            }
        }

        // ── Verification tunables ───
        if self.verification.max_turns == 0 {
            warnings.push(ConfigWarning {
                field: "verification.max_turns".into(),
                message: "max_turns is 0 — no session could ever answer".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 3".into()),
            });
        } else if self.verification.max_turns == 1 {
            warnings.push(ConfigWarning {
                field: "verification.max_turns".into(),
                message: "max_turns is 1 — every first reply is forced final with no confirmation".into(),
                severity: WarningSeverity::Warning,
                hint: None,
            });
        }

        if self.verification.max_history_messages < 2 {
            warnings.push(ConfigWarning {
                field: "verification.max_history_messages".into(),
                message: "history window below 2 drops the conversation context".into(),
                severity: WarningSeverity::Error,
                hint: Some("Set to e.g. 12".into()),
            });
        }

        if self.verification.session_timeout_secs < 60 {
            warnings.push(ConfigWarning {
                field: "verification.session_timeout_secs".into(),
                message: format!(
                    "{}s leaves members very little time to reply",
                    self.verification.session_timeout_secs
                ),
                severity: WarningSeverity::Warning,
                hint: Some("The default is 900 (15 minutes)".into()),
            });
        }

        // ── Status roles ───
        for (field, role) in [
            ("roles.verified", self.roles.verified),
            ("roles.unverified", self.roles.unverified),
            ("roles.in_progress", self.roles.in_progress),
        ] {
            if role.is_none() {
                warnings.push(ConfigWarning {
                    field: field.into(),
                    message: "status role not configured".into(),
                    severity: WarningSeverity::Warning,
                    hint: None,
                });
            }
        }

        // ── Logging ───
        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.as_str()) {
            warnings.push(ConfigWarning {
                field: "logging.format".into(),
                message: format!("unknown format '{}'", self.logging.format),
                severity: WarningSeverity::Error,
                hint: Some(format!("Valid values: {}", valid_formats.join(", "))),
            });
        }

        let errors: Vec<String> = warnings
            .iter()
            .filter(|w| w.severity == WarningSeverity::Error)
            .map(|w| format!("{}: {}", w.field, w.message))
            .collect();

        if !errors.is_empty() {
            return Err(format!("Configuration errors:\n  • {}", errors.join("\n  • ")));
        }

        Ok(warnings)
    }
}
