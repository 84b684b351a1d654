use thiserror::Error;

/// Unified error type for the whole bot.
#[derive(Error, Debug)]
pub enum RolecallError {
    // ── Oracle errors ──────────────────────────────────────────
    #[error("oracle unavailable: {0}")]
    OracleUnavailable(String),

    #[error("oracle rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("malformed oracle reply: {0}")]
    MalformedOracleReply(String),

    #[error("role classification could not be parsed: {0}")]
    ClassificationParse(String),

    // ── Discord errors ─────────────────────────────────────────
    #[error("discord error: {0}")]
    Discord(String),

    #[error("discord api {status}: {body}")]
    DiscordApi { status: u16, body: String },

    #[error("discord gateway not connected")]
    GatewayNotConnected,

    #[error("failed to apply role {role_id}: {reason}")]
    RoleApply { role_id: u64, reason: String },

    // ── Verification errors ────────────────────────────────────
    #[error("a verification session is already active for user {0}")]
    SessionActive(u64),

    #[error("prompt error: {0}")]
    Prompt(String),

    #[error("storage error: {0}")]
    Storage(String),

    // ── Config errors ──────────────────────────────────────────
    #[error("config error: {0}")]
    Config(String),

    #[error("config validation failed: {field}: {reason}")]
    ConfigValidation { field: String, reason: String },

    // ── Generic wrappers ───────────────────────────────────────
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl RolecallError {
    /// Whether a Discord-side failure is worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            RolecallError::RateLimited { .. } => true,
            RolecallError::DiscordApi { status, .. } => *status == 429 || *status >= 500,
            RolecallError::Discord(msg) => {
                msg.contains("timed out") || msg.contains("connection reset")
            }
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, RolecallError>;
