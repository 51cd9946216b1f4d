//! Shared configuration for the novel bot.
//!
//! Provides functions to locate the bot's state directory and the
//! environment-driven [`BotConfig`].
//!
//! # Storage Structure
//!
//! All application data is stored under `~/.novel-bot/`:
//!
//! ```text
//! ~/.novel-bot/
//! ├── config/       # .env.local with secrets
//! ├── cache/
//! │   └── images/   # Downloaded scene images
//! └── state/        # sessions.json, assistant_id
//! ```
//!
//! # Environment Variables
//!
//! - `NOVEL_STATE_DIR`: Override the base state directory
//! - `BOT_TOKEN`, `BOT_OPENAI_API_KEY` (required)
//! - `BOT_ASSISTANT_ID`, `BOT_PROVIDER_TOKEN`, `BOT_OWNERS`,
//!   `BOT_RESTART_COST`, `BOT_RUN_TIMEOUT_SECS`, `BOT_POLL_INTERVAL_MS`,
//!   `BOT_SCENARIO_PATH`, `BOT_OPENAI_BASE_URL`, `BOT_ASSISTANT_MODEL`

use std::fmt;
use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

use thiserror::Error;

/// Environment variable for custom state directory.
pub const STATE_DIR_ENV: &str = "NOVEL_STATE_DIR";

/// Default state directory name under home.
const DEFAULT_STATE_DIR: &str = ".novel-bot";

const CONFIG_SUBDIR: &str = "config";
const CACHE_SUBDIR: &str = "cache";
const STATE_SUBDIR: &str = "state";

/// Default OpenAI API root.
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// Model used when the assistant has to be created on first start.
pub const DEFAULT_ASSISTANT_MODEL: &str = "gpt-4-turbo-preview";

/// Stars charged for unlocking a new playthrough.
pub const DEFAULT_RESTART_COST: u32 = 10;

const DEFAULT_RUN_TIMEOUT_SECS: u64 = 90;
const MIN_RUN_TIMEOUT_SECS: u64 = 30;
const MAX_RUN_TIMEOUT_SECS: u64 = 180;

const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;
const MIN_POLL_INTERVAL_MS: u64 = 250;

static STATE_DIR_CACHE: OnceLock<PathBuf> = OnceLock::new();

/// Get the bot state directory.
///
/// The state directory is determined by:
/// 1. `NOVEL_STATE_DIR` environment variable if set
/// 2. `~/.novel-bot` if home directory is available
/// 3. `.novel-bot` in current directory as fallback
pub fn state_dir() -> PathBuf {
    STATE_DIR_CACHE
        .get_or_init(|| {
            std::env::var(STATE_DIR_ENV)
                .map(PathBuf::from)
                .unwrap_or_else(|_| {
                    dirs::home_dir()
                        .map(|h| h.join(DEFAULT_STATE_DIR))
                        .unwrap_or_else(|| PathBuf::from(DEFAULT_STATE_DIR))
                })
        })
        .clone()
}

/// Get the user config directory.
pub fn config_dir() -> PathBuf {
    state_dir().join(CONFIG_SUBDIR)
}

/// Get the cache directory.
pub fn cache_dir() -> PathBuf {
    state_dir().join(CACHE_SUBDIR)
}

/// Get the downloaded image cache directory.
pub fn image_cache_dir() -> PathBuf {
    cache_dir().join("images")
}

/// Get the runtime state directory.
pub fn runtime_state_dir() -> PathBuf {
    state_dir().join(STATE_SUBDIR)
}

/// Get the session store directory.
///
/// Holds one file per user with their session, messages and payment records.
pub fn sessions_dir() -> PathBuf {
    runtime_state_dir().join("sessions")
}

/// Get the file remembering the id of an assistant created on first start.
pub fn assistant_id_file() -> PathBuf {
    runtime_state_dir().join("assistant_id")
}

/// Get the .env.local file path.
///
/// Environment file for secrets (API keys, tokens).
pub fn env_file() -> PathBuf {
    config_dir().join(".env.local")
}

/// Ensure the state directory and all subdirectories exist.
///
/// # Errors
/// Returns an error if any directory cannot be created.
pub fn ensure_all_dirs() -> std::io::Result<()> {
    std::fs::create_dir_all(config_dir())?;
    std::fs::create_dir_all(image_cache_dir())?;
    std::fs::create_dir_all(runtime_state_dir())?;
    Ok(())
}

/// Errors raised while reading [`BotConfig`].
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A required variable is not set.
    #[error("{0} not set")]
    Missing(&'static str),

    /// A variable is set but cannot be parsed.
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Bot configuration, read once at startup and passed down explicitly.
#[derive(Clone)]
pub struct BotConfig {
    /// Telegram bot token.
    pub token: String,
    /// OpenAI API key.
    pub openai_api_key: String,
    /// Assistant to run threads against. Created on first start if absent.
    pub assistant_id: Option<String>,
    /// Payment provider token. Empty for Telegram Stars.
    pub provider_token: String,
    /// Telegram user ids of the bot owners.
    pub owners: Vec<i64>,
    /// Stars charged for a restart.
    pub restart_cost: u32,
    /// Wall-clock bound for one assistant run.
    pub run_timeout: Duration,
    /// Delay between run status checks.
    pub poll_interval: Duration,
    /// Scenario used as assistant instructions on first start.
    pub scenario_path: PathBuf,
    /// OpenAI API root.
    pub openai_base_url: String,
    /// Model for a freshly created assistant.
    pub assistant_model: String,
}

impl fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"<redacted>")
            .field("openai_api_key", &"<redacted>")
            .field("assistant_id", &self.assistant_id)
            .field("owners", &self.owners)
            .field("restart_cost", &self.restart_cost)
            .field("run_timeout", &self.run_timeout)
            .field("poll_interval", &self.poll_interval)
            .field("scenario_path", &self.scenario_path)
            .field("openai_base_url", &self.openai_base_url)
            .field("assistant_model", &self.assistant_model)
            .finish()
    }
}

impl BotConfig {
    /// Read the configuration from process environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let token = get("BOT_TOKEN").ok_or(ConfigError::Missing("BOT_TOKEN"))?;
        let openai_api_key =
            get("BOT_OPENAI_API_KEY").ok_or(ConfigError::Missing("BOT_OPENAI_API_KEY"))?;

        let owners = match get("BOT_OWNERS") {
            Some(raw) => parse_owners(&raw)?,
            None => Vec::new(),
        };

        let restart_cost = parse_number("BOT_RESTART_COST", get("BOT_RESTART_COST"))?
            .map(|v| v as u32)
            .unwrap_or(DEFAULT_RESTART_COST);

        let run_timeout_secs = parse_number("BOT_RUN_TIMEOUT_SECS", get("BOT_RUN_TIMEOUT_SECS"))?
            .unwrap_or(DEFAULT_RUN_TIMEOUT_SECS)
            .clamp(MIN_RUN_TIMEOUT_SECS, MAX_RUN_TIMEOUT_SECS);

        let poll_interval_ms = parse_number("BOT_POLL_INTERVAL_MS", get("BOT_POLL_INTERVAL_MS"))?
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS)
            .max(MIN_POLL_INTERVAL_MS);

        Ok(Self {
            token,
            openai_api_key,
            assistant_id: get("BOT_ASSISTANT_ID"),
            provider_token: get("BOT_PROVIDER_TOKEN").unwrap_or_default(),
            owners,
            restart_cost,
            run_timeout: Duration::from_secs(run_timeout_secs),
            poll_interval: Duration::from_millis(poll_interval_ms),
            scenario_path: get("BOT_SCENARIO_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("scenario.txt")),
            openai_base_url: get("BOT_OPENAI_BASE_URL")
                .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
            assistant_model: get("BOT_ASSISTANT_MODEL")
                .unwrap_or_else(|| DEFAULT_ASSISTANT_MODEL.to_string()),
        })
    }

    /// Returns true if the user is one of the configured owners.
    pub fn is_owner(&self, user_id: i64) -> bool {
        self.owners.contains(&user_id)
    }
}

/// Parse `[1, 2]` or `1,2` into a list of user ids.
fn parse_owners(raw: &str) -> Result<Vec<i64>, ConfigError> {
    raw.trim_matches(|c| c == '[' || c == ']')
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|e| ConfigError::Invalid {
                key: "BOT_OWNERS",
                value: raw.to_string(),
                reason: e.to_string(),
            })
        })
        .collect()
}

fn parse_number(key: &'static str, value: Option<String>) -> Result<Option<u64>, ConfigError> {
    value
        .map(|v| {
            v.parse::<u64>().map_err(|e| ConfigError::Invalid {
                key,
                value: v.clone(),
                reason: e.to_string(),
            })
        })
        .transpose()
}
