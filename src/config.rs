use chrono_tz::Tz;
use regex::Regex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the env file.
    #[error("failed to read env file '{}': {source}", path.display())]
    ReadFile { path: PathBuf, source: dotenvy::Error },
    /// A required key is absent or empty.
    #[error("{0} is required")]
    Missing(&'static str),
    /// A key is present but its value is unusable.
    #[error("{key} is invalid: {reason}")]
    Invalid { key: &'static str, reason: String },
    /// A block pattern failed to compile.
    #[error("invalid block pattern '{pattern}': {source}")]
    InvalidRegex { pattern: String, source: regex::Error },
}

const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";
const DEFAULT_CHAT_MODEL: &str = "llama-3.1-8b-instant";
const DEFAULT_JSON_MODEL: &str = "llama-3.3-70b-versatile";
const DEFAULT_TIMEZONE: &str = "Asia/Tashkent";
const DEFAULT_HISTORY_LIMIT: usize = 10;
const MAX_HISTORY_LIMIT: usize = 50;

pub struct Config {
    pub bot_token: String,
    /// The account the bot answers on behalf of. Never auto-replied to.
    pub owner_id: i64,
    /// Operator supergroup receiving mirrored conversations and logs.
    pub log_chat_id: i64,
    pub groq_api_key: String,
    pub groq_base_url: String,
    pub chat_model: String,
    pub json_model: String,
    pub db_path: PathBuf,
    /// Directory for state files (logs).
    pub data_dir: PathBuf,
    pub timezone: Tz,
    /// How many prior turns feed the reply prompt.
    pub history_limit: usize,
    pub owner_name: String,
    /// Appended to outgoing auto-replies; never stored in history.
    pub reply_signature: Option<String>,
    /// Extra patterns on top of the fixed injection denylist.
    pub block_patterns: Vec<Regex>,
    pub groq_key_start_date: Option<String>,
}

impl Config {
    /// Load from an env file (if it exists) with the process environment on top.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let mut vars: HashMap<String, String> = HashMap::new();

        if path.exists() {
            let iter = dotenvy::from_path_iter(path)
                .map_err(|e| ConfigError::ReadFile { path: path.to_path_buf(), source: e })?;
            for item in iter {
                let (key, value) =
                    item.map_err(|e| ConfigError::ReadFile { path: path.to_path_buf(), source: e })?;
                vars.insert(key, value);
            }
        }
        vars.extend(std::env::vars());

        Self::from_vars(vars)
    }

    /// Build and validate from raw key/value pairs.
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let vars: HashMap<String, String> = vars
            .into_iter()
            .map(|(k, v)| (k, v.trim().to_string()))
            .filter(|(_, v)| !v.is_empty())
            .collect();
        let get = |key: &str| vars.get(key).cloned();

        let bot_token = get("BOT_TOKEN").ok_or(ConfigError::Missing("BOT_TOKEN"))?;
        // Telegram tokens are formatted as {bot_id}:{secret} where bot_id is numeric
        match bot_token.split_once(':') {
            Some((id, secret)) if id.parse::<u64>().is_ok() && !secret.is_empty() && !secret.contains(':') => {}
            _ => {
                return Err(ConfigError::Invalid {
                    key: "BOT_TOKEN",
                    reason: "expected format 123456789:ABCdefGHI...".into(),
                });
            }
        }

        let owner_id = parse_int(get("OWNER_ID"), "OWNER_ID")?;
        if owner_id <= 0 {
            return Err(ConfigError::Invalid { key: "OWNER_ID", reason: "must be a positive integer".into() });
        }

        let log_chat_id = parse_int(get("LOG_CHAT_ID"), "LOG_CHAT_ID")?;
        if log_chat_id >= 0 {
            return Err(ConfigError::Invalid {
                key: "LOG_CHAT_ID",
                reason: "must be a negative integer (supergroup id)".into(),
            });
        }

        let groq_api_key = get("GROQ_API_KEY").ok_or(ConfigError::Missing("GROQ_API_KEY"))?;

        let timezone_name = get("TIMEZONE").unwrap_or_else(|| DEFAULT_TIMEZONE.to_string());
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|e| ConfigError::Invalid { key: "TIMEZONE", reason: format!("{e}") })?;

        let history_limit = match get("HISTORY_LIMIT") {
            Some(raw) => raw
                .parse::<usize>()
                .ok()
                .filter(|n| (1..=MAX_HISTORY_LIMIT).contains(n))
                .ok_or_else(|| ConfigError::Invalid {
                    key: "HISTORY_LIMIT",
                    reason: format!("expected 1..={MAX_HISTORY_LIMIT}, got '{raw}'"),
                })?,
            None => DEFAULT_HISTORY_LIMIT,
        };

        let block_patterns = get("BLOCK_PATTERNS")
            .map(|raw| {
                raw.split(";;")
                    .map(str::trim)
                    .filter(|p| !p.is_empty())
                    .map(|p| {
                        Regex::new(p).map_err(|e| ConfigError::InvalidRegex { pattern: p.to_string(), source: e })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .transpose()?
            .unwrap_or_default();

        // Blank values were dropped above, so "none" is the off switch.
        let reply_signature = match get("REPLY_SIGNATURE") {
            Some(s) if s.eq_ignore_ascii_case("none") => None,
            Some(s) => Some(s),
            None => Some("— auto-reply bot".to_string()),
        };

        Ok(Self {
            bot_token,
            owner_id,
            log_chat_id,
            groq_api_key,
            groq_base_url: get("GROQ_BASE_URL").unwrap_or_else(|| DEFAULT_GROQ_BASE_URL.to_string()),
            chat_model: get("GROQ_MODEL").unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string()),
            json_model: get("GROQ_JSON_MODEL").unwrap_or_else(|| DEFAULT_JSON_MODEL.to_string()),
            db_path: get("DB_PATH").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("./bot.db")),
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or_else(|| PathBuf::from(".")),
            timezone,
            history_limit,
            owner_name: get("OWNER_NAME").unwrap_or_else(|| "the owner".to_string()),
            reply_signature,
            block_patterns,
            // Checked by the key monitor once logging is up; a bad value never blocks startup.
            groq_key_start_date: get("GROQ_KEY_START_DATE"),
        })
    }

    pub fn is_owner(&self, user_id: i64) -> bool {
        self.owner_id == user_id
    }
}

fn parse_int(raw: Option<String>, key: &'static str) -> Result<i64, ConfigError> {
    let raw = raw.ok_or(ConfigError::Missing(key))?;
    raw.parse::<i64>()
        .map_err(|_| ConfigError::Invalid { key, reason: format!("'{raw}' is not an integer") })
}
