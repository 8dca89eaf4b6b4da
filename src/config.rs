//! Settings file parser (default `settings.toml`).
//!
//! The file is read once at startup into raw serde structs, then validated
//! into [`AppSettings`]. Every problem is reported as a [`ConfigError`] before
//! any feed is touched. Unknown top-level keys are accepted but logged, since
//! they are usually typos.
use secrecy::SecretString;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::render::{TemplateSettings, DEFAULT_BLUESKY_TEMPLATE, DEFAULT_MASTODON_TEMPLATE};
use crate::util::validate_http_url;

pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64; rv:132.0) Gecko/20100101 Firefox/132.0";
const DEFAULT_DATABASE_FILE: &str = "dbfiles/feed_info.sqlite3";
const DEFAULT_CLEAN_DAYS: u32 = 90;
const MAX_CLEAN_DAYS: u32 = 36_500;
const DEFAULT_RECENT_DAYS: u32 = 5;
const DEFAULT_MAX_EPISODES: usize = 20;
const DEFAULT_BLUESKY_API_URL: &str = "https://bsky.social";
const DEFAULT_BLUESKY_DESCRIPTION_LENGTH: usize = 150;
const DEFAULT_MASTODON_DESCRIPTION_LENGTH: usize = 250;

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read settings file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in settings file: {0}")]
    Parse(#[from] toml::de::Error),

    /// Settings file exceeds maximum allowed size.
    #[error("Settings file too large: {0}")]
    TooLarge(String),

    /// A value is missing, blank or malformed.
    #[error("Invalid settings: {0}")]
    Invalid(String),

    #[error("Failed to read Mastodon secrets file {path}: {source}")]
    SecretsFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

// ============================================================================
// Validated Settings
// ============================================================================

/// Top-level application settings.
#[derive(Debug)]
pub struct AppSettings {
    pub database_file: PathBuf,
    /// Seen-episode entries older than this many days are purged after a run
    pub database_clean_days: u32,
    /// Optional log file, appended to alongside console output
    pub log_file: Option<PathBuf>,
    pub user_agent: String,
    pub feeds: Vec<FeedSettings>,
}

/// One podcast feed and where to announce it.
#[derive(Debug)]
pub struct FeedSettings {
    /// Display name used in announcements
    pub name: String,
    /// Stable key for the feed in the state store
    pub short_name: String,
    pub feed_url: String,
    pub enabled: bool,
    /// Episodes published more than this many days ago are ignored
    pub recent_days: u32,
    /// How many of the newest feed entries to consider
    pub max_episodes: usize,
    /// Case-insensitive substring an episode identifier must contain; empty
    /// matches everything
    pub guid_filter: String,
    pub bluesky: Option<BlueskySettings>,
    pub mastodon: Option<MastodonSettings>,
}

impl FeedSettings {
    /// A feed with default limits and no destinations.
    pub fn new(name: &str, short_name: &str, feed_url: &str) -> Self {
        Self {
            name: name.to_string(),
            short_name: short_name.to_string(),
            feed_url: feed_url.to_string(),
            enabled: true,
            recent_days: DEFAULT_RECENT_DAYS,
            max_episodes: DEFAULT_MAX_EPISODES,
            guid_filter: String::new(),
            bluesky: None,
            mastodon: None,
        }
    }
}

#[derive(Debug)]
pub struct BlueskySettings {
    pub username: String,
    pub app_password: SecretString,
    pub api_url: String,
    /// Where the renewable session is kept between runs
    pub session_file: Option<PathBuf>,
    pub template: TemplateSettings,
    pub enabled: bool,
}

#[derive(Debug)]
pub struct MastodonSettings {
    pub api_url: String,
    pub use_oauth: bool,
    pub secrets_file: Option<PathBuf>,
    /// Resolved at load time, from `access_token` or the secrets file
    pub access_token: SecretString,
    pub template: TemplateSettings,
    pub enabled: bool,
}

// ============================================================================
// Raw File Layout
// ============================================================================

#[derive(Deserialize)]
struct RawSettings {
    database_file: Option<String>,
    database_clean_days: Option<u32>,
    log_file: Option<String>,
    user_agent: Option<String>,
    #[serde(default)]
    feeds: Vec<RawFeed>,
}

#[derive(Deserialize)]
struct RawFeed {
    name: Option<String>,
    short_name: Option<String>,
    feed_url: Option<String>,
    enabled: Option<bool>,
    recent_days: Option<u32>,
    max_episodes: Option<usize>,
    guid_filter: Option<String>,
    bluesky: Option<RawBluesky>,
    mastodon: Option<RawMastodon>,
}

#[derive(Deserialize)]
struct RawBluesky {
    username: Option<String>,
    app_password: Option<String>,
    api_url: Option<String>,
    session_file: Option<String>,
    template_file: Option<String>,
    max_description_length: Option<usize>,
    enabled: Option<bool>,
}

#[derive(Deserialize)]
struct RawMastodon {
    api_url: Option<String>,
    use_oauth: Option<bool>,
    secrets_file: Option<String>,
    access_token: Option<String>,
    template_file: Option<String>,
    max_description_length: Option<usize>,
    enabled: Option<bool>,
}

const KNOWN_KEYS: [&str; 5] = [
    "database_file",
    "database_clean_days",
    "log_file",
    "user_agent",
    "feeds",
];

impl AppSettings {
    /// Maximum settings file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    /// Load and validate settings from a TOML file.
    ///
    /// Unlike an optional preferences file, a missing settings file is an
    /// error: there is nothing to do without feeds.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let meta = std::fs::metadata(path)?;
        if meta.len() > Self::MAX_FILE_SIZE {
            return Err(ConfigError::TooLarge(format!(
                "Settings file is {} bytes (max {} bytes)",
                meta.len(),
                Self::MAX_FILE_SIZE
            )));
        }

        let content = std::fs::read_to_string(path)?;
        let settings = Self::parse(&content)?;
        tracing::debug!(
            path = %path.display(),
            feeds = settings.feeds.len(),
            "Loaded settings"
        );
        Ok(settings)
    }

    /// Parse and validate settings from TOML text.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        // Parse as a raw table first to spot likely typos
        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in settings file, ignoring");
                }
            }
        }

        let raw: RawSettings = toml::from_str(content)?;
        Self::validate(raw)
    }

    fn validate(raw: RawSettings) -> Result<Self, ConfigError> {
        if raw.feeds.is_empty() {
            return Err(ConfigError::Invalid(
                "at least one [[feeds]] entry is required".to_string(),
            ));
        }

        let database_clean_days = raw.database_clean_days.unwrap_or(DEFAULT_CLEAN_DAYS);
        if database_clean_days > MAX_CLEAN_DAYS {
            return Err(ConfigError::Invalid(format!(
                "database_clean_days must be at most {MAX_CLEAN_DAYS}, got {database_clean_days}"
            )));
        }

        let mut seen = HashSet::new();
        let mut feeds = Vec::with_capacity(raw.feeds.len());
        for (index, raw_feed) in raw.feeds.into_iter().enumerate() {
            let feed = validate_feed(raw_feed).map_err(|e| match e {
                ConfigError::Invalid(msg) => ConfigError::Invalid(format!("feeds[{index}]: {msg}")),
                other => other,
            })?;
            if !seen.insert(feed.short_name.clone()) {
                return Err(ConfigError::Invalid(format!(
                    "feeds[{index}]: duplicate short_name '{}'",
                    feed.short_name
                )));
            }
            feeds.push(feed);
        }

        Ok(Self {
            database_file: non_blank(raw.database_file)
                .unwrap_or_else(|| DEFAULT_DATABASE_FILE.to_string())
                .into(),
            database_clean_days,
            log_file: non_blank(raw.log_file).map(PathBuf::from),
            user_agent: non_blank(raw.user_agent).unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            feeds,
        })
    }
}

fn validate_feed(raw: RawFeed) -> Result<FeedSettings, ConfigError> {
    let short_name = required(raw.short_name, "short_name")?;
    let name = required(raw.name, "name")?;
    let feed_url = required(raw.feed_url, "feed_url")?;
    validate_http_url(&feed_url)
        .map_err(|e| ConfigError::Invalid(format!("feed_url '{feed_url}': {e}")))?;

    if raw.bluesky.is_none() && raw.mastodon.is_none() {
        return Err(ConfigError::Invalid(format!(
            "feed '{short_name}' needs a [feeds.bluesky] or [feeds.mastodon] section"
        )));
    }

    let bluesky = raw.bluesky.map(validate_bluesky).transpose()?;
    let mastodon = raw.mastodon.map(validate_mastodon).transpose()?;

    Ok(FeedSettings {
        name,
        short_name,
        feed_url,
        enabled: raw.enabled.unwrap_or(true),
        recent_days: raw.recent_days.unwrap_or(DEFAULT_RECENT_DAYS),
        max_episodes: raw.max_episodes.unwrap_or(DEFAULT_MAX_EPISODES),
        guid_filter: raw.guid_filter.map(|f| f.trim().to_string()).unwrap_or_default(),
        bluesky,
        mastodon,
    })
}

fn validate_bluesky(raw: RawBluesky) -> Result<BlueskySettings, ConfigError> {
    let username = required(raw.username, "bluesky.username")?;
    let app_password = required(raw.app_password, "bluesky.app_password")?;
    let api_url = api_url(raw.api_url, DEFAULT_BLUESKY_API_URL, "bluesky.api_url")?;

    Ok(BlueskySettings {
        username,
        app_password: SecretString::from(app_password),
        api_url,
        session_file: non_blank(raw.session_file).map(PathBuf::from),
        template: TemplateSettings {
            template_file: non_blank(raw.template_file).map(PathBuf::from),
            max_description_length: raw
                .max_description_length
                .unwrap_or(DEFAULT_BLUESKY_DESCRIPTION_LENGTH),
            default_template: DEFAULT_BLUESKY_TEMPLATE,
        },
        enabled: raw.enabled.unwrap_or(true),
    })
}

fn validate_mastodon(raw: RawMastodon) -> Result<MastodonSettings, ConfigError> {
    let raw_api_url = required(raw.api_url, "mastodon.api_url")?;
    let api_url = api_url(Some(raw_api_url), "", "mastodon.api_url")?;
    let use_oauth = raw.use_oauth.unwrap_or(false);
    let secrets_file = non_blank(raw.secrets_file).map(PathBuf::from);

    let access_token = if use_oauth {
        let path = secrets_file.clone().ok_or_else(|| {
            ConfigError::Invalid(
                "mastodon.secrets_file is required when use_oauth = true".to_string(),
            )
        })?;
        read_access_token(&path)?
    } else {
        required(raw.access_token, "mastodon.access_token")?
    };

    Ok(MastodonSettings {
        api_url,
        use_oauth,
        secrets_file,
        access_token: SecretString::from(access_token),
        template: TemplateSettings {
            template_file: non_blank(raw.template_file).map(PathBuf::from),
            max_description_length: raw
                .max_description_length
                .unwrap_or(DEFAULT_MASTODON_DESCRIPTION_LENGTH),
            default_template: DEFAULT_MASTODON_TEMPLATE,
        },
        enabled: raw.enabled.unwrap_or(true),
    })
}

/// The access token is the first non-empty line of the secrets file.
fn read_access_token(path: &Path) -> Result<String, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::SecretsFile {
        path: path.to_path_buf(),
        source,
    })?;

    content
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ConfigError::Invalid(format!(
                "Mastodon secrets file {} contains no access token",
                path.display()
            ))
        })
}

fn api_url(value: Option<String>, default: &str, field: &str) -> Result<String, ConfigError> {
    let value = non_blank(value).unwrap_or_else(|| default.to_string());
    validate_http_url(&value).map_err(|e| ConfigError::Invalid(format!("{field} '{value}': {e}")))?;
    Ok(value.trim_end_matches('/').to_string())
}

fn required(value: Option<String>, field: &str) -> Result<String, ConfigError> {
    non_blank(value).ok_or_else(|| ConfigError::Invalid(format!("missing or blank {field}")))
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

// ============================================================================
// Tests
// ============================================================================
