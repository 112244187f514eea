use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use super::platform;

/// Presence application id used while mirroring local library playback.
pub const DEFAULT_LOCAL_APP_ID: &str = "773825528921849856";
/// Presence application id used while mirroring an internet radio station.
pub const DEFAULT_STATION_APP_ID: &str = "1079488217591345232";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub presence: PresenceConfig,
    #[serde(default)]
    pub stations: StationsConfig,
    #[serde(default)]
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollConfig {
    /// Seconds between two player polls.
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
    /// Scripting name of the player application ("Music", "iTunes").
    #[serde(default = "default_player_app")]
    pub player_app: String,
    /// Upper bound for a single player query.
    #[serde(default = "default_query_timeout_secs")]
    pub query_timeout_secs: u64,
    /// A session still connecting after this long is recreated.
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PresenceConfig {
    #[serde(default = "default_local_app_id")]
    pub local_app_id: String,
    #[serde(default = "default_station_app_id")]
    pub station_app_id: String,
    /// Large image asset shown when no per-station icon applies.
    #[serde(default = "default_large_image")]
    pub default_large_image: String,
    /// Small branding asset attached to every activity.
    #[serde(default = "default_small_image")]
    pub small_image: String,
}

/// Endpoints used to turn a station display name into now-playing data.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StationsConfig {
    /// Search page for a station name; `{name}` is replaced by the
    /// url-encoded display name.
    #[serde(default = "default_lookup_url")]
    pub lookup_url: String,
    #[serde(default = "default_nowplaying_url")]
    pub nowplaying_url: String,
    #[serde(default)]
    pub api_key: String,
    /// JSON object mapping station display names to icon asset keys.
    /// Empty disables the lookup (names are used verbatim).
    #[serde(default)]
    pub icon_map_url: String,
    #[serde(default = "default_fetch_timeout_secs")]
    pub fetch_timeout_secs: u64,
    #[serde(default = "default_max_redirects")]
    pub max_redirects: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_interval_secs(),
            player_app: default_player_app(),
            query_timeout_secs: default_query_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
        }
    }
}

impl Default for PresenceConfig {
    fn default() -> Self {
        Self {
            local_app_id: default_local_app_id(),
            station_app_id: default_station_app_id(),
            default_large_image: default_large_image(),
            small_image: default_small_image(),
        }
    }
}

impl Default for StationsConfig {
    fn default() -> Self {
        Self {
            lookup_url: default_lookup_url(),
            nowplaying_url: default_nowplaying_url(),
            api_key: String::new(),
            icon_map_url: String::new(),
            fetch_timeout_secs: default_fetch_timeout_secs(),
            max_redirects: default_max_redirects(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

fn default_interval_secs() -> u64 {
    5
}

fn default_player_app() -> String {
    "Music".to_string()
}

fn default_query_timeout_secs() -> u64 {
    3
}

fn default_connect_timeout_secs() -> u64 {
    15
}

fn default_local_app_id() -> String {
    DEFAULT_LOCAL_APP_ID.to_string()
}

fn default_station_app_id() -> String {
    DEFAULT_STATION_APP_ID.to_string()
}

fn default_large_image() -> String {
    "music".to_string()
}

fn default_small_image() -> String {
    "logo".to_string()
}

fn default_lookup_url() -> String {
    "https://www.radio.net/search?q={name}".to_string()
}

fn default_nowplaying_url() -> String {
    "https://api.radio.net/info/v2/search/nowplaying".to_string()
}

fn default_fetch_timeout_secs() -> u64 {
    10
}

fn default_max_redirects() -> usize {
    5
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8990
}

impl Config {
    /// Load `config_path`, writing a default file there on first run.
    pub fn load_from(config_path: &Path) -> anyhow::Result<Self> {
        if !config_path.exists() {
            let config = Self::default();
            config.save_to(config_path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(config_path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn save_to(&self, config_path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        std::fs::write(config_path, content)?;
        Ok(())
    }

    pub fn config_path() -> PathBuf {
        platform::config_dir().join("config.toml")
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll: PollConfig::default(),
            presence: PresenceConfig::default(),
            stations: StationsConfig::default(),
            http: HttpConfig::default(),
        }
    }
}
