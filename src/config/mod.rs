use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

pub mod defaults;
pub mod duration_serde;

use defaults::*;

use crate::models::ProviderConfiguration;
use crate::utils::deterministic_uuid::generate_guide_source_uuid;

/// Schedule synchronization settings shared by every guide source
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuideConfig {
    /// Number of consecutive days, starting today, to keep in sync
    #[serde(default = "default_days_to_get")]
    pub days_to_get: u32,
    /// Upper bound on program identifiers per metadata request
    #[serde(default = "default_program_batch_size")]
    pub program_batch_size: usize,
    /// Upper bound on program identifiers per artwork request
    #[serde(default = "default_artwork_batch_size")]
    pub artwork_batch_size: usize,
    /// Only schedule channels that are assigned to a lineup
    #[serde(default = "default_only_active_channels")]
    pub only_active_channels: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    #[serde(default = "default_connect_timeout", with = "duration_serde")]
    pub connect_timeout: Duration,
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

/// Addressing used when publishing the tuner lineup
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LineupConfig {
    #[serde(default = "default_listen_address")]
    pub listen_address: String,
    #[serde(default = "default_lineup_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatcherConfig {
    #[serde(default = "default_bag_size")]
    pub bag_size: usize,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_state_file")]
    pub state_file: String,
}

/// A configured guide source: a stable id plus its provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuideSourceConfig {
    /// Explicit id; derived from the source name when omitted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Uuid>,
    #[serde(flatten)]
    pub provider: ProviderConfiguration,
}

impl GuideSourceConfig {
    pub fn source_id(&self) -> Uuid {
        self.id
            .unwrap_or_else(|| generate_guide_source_uuid(&self.provider.name))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub guide: GuideConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub lineup: LineupConfig,
    #[serde(default)]
    pub matcher: MatcherConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub guide_sources: Vec<GuideSourceConfig>,
}

fn default_days_to_get() -> u32 {
    DEFAULT_DAYS_TO_GET
}
fn default_program_batch_size() -> usize {
    DEFAULT_PROGRAM_BATCH_SIZE
}
fn default_artwork_batch_size() -> usize {
    DEFAULT_ARTWORK_BATCH_SIZE
}
fn default_only_active_channels() -> bool {
    DEFAULT_ONLY_ACTIVE_CHANNELS
}
fn default_connect_timeout() -> Duration {
    humantime::parse_duration(DEFAULT_CONNECT_TIMEOUT).unwrap_or(Duration::from_secs(10))
}
fn default_request_timeout() -> Duration {
    humantime::parse_duration(DEFAULT_REQUEST_TIMEOUT).unwrap_or(Duration::from_secs(120))
}
fn default_listen_address() -> String {
    DEFAULT_LISTEN_ADDRESS.to_string()
}
fn default_lineup_port() -> u16 {
    DEFAULT_LINEUP_PORT
}
fn default_bag_size() -> usize {
    DEFAULT_MATCHER_BAG_SIZE
}
fn default_max_results() -> usize {
    DEFAULT_MATCHER_MAX_RESULTS
}
fn default_state_file() -> String {
    DEFAULT_STATE_FILE.to_string()
}

impl Default for GuideConfig {
    fn default() -> Self {
        Self {
            days_to_get: default_days_to_get(),
            program_batch_size: default_program_batch_size(),
            artwork_batch_size: default_artwork_batch_size(),
            only_active_channels: default_only_active_channels(),
        }
    }
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout: default_connect_timeout(),
            request_timeout: default_request_timeout(),
        }
    }
}

impl Default for LineupConfig {
    fn default() -> Self {
        Self {
            listen_address: default_listen_address(),
            port: default_lineup_port(),
        }
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            bag_size: default_bag_size(),
            max_results: default_max_results(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            guide: GuideConfig::default(),
            http: HttpConfig::default(),
            lineup: LineupConfig::default(),
            matcher: MatcherConfig::default(),
            storage: StorageConfig::default(),
            guide_sources: Vec::new(),
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let config_file = std::env::var("EPG_GATEWAY_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        Self::load_from_file(&config_file)
    }

    pub fn load_from_file(config_file: &str) -> Result<Self> {
        if std::path::Path::new(&config_file).exists() {
            let contents = std::fs::read_to_string(config_file)?;
            Ok(toml::from_str(&contents)?)
        } else {
            let default_config = Self::default();
            let contents = toml::to_string_pretty(&default_config)?;
            std::fs::write(config_file, contents)?;
            info!("Created default config file: {}", config_file);
            Ok(default_config)
        }
    }

    /// Find a configured guide source by id or (case-insensitive) name
    pub fn find_guide_source(&self, key: &str) -> Option<&GuideSourceConfig> {
        self.guide_sources.iter().find(|source| {
            source.source_id().to_string() == key || source.provider.name.eq_ignore_ascii_case(key)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_apply_to_missing_sections() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config.guide.days_to_get, 7);
        assert_eq!(config.guide.program_batch_size, 5000);
        assert_eq!(config.lineup.port, 6077);
        assert_eq!(config.matcher.bag_size, 2);
        assert!(config.guide_sources.is_empty());
    }

    #[test]
    fn test_guide_sources_parse_and_resolve() {
        let config: Config = toml::from_str(
            r#"
            [guide]
            days_to_get = 3

            [http]
            connect_timeout = "5s"

            [[guide_sources]]
            name = "SD"
            provider = "SchedulesDirect"
            username = "user"
            password = "secret"

            [[guide_sources]]
            name = "Local file"
            provider = "xmltv"
            xmltv_url = "/tmp/guide.xml"
            "#,
        )
        .unwrap();

        assert_eq!(config.guide.days_to_get, 3);
        assert_eq!(config.http.connect_timeout, Duration::from_secs(5));
        assert_eq!(config.guide_sources.len(), 2);
        assert_eq!(config.guide_sources[0].provider.username.as_deref(), Some("user"));

        let sd = config.find_guide_source("sd").unwrap();
        assert_eq!(sd.source_id(), config.guide_sources[0].source_id());
        assert!(config.find_guide_source(&sd.source_id().to_string()).is_some());
        assert!(config.find_guide_source("missing").is_none());
    }

    #[test]
    fn test_load_from_file_writes_default_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let path = path.to_str().unwrap();

        let config = Config::load_from_file(path).unwrap();
        assert_eq!(config.guide.days_to_get, DEFAULT_DAYS_TO_GET);
        assert!(std::path::Path::new(path).exists());

        let reloaded = Config::load_from_file(path).unwrap();
        assert_eq!(reloaded.lineup.port, config.lineup.port);
    }
}
