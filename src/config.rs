use crate::cache::DEFAULT_ROUTES_CACHE_SIZE;
use crate::model::SourceId;
use crate::time::{
    ServerTimeSettings, DEFAULT_SERVER_TIME, DEFAULT_SERVER_TIME_EXT, DEFAULT_SERVER_TIME_SHORT,
};
use anyhow::{anyhow, Result};
use config::Config;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Default store refresh cadence (5 minutes)
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 300;

/// Default routes cache sweep cadence (2 minutes)
pub const DEFAULT_HOUSEKEEPING_INTERVAL_SECS: u64 = 120;

const EMPTY_CONFIG: &str = r#"### birdglass configuration file

### store refresh and cache housekeeping cadence (in seconds)
# refresh_interval_secs = 300
# housekeeping_interval_secs = 120

### response caches
# [cache]
# neighbours_disabled = false
# routes_disabled = false
# routes_max_size = 128

### one block per route server
# [[sources]]
# id = 1
# name = "rs1.example.net"
#
# [sources.birdwatcher]
# api = "http://rs1.example.net:29184"
# type = "multi_table"
# peer_table_prefix = "T"
# pipe_protocol_prefix = "M"
# timezone = "UTC"
"#;

#[derive(Debug, Clone, Deserialize)]
pub struct GlassConfig {
    /// Store refresh cadence in seconds
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,

    /// Routes cache expiry sweep cadence in seconds
    #[serde(default = "default_housekeeping_interval_secs")]
    pub housekeeping_interval_secs: u64,

    #[serde(default)]
    pub cache: CacheSettings,

    #[serde(default)]
    pub sources: Vec<SourceConfig>,
}

fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_housekeeping_interval_secs() -> u64 {
    DEFAULT_HOUSEKEEPING_INTERVAL_SECS
}

#[derive(Debug, Clone, Deserialize)]
pub struct CacheSettings {
    #[serde(default)]
    pub neighbours_disabled: bool,
    #[serde(default)]
    pub routes_disabled: bool,
    #[serde(default = "default_routes_max_size")]
    pub routes_max_size: usize,
}

fn default_routes_max_size() -> usize {
    DEFAULT_ROUTES_CACHE_SIZE
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            neighbours_disabled: false,
            routes_disabled: false,
            routes_max_size: DEFAULT_ROUTES_CACHE_SIZE,
        }
    }
}

/// One configured route server
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    pub id: SourceId,
    pub name: String,
    #[serde(default)]
    pub group: String,
    pub birdwatcher: BirdwatcherConfig,
}

/// Routing table layout of the daemon behind a birdwatcher API
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableLayout {
    /// One peer table per session, piped into the master table
    #[default]
    MultiTable,
    /// Every session imports straight into the master table
    SingleTable,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BirdwatcherConfig {
    /// Base URL of the birdwatcher API
    pub api: String,

    #[serde(rename = "type", default)]
    pub layout: TableLayout,

    #[serde(default = "default_peer_table_prefix")]
    pub peer_table_prefix: String,
    #[serde(default = "default_pipe_protocol_prefix")]
    pub pipe_protocol_prefix: String,

    #[serde(default = "default_timezone")]
    pub timezone: String,
    #[serde(default = "default_servertime")]
    pub servertime: String,
    #[serde(default = "default_servertime_short")]
    pub servertime_short: String,
    #[serde(default = "default_servertime_ext")]
    pub servertime_ext: String,

    #[serde(default)]
    pub show_last_reboot: bool,
    #[serde(default)]
    pub disable_neighbor_summary: bool,
}

fn default_peer_table_prefix() -> String {
    "T".to_string()
}

fn default_pipe_protocol_prefix() -> String {
    "M".to_string()
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_servertime() -> String {
    DEFAULT_SERVER_TIME.to_string()
}

fn default_servertime_short() -> String {
    DEFAULT_SERVER_TIME_SHORT.to_string()
}

fn default_servertime_ext() -> String {
    DEFAULT_SERVER_TIME_EXT.to_string()
}

impl BirdwatcherConfig {
    pub fn new(api: impl Into<String>) -> Self {
        Self {
            api: api.into(),
            layout: TableLayout::default(),
            peer_table_prefix: default_peer_table_prefix(),
            pipe_protocol_prefix: default_pipe_protocol_prefix(),
            timezone: default_timezone(),
            servertime: default_servertime(),
            servertime_short: default_servertime_short(),
            servertime_ext: default_servertime_ext(),
            show_last_reboot: false,
            disable_neighbor_summary: false,
        }
    }

    /// Resolve the time zone and layouts for timestamp decoding
    pub fn time_settings(&self) -> Result<ServerTimeSettings> {
        let mut settings = ServerTimeSettings::new(&self.timezone)?;
        settings.server_time = self.servertime.clone();
        settings.server_time_short = self.servertime_short.clone();
        settings.server_time_ext = self.servertime_ext.clone();
        Ok(settings)
    }
}

impl Default for GlassConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: DEFAULT_REFRESH_INTERVAL_SECS,
            housekeeping_interval_secs: DEFAULT_HOUSEKEEPING_INTERVAL_SECS,
            cache: CacheSettings::default(),
            sources: vec![],
        }
    }
}

impl GlassConfig {
    /// Load configuration from a TOML file layered with `BIRDGLASS_*` environment variables.
    ///
    /// Without a path, `$HOME/.birdglass/birdglass.toml` is used. A missing file is
    /// created from a commented template.
    pub fn new(path: &Option<String>) -> Result<GlassConfig> {
        let mut builder = Config::builder();

        match path {
            Some(p) => {
                let path = Path::new(p.as_str());
                if path.exists() {
                    let path_str = path
                        .to_str()
                        .ok_or_else(|| anyhow!("Could not convert path to string"))?;
                    builder = builder.add_source(config::File::with_name(path_str));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG)
                        .map_err(|e| anyhow!("Unable to create config file: {}", e))?;
                }
            }
            None => {
                let glass_dir = Self::config_dir()?;
                std::fs::create_dir_all(glass_dir.as_str())
                    .map_err(|e| anyhow!("Unable to create birdglass directory: {}", e))?;
                let p = format!("{}/birdglass.toml", glass_dir.as_str());
                if Path::new(p.as_str()).exists() {
                    builder = builder.add_source(config::File::with_name(p.as_str()));
                } else {
                    std::fs::write(p.as_str(), EMPTY_CONFIG).map_err(|e| {
                        anyhow!("Unable to create config file {}: {}", p.as_str(), e)
                    })?;
                }
            }
        }

        // E.g., `BIRDGLASS_REFRESH_INTERVAL_SECS=60` or `BIRDGLASS_CACHE__ROUTES_MAX_SIZE=512`
        builder = builder.add_source(
            config::Environment::with_prefix("BIRDGLASS")
                .prefix_separator("_")
                .separator("__"),
        );

        let settings = builder
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?;

        let config = settings
            .try_deserialize::<GlassConfig>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<GlassConfig> {
        let config = Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()
            .map_err(|e| anyhow!("Failed to build configuration: {}", e))?
            .try_deserialize::<GlassConfig>()
            .map_err(|e| anyhow!("Failed to deserialize configuration: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    fn config_dir() -> Result<String> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| anyhow!("Could not find home directory"))?
            .to_str()
            .ok_or_else(|| anyhow!("Could not convert home directory path to string"))?
            .to_owned();
        Ok(format!("{}/.birdglass", home_dir))
    }

    /// Check for duplicate ids, empty API URLs and unknown time zones
    pub fn validate(&self) -> Result<()> {
        let mut ids = HashSet::new();
        for source in &self.sources {
            if !ids.insert(source.id) {
                return Err(anyhow!("Duplicate source id: {}", source.id));
            }
            if source.birdwatcher.api.trim().is_empty() {
                return Err(anyhow!("Source {} has no birdwatcher api url", source.id));
            }
            source
                .birdwatcher
                .time_settings()
                .map_err(|e| anyhow!("Source {}: {}", source.id, e))?;
        }
        if self.refresh_interval_secs == 0 {
            return Err(anyhow!("refresh_interval_secs must be greater than zero"));
        }
        Ok(())
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    pub fn housekeeping_interval(&self) -> Duration {
        Duration::from_secs(self.housekeeping_interval_secs.max(1))
    }

    pub fn source(&self, id: SourceId) -> Option<&SourceConfig> {
        self.sources.iter().find(|s| s.id == id)
    }

    /// Display configuration summary
    pub fn summary(&self) -> String {
        let mut lines = vec![
            format!("Refresh Interval:   {} seconds", self.refresh_interval_secs),
            format!(
                "Housekeeping:       {} seconds",
                self.housekeeping_interval_secs
            ),
            format!(
                "Routes Cache:       {} (max {} entries)",
                if self.cache.routes_disabled {
                    "disabled"
                } else {
                    "enabled"
                },
                self.cache.routes_max_size
            ),
        ];
        for source in &self.sources {
            lines.push(format!(
                "Source {:<4}        {} ({})",
                source.id, source.name, source.birdwatcher.api
            ));
        }
        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXAMPLE: &str = r#"
refresh_interval_secs = 60

[cache]
routes_max_size = 16

[[sources]]
id = 1
name = "rs1.example.net"

[sources.birdwatcher]
api = "http://rs1.example.net:29184"

[[sources]]
id = 2
name = "rs2.example.net"

[sources.birdwatcher]
api = "http://rs2.example.net:29184"
type = "multi_table"
peer_table_prefix = "T_"
pipe_protocol_prefix = "M_"
timezone = "Europe/Brussels"
servertime_short = "%d.%m.%Y %H:%M:%S"
disable_neighbor_summary = true
"#;

    #[test]
    fn test_parse_example() {
        let config = GlassConfig::from_toml(EXAMPLE).unwrap();
        assert_eq!(config.refresh_interval(), Duration::from_secs(60));
        assert_eq!(
            config.housekeeping_interval_secs,
            DEFAULT_HOUSEKEEPING_INTERVAL_SECS
        );
        assert_eq!(config.cache.routes_max_size, 16);
        assert!(!config.cache.routes_disabled);
        assert_eq!(config.sources.len(), 2);

        let rs1 = config.source(1).unwrap();
        assert_eq!(rs1.birdwatcher.layout, TableLayout::MultiTable);
        assert_eq!(rs1.birdwatcher.peer_table_prefix, "T");
        assert_eq!(rs1.birdwatcher.servertime_short, DEFAULT_SERVER_TIME_SHORT);

        // source 2 overrides the defaults
        let rs2 = config.source(2).unwrap();
        assert_eq!(rs2.birdwatcher.pipe_protocol_prefix, "M_");
        assert!(rs2.birdwatcher.disable_neighbor_summary);
        assert_ne!(
            rs1.birdwatcher.servertime_short,
            rs2.birdwatcher.servertime_short
        );
        assert_eq!(
            rs2.birdwatcher.time_settings().unwrap().timezone,
            chrono_tz::Europe::Brussels
        );
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let content = r#"
[[sources]]
id = 1
name = "a"
[sources.birdwatcher]
api = "http://a"

[[sources]]
id = 1
name = "b"
[sources.birdwatcher]
api = "http://b"
"#;
        assert!(GlassConfig::from_toml(content).is_err());
    }

    #[test]
    fn test_unknown_timezone_rejected() {
        let content = r#"
[[sources]]
id = 1
name = "a"
[sources.birdwatcher]
api = "http://a"
timezone = "Nowhere/Special"
"#;
        assert!(GlassConfig::from_toml(content).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("birdglass.toml");
        std::fs::write(&path, EXAMPLE).unwrap();

        let config = GlassConfig::new(&Some(path.to_string_lossy().to_string())).unwrap();
        assert_eq!(config.sources.len(), 2);
        assert!(config.summary().contains("rs2.example.net"));
    }

    #[test]
    fn test_missing_file_is_created_from_template() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("new.toml");
        let path_str = path.to_string_lossy().to_string();

        let config = GlassConfig::new(&Some(path_str)).unwrap();
        assert!(path.exists());
        assert!(config.sources.is_empty());
        assert_eq!(config.refresh_interval_secs, DEFAULT_REFRESH_INTERVAL_SECS);
    }
}
