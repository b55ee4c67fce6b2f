use crate::clock::TimestampZone;
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct DroneScanConfig {
    pub storage: StorageConfig,
    pub export: ExportConfig,
    pub feeds: FeedsConfig,
    pub system: SystemConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct StorageConfig {
    /// Directory the artifact folder is created under
    #[serde(default = "default_base_dir")]
    pub base_dir: String,

    /// Named folder holding every exported session
    #[serde(default = "default_folder_name")]
    pub folder_name: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExportConfig {
    /// `local` or an IANA zone name used for CSV timestamps and file names
    #[serde(default = "default_timezone")]
    pub timezone: String,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct FeedsConfig {
    /// Replay script driving detections, fixes and pulses
    #[serde(default)]
    pub replay_script: Option<String>,

    /// Use the terminal space bar as the confirm button
    #[serde(default)]
    pub keyboard_trigger: bool,

    /// Shut down once the replay script has played out
    #[serde(default = "default_exit_on_replay_end")]
    pub exit_on_replay_end: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// How often the session summary is recomputed while running
    #[serde(default = "default_summary_refresh_ms")]
    pub summary_refresh_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct LoggingConfig {
    /// Optional log file; rotated daily
    #[serde(default)]
    pub file: Option<String>,
}

impl StorageConfig {
    pub fn artifact_folder(&self) -> PathBuf {
        Path::new(&self.base_dir).join(&self.folder_name)
    }
}

impl ExportConfig {
    pub fn zone(&self) -> TimestampZone {
        TimestampZone::resolve(&self.timezone)
    }
}

impl DroneScanConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("dronescan.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("storage.base_dir", default_base_dir())?
            .set_default("storage.folder_name", default_folder_name())?
            .set_default("export.timezone", default_timezone())?
            .set_default("feeds.keyboard_trigger", false)?
            .set_default("feeds.exit_on_replay_end", default_exit_on_replay_end())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default(
                "system.summary_refresh_ms",
                default_summary_refresh_ms() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // DRONESCAN_STORAGE__BASE_DIR, DRONESCAN_EXPORT__TIMEZONE, ...
            .add_source(
                Environment::with_prefix("DRONESCAN")
                    .prefix_separator("_")
                    .separator("__"),
            )
            .build()?;

        let config: DroneScanConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.base_dir.trim().is_empty() {
            return Err(ConfigError::Message(
                "Storage base_dir cannot be empty".to_string(),
            ));
        }

        let folder = self.storage.folder_name.trim();
        if folder.is_empty() || folder.contains(&['/', '\\'][..]) || folder == ".." {
            return Err(ConfigError::Message(format!(
                "Storage folder_name must be a single directory name, got '{}'",
                self.storage.folder_name
            )));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.summary_refresh_ms == 0 {
            return Err(ConfigError::Message(
                "Summary refresh interval must be greater than 0".to_string(),
            ));
        }

        if let Some(script) = &self.feeds.replay_script {
            if script.trim().is_empty() {
                return Err(ConfigError::Message(
                    "Replay script path cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

impl Default for DroneScanConfig {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                base_dir: default_base_dir(),
                folder_name: default_folder_name(),
            },
            export: ExportConfig {
                timezone: default_timezone(),
            },
            feeds: FeedsConfig {
                replay_script: None,
                keyboard_trigger: false,
                exit_on_replay_end: default_exit_on_replay_end(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                summary_refresh_ms: default_summary_refresh_ms(),
            },
            logging: LoggingConfig::default(),
        }
    }
}

fn default_base_dir() -> String {
    "./data".to_string()
}
fn default_folder_name() -> String {
    "DroneScan".to_string()
}

fn default_timezone() -> String {
    "local".to_string()
}

fn default_exit_on_replay_end() -> bool {
    true
}

fn default_event_bus_capacity() -> usize {
    100
}
fn default_summary_refresh_ms() -> u64 {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = DroneScanConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(
            config.storage.artifact_folder(),
            PathBuf::from("./data/DroneScan")
        );
        assert_eq!(config.export.zone(), TimestampZone::Local);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[storage]
base_dir = "/srv/scans"

[feeds]
replay_script = "flights/north.json"
keyboard_trigger = true
"#
        )
        .unwrap();

        let config = DroneScanConfig::load_from_file(file.path()).unwrap();
        assert_eq!(config.storage.base_dir, "/srv/scans");
        assert_eq!(config.storage.folder_name, "DroneScan");
        assert_eq!(
            config.feeds.replay_script.as_deref(),
            Some("flights/north.json")
        );
        assert!(config.feeds.keyboard_trigger);
        assert!(config.feeds.exit_on_replay_end);
        assert_eq!(config.system.event_bus_capacity, 100);
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = DroneScanConfig::load_from_file("/nonexistent/dronescan.toml").unwrap();
        assert_eq!(config.storage.base_dir, default_base_dir());
        assert_eq!(config.system.summary_refresh_ms, 1000);
    }

    #[test]
    fn test_environment_variable_override() {
        env::set_var("DRONESCAN_EXPORT__TIMEZONE", "Asia/Shanghai");

        let config = DroneScanConfig::load_from_file("/nonexistent/dronescan.toml").unwrap();
        env::remove_var("DRONESCAN_EXPORT__TIMEZONE");

        assert_eq!(config.export.timezone, "Asia/Shanghai");
        assert_eq!(
            config.export.zone(),
            TimestampZone::Named(chrono_tz::Asia::Shanghai)
        );
    }

    #[test]
    fn test_config_validation() {
        let mut config = DroneScanConfig::default();

        config.storage.folder_name = "../escape".to_string();
        assert!(config.validate().is_err());

        config.storage.folder_name = "DroneScan".to_string();
        config.system.event_bus_capacity = 0;
        assert!(config.validate().is_err());

        config.system.event_bus_capacity = 16;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_toml_round_trip() {
        let config = DroneScanConfig::default();
        let rendered = toml::to_string_pretty(&config).unwrap();
        let parsed: DroneScanConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }
}
