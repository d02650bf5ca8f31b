use anyhow::{Context, Result, bail};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::modules::api::StatsVersion;

pub const DEFAULT_API_BASE_URL: &str = "https://api-v2.chessbase.in";
pub const DEFAULT_DONOR_POLL_SECS: u64 = 5;
pub const DEFAULT_STATS_POLL_SECS: u64 = 10;
pub const DEFAULT_STATS_API_VERSION: u8 = 2;
pub const DEFAULT_ALERT_CHECK_SECS: u64 = 2;
pub const DEFAULT_ALERT_DISPLAY_SECS: u64 = 12;
pub const DEFAULT_TOP_DONOR_INTERVAL_SECS: u64 = 60;
pub const DEFAULT_TOP_DONOR_DISPLAY_SECS: u64 = 4;
pub const DEFAULT_NAME_CHAR_LIMIT: usize = 18;
pub const DEFAULT_SOUND_NAME: &str = "message-new-instant";
/// Longest accepted poll, check or display interval (one day).
pub const MAX_INTERVAL_SECS: u64 = 86_400;

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ConfigFile {
    pub api_base_url: String,
    pub donor_poll_secs: u64,
    pub stats_poll_secs: u64,
    pub stats_api_version: u8,
    pub alert_check_secs: u64,
    pub alert_display_secs: u64,
    pub top_donor_interval_secs: u64,
    pub top_donor_display_secs: u64,
    pub name_char_limit: usize,
    pub audio_enabled: bool,
    pub sound_name: String,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            donor_poll_secs: DEFAULT_DONOR_POLL_SECS,
            stats_poll_secs: DEFAULT_STATS_POLL_SECS,
            stats_api_version: DEFAULT_STATS_API_VERSION,
            alert_check_secs: DEFAULT_ALERT_CHECK_SECS,
            alert_display_secs: DEFAULT_ALERT_DISPLAY_SECS,
            top_donor_interval_secs: DEFAULT_TOP_DONOR_INTERVAL_SECS,
            top_donor_display_secs: DEFAULT_TOP_DONOR_DISPLAY_SECS,
            name_char_limit: DEFAULT_NAME_CHAR_LIMIT,
            audio_enabled: true,
            sound_name: DEFAULT_SOUND_NAME.to_string(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct Config {
    pub path: PathBuf,
    pub api_base_url: String,
    pub donor_poll_interval: Duration,
    pub stats_poll_interval: Duration,
    pub stats_version: StatsVersion,
    pub alert_check_interval: Duration,
    pub alert_display: Duration,
    pub top_donor_interval: Duration,
    pub top_donor_display: Duration,
    pub name_char_limit: usize,
    pub audio_enabled: bool,
    pub sound_name: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(config_path()?)
    }

    /// Reads `path`, writing the defaults there first if it does not exist.
    pub fn load_from(path: PathBuf) -> Result<Self> {
        if !path.exists() {
            let default = ConfigFile::default();
            let toml = toml::to_string_pretty(&default)?;
            if let Some(parent) = path.parent() { fs::create_dir_all(parent)?; }
            fs::write(&path, toml).with_context(|| format!("Writing {:?}", &path))?;
        }
        let content = fs::read_to_string(&path).with_context(|| format!("Reading {:?}", &path))?;
        let cfg: ConfigFile = toml::from_str(&content).with_context(|| "Parsing config TOML")?;
        Self::from_file(path, cfg)
    }

    fn from_file(path: PathBuf, cfg: ConfigFile) -> Result<Self> {
        let secs = |name: &str, value: u64| -> Result<Duration> {
            if value == 0 {
                bail!("{} must be greater than zero", name);
            }
            if value > MAX_INTERVAL_SECS {
                bail!("{} must be at most {} seconds", name, MAX_INTERVAL_SECS);
            }
            Ok(Duration::from_secs(value))
        };
        if cfg.api_base_url.trim().is_empty() {
            bail!("api_base_url must not be empty");
        }
        Ok(Self {
            api_base_url: cfg.api_base_url.trim().to_string(),
            donor_poll_interval: secs("donor_poll_secs", cfg.donor_poll_secs)?,
            stats_poll_interval: secs("stats_poll_secs", cfg.stats_poll_secs)?,
            stats_version: StatsVersion::from_number(cfg.stats_api_version)?,
            alert_check_interval: secs("alert_check_secs", cfg.alert_check_secs)?,
            alert_display: secs("alert_display_secs", cfg.alert_display_secs)?,
            top_donor_interval: secs("top_donor_interval_secs", cfg.top_donor_interval_secs)?,
            top_donor_display: secs("top_donor_display_secs", cfg.top_donor_display_secs)?,
            name_char_limit: cfg.name_char_limit.max(1),
            audio_enabled: cfg.audio_enabled,
            sound_name: cfg.sound_name,
            path,
        })
    }

    #[cfg(test)]
    pub fn defaults() -> Self {
        Self::from_file(PathBuf::new(), ConfigFile::default()).expect("default configuration is valid")
    }

    pub fn location(&self) -> &Path {
        &self.path
    }
}

fn config_path() -> Result<PathBuf> {
    let base = config_dir().context("Could not determine config directory")?;
    Ok(base.join("donorwatch").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_defaults_on_first_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::load_from(path.clone()).unwrap();
        assert!(path.exists());
        assert_eq!(config.donor_poll_interval, Duration::from_secs(5));
        assert_eq!(config.alert_display, Duration::from_secs(12));
        assert_eq!(config.stats_version, StatsVersion::V2);
        assert_eq!(config.location(), path.as_path());

        let written: ConfigFile = toml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, ConfigFile::default());
    }

    #[test]
    fn partial_files_fall_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "top_donor_interval_secs = 30\naudio_enabled = false\n").unwrap();
        let config = Config::load_from(path).unwrap();
        assert_eq!(config.top_donor_interval, Duration::from_secs(30));
        assert!(!config.audio_enabled);
        assert_eq!(config.name_char_limit, DEFAULT_NAME_CHAR_LIMIT);
        assert_eq!(config.api_base_url, DEFAULT_API_BASE_URL);
    }

    #[test]
    fn rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "alert_check_secs = 0\n").unwrap();
        assert!(Config::load_from(path.clone()).is_err());
        fs::write(&path, "stats_api_version = 7\n").unwrap();
        assert!(Config::load_from(path).is_err());
    }

    #[test]
    fn rejects_intervals_longer_than_a_day() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "top_donor_interval_secs = 9223372036854775807\n").unwrap();
        let err = Config::load_from(path.clone()).unwrap_err();
        assert!(err.to_string().contains("top_donor_interval_secs"));

        fs::write(&path, format!("donor_poll_secs = {}\n", MAX_INTERVAL_SECS)).unwrap();
        assert_eq!(
            Config::load_from(path).unwrap().donor_poll_interval,
            Duration::from_secs(MAX_INTERVAL_SECS)
        );
    }

    #[test]
    fn defaults_are_valid() {
        let config = Config::defaults();
        assert_eq!(config.top_donor_display, Duration::from_secs(4));
        assert!(config.audio_enabled);
    }
}
