//! User configuration (`config.yaml`) and platform directories.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Root of `config.yaml`. Every section is optional.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SigilConfig {
    pub capture: CaptureConfig,
    pub playback: PlaybackConfig,
    pub gesture: GestureConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureConfig {
    /// Minimum interval between recorded mouse moves (ms).
    pub move_sample_interval_ms: u64,
    /// Gaps shorter than this do not produce a delay event (ms).
    pub min_delay_ms: u64,
    /// Wheel ticks closer together than this are merged (ms).
    pub wheel_merge_ms: u64,
    /// Hotkey that starts a recording from the CLI.
    pub start_hotkey: String,
    /// Hotkey that stops a recording or a playback.
    pub stop_hotkey: String,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            move_sample_interval_ms: 10,
            min_delay_ms: 10,
            wheel_merge_ms: 500,
            start_hotkey: "F9".into(),
            stop_hotkey: "F10".into(),
        }
    }
}

impl CaptureConfig {
    pub fn move_sample_interval(&self) -> f64 {
        Duration::from_millis(self.move_sample_interval_ms).as_secs_f64()
    }

    pub fn min_delay(&self) -> f64 {
        Duration::from_millis(self.min_delay_ms).as_secs_f64()
    }

    pub fn wheel_merge_window(&self) -> f64 {
        Duration::from_millis(self.wheel_merge_ms).as_secs_f64()
    }

    /// Keys that belong to the application and are never recorded.
    pub fn excluded_keys(&self) -> [&str; 2] {
        [self.start_hotkey.as_str(), self.stop_hotkey.as_str()]
    }
}

/// How cursor-relative mouse events are reconstructed during replay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CursorRelativePolicy {
    /// Every delta is applied to the playback anchor.
    #[default]
    Anchored,
    /// Deltas compound from the previously replayed position.
    Chained,
}

/// What a stop request does to a delay that is already sleeping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    #[default]
    FinishDelay,
    Interrupt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Pause between two repeats (ms).
    pub settle_ms: u64,
    pub cursor_relative: CursorRelativePolicy,
    pub stop_policy: StopPolicy,
    /// Repeats used when a gesture triggers playback.
    pub repeat_count: u32,
    pub infinite: bool,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            settle_ms: 100,
            cursor_relative: CursorRelativePolicy::Anchored,
            stop_policy: StopPolicy::FinishDelay,
            repeat_count: 1,
            infinite: false,
        }
    }
}

impl PlaybackConfig {
    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GestureConfig {
    pub ctrl_keys: Vec<String>,
    pub shift_keys: Vec<String>,
    pub alt_keys: Vec<String>,
    /// Discards the gesture in progress.
    pub cancel_key: String,
    /// Fewer points than this classify as `tooShort`.
    pub min_points: usize,
    /// Lower bound on the centroid window size.
    pub min_segment: usize,
    /// A stroke must travel more than this along its dominant axis (px).
    pub noise_threshold_px: i32,
    pub max_symbols: usize,
}

impl Default for GestureConfig {
    fn default() -> Self {
        Self {
            ctrl_keys: vec!["ControlLeft".into(), "ControlRight".into()],
            shift_keys: vec!["ShiftLeft".into(), "ShiftRight".into()],
            alt_keys: vec!["Alt".into(), "AltGr".into()],
            cancel_key: "Escape".into(),
            min_points: 5,
            min_segment: 5,
            noise_threshold_px: 20,
            max_symbols: 3,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Overrides the platform data directory.
    pub data_dir: Option<PathBuf>,
}

impl StorageConfig {
    pub fn resolve_data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(data_dir)
    }
}

/// Platform configuration directory for sigil.
pub fn config_dir() -> PathBuf {
    dirs_next::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sigil")
}

/// Platform data directory for sigil (macros, gesture order).
pub fn data_dir() -> PathBuf {
    dirs_next::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("sigil")
}

pub fn log_dir() -> PathBuf {
    config_dir().join("logs")
}

pub fn config_file_path() -> PathBuf {
    config_dir().join("config.yaml")
}

pub fn load_yaml<T: DeserializeOwned>(path: impl AsRef<Path>) -> ConfigResult<T> {
    let content = fs::read_to_string(path)?;
    Ok(serde_yaml::from_str(&content)?)
}

pub fn save_yaml<T: Serialize>(path: impl AsRef<Path>, value: &T) -> ConfigResult<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_yaml::to_string(value)?)?;
    Ok(())
}

/// Load `path`, falling back to defaults when it is missing or invalid.
pub fn load_config(path: impl AsRef<Path>) -> SigilConfig {
    let path = path.as_ref();
    if !path.exists() {
        debug!(?path, "No config file found, using defaults");
        return SigilConfig::default();
    }

    match load_yaml::<SigilConfig>(path) {
        Ok(config) => {
            info!(?path, "Loaded config");
            config
        }
        Err(e) => {
            warn!(?path, error = %e, "Failed to load config, using defaults");
            SigilConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let yaml = "playback:\n  settle_ms: 250\n  cursor_relative: chained\ngesture:\n  noise_threshold_px: 30\n";
        let config: SigilConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.playback.settle_ms, 250);
        assert_eq!(config.playback.cursor_relative, CursorRelativePolicy::Chained);
        assert_eq!(config.playback.stop_policy, StopPolicy::FinishDelay);
        assert_eq!(config.gesture.noise_threshold_px, 30);
        assert_eq!(config.gesture.min_points, 5);
        assert_eq!(config.capture.wheel_merge_ms, 500);
    }

    #[test]
    fn test_invalid_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        fs::write(&path, "capture: [not, a, map]").unwrap();
        let config = load_config(&path);
        assert_eq!(config.capture.move_sample_interval_ms, 10);

        let missing = load_config(dir.path().join("nope.yaml"));
        assert_eq!(missing.playback.settle_ms, 100);
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.yaml");
        let mut config = SigilConfig::default();
        config.capture.stop_hotkey = "Pause".into();
        config.playback.infinite = true;
        save_yaml(&path, &config).unwrap();

        let reloaded = load_config(&path);
        assert_eq!(reloaded.capture.stop_hotkey, "Pause");
        assert!(reloaded.playback.infinite);
    }
}
