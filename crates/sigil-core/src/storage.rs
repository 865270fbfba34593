//! Macro persistence: one JSON file per gesture key plus an ordering file.

use crate::config::StorageConfig;
use crate::{Event, EventTimeline};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

const ORDER_FILE: &str = "gesture_order.json";
const MACROS_DIR: &str = "macros";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Macro not found: {0}")]
    NotFound(String),
    #[error("File {file} holds macro {found:?}, expected {expected:?}")]
    KeyMismatch {
        file: String,
        expected: String,
        found: String,
    },
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence for recorded macros, keyed by gesture key.
///
/// Failures are logged and surface as `None`/`false`.
pub trait MacroStore: Send + Sync {
    /// `None` means no such key (or unreadable); an empty timeline is `Some`.
    fn load(&self, key: &str) -> Option<EventTimeline>;

    fn save(&self, key: &str, timeline: &EventTimeline) -> bool;

    fn delete(&self, key: &str) -> bool;

    fn list_keys(&self) -> Vec<String>;

    /// Key → file name, in the user's persisted order.
    fn get_ordered_mappings(&self) -> IndexMap<String, String>;
}

#[derive(Serialize, Deserialize)]
struct MacroFile {
    key: String,
    events: Vec<Event>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct OrderEntry {
    key: String,
    file: String,
}

/// File name for `key`: arrows spelled as letters, anything unsafe as `_`.
pub fn key_to_filename(key: &str) -> String {
    let stem: String = key
        .chars()
        .map(|c| match c {
            '→' => 'R',
            '←' => 'L',
            '↑' => 'U',
            '↓' => 'D',
            '•' => 'O',
            c if c.is_ascii_alphanumeric() || c == '-' => c,
            _ => '_',
        })
        .collect();
    format!("{}.json", stem)
}

/// Macros stored as JSON files under `<root>/macros`.
pub struct FileMacroStore {
    root: PathBuf,
}

impl FileMacroStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Store rooted at the configured (or platform) data directory.
    pub fn open_default(config: &StorageConfig) -> Self {
        let root = config.resolve_data_dir();
        debug!(?root, "Opening macro store");
        Self::new(root)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn macros_dir(&self) -> PathBuf {
        self.root.join(MACROS_DIR)
    }

    fn order_path(&self) -> PathBuf {
        self.root.join(ORDER_FILE)
    }

    fn macro_path(&self, key: &str) -> PathBuf {
        self.macros_dir().join(key_to_filename(key))
    }

    fn ensure_macros_dir(&self) -> StorageResult<PathBuf> {
        let dir = self.macros_dir();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            info!(?dir, "Created macros directory");
        }
        Ok(dir)
    }

    pub fn try_load(&self, key: &str) -> StorageResult<EventTimeline> {
        let path = self.macro_path(key);
        if !path.exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }

        let json = fs::read_to_string(&path)?;
        let file: MacroFile = serde_json::from_str(&json)?;
        if file.key != key {
            return Err(StorageError::KeyMismatch {
                file: path.display().to_string(),
                expected: key.to_string(),
                found: file.key,
            });
        }

        debug!(?path, events = file.events.len(), "Loaded macro");
        Ok(EventTimeline::from_events(file.events))
    }

    pub fn try_save(&self, key: &str, timeline: &EventTimeline) -> StorageResult<PathBuf> {
        self.ensure_macros_dir()?;
        let path = self.macro_path(key);
        let file = MacroFile {
            key: key.to_string(),
            events: timeline.events().to_vec(),
        };
        fs::write(&path, serde_json::to_string_pretty(&file)?)?;
        info!(?path, key, events = timeline.len(), "Saved macro");
        Ok(path)
    }

    pub fn try_delete(&self, key: &str) -> StorageResult<()> {
        let path = self.macro_path(key);
        if !path.exists() {
            return Err(StorageError::NotFound(key.to_string()));
        }
        fs::remove_file(&path)?;
        info!(?path, key, "Deleted macro");

        let mut order = self.read_order();
        let before = order.len();
        order.retain(|entry| entry.key != key);
        if order.len() != before {
            self.write_order(&order)?;
        }
        Ok(())
    }

    /// Keys of all readable macro files, sorted.
    pub fn try_list_keys(&self) -> StorageResult<Vec<String>> {
        let dir = self.macros_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }

        let mut keys = Vec::new();
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match read_macro_key(&path) {
                Ok(key) => keys.push(key),
                Err(e) => warn!(?path, error = %e, "Skipping unreadable macro file"),
            }
        }
        keys.sort();
        Ok(keys)
    }

    fn read_order(&self) -> Vec<OrderEntry> {
        let path = self.order_path();
        if !path.exists() {
            return Vec::new();
        }
        match fs::read_to_string(&path)
            .map_err(StorageError::from)
            .and_then(|json| serde_json::from_str(&json).map_err(StorageError::from))
        {
            Ok(order) => order,
            Err(e) => {
                warn!(?path, error = %e, "Failed to read gesture order, rebuilding it");
                Vec::new()
            }
        }
    }

    fn write_order(&self, order: &[OrderEntry]) -> StorageResult<()> {
        fs::create_dir_all(&self.root)?;
        let path = self.order_path();
        fs::write(&path, serde_json::to_string_pretty(order)?)?;
        debug!(?path, entries = order.len(), "Wrote gesture order");
        Ok(())
    }

    pub fn try_ordered_mappings(&self) -> StorageResult<IndexMap<String, String>> {
        let keys = self.try_list_keys()?;
        let on_disk: HashSet<&str> = keys.iter().map(String::as_str).collect();
        let persisted = self.read_order();

        let mut mappings = IndexMap::new();
        let mut changed = false;
        for entry in &persisted {
            if !on_disk.contains(entry.key.as_str()) {
                warn!(key = %entry.key, "Dropping ordered gesture with no macro file");
                changed = true;
                continue;
            }
            let file = key_to_filename(&entry.key);
            changed |= file != entry.file;
            if mappings.insert(entry.key.clone(), file).is_some() {
                changed = true;
            }
        }

        for key in keys {
            if !mappings.contains_key(&key) {
                debug!(%key, "Appending gesture missing from order file");
                let file = key_to_filename(&key);
                mappings.insert(key, file);
                changed = true;
            }
        }

        if changed {
            let order: Vec<OrderEntry> = mappings
                .iter()
                .map(|(key, file)| OrderEntry {
                    key: key.clone(),
                    file: file.clone(),
                })
                .collect();
            self.write_order(&order)?;
        }
        Ok(mappings)
    }

    /// Persist a new ordering. Unknown keys are ignored; missing keys keep
    /// their relative order after the given ones.
    pub fn reorder(&self, keys: &[String]) -> bool {
        let current = self.get_ordered_mappings();
        let mut order: Vec<OrderEntry> = Vec::with_capacity(current.len());
        for key in keys {
            if let Some(file) = current.get(key) {
                if !order.iter().any(|e| &e.key == key) {
                    order.push(OrderEntry {
                        key: key.clone(),
                        file: file.clone(),
                    });
                }
            }
        }
        for (key, file) in &current {
            if !order.iter().any(|e| &e.key == key) {
                order.push(OrderEntry {
                    key: key.clone(),
                    file: file.clone(),
                });
            }
        }
        match self.write_order(&order) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Failed to save gesture order");
                false
            }
        }
    }
}

fn read_macro_key(path: &Path) -> StorageResult<String> {
    #[derive(Deserialize)]
    struct KeyOnly {
        key: String,
    }
    let json = fs::read_to_string(path)?;
    let parsed: KeyOnly = serde_json::from_str(&json)?;
    Ok(parsed.key)
}

impl MacroStore for FileMacroStore {
    fn load(&self, key: &str) -> Option<EventTimeline> {
        match self.try_load(key) {
            Ok(timeline) => Some(timeline),
            Err(StorageError::NotFound(_)) => {
                debug!(key, "No macro for key");
                None
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to load macro");
                None
            }
        }
    }

    fn save(&self, key: &str, timeline: &EventTimeline) -> bool {
        match self.try_save(key, timeline) {
            Ok(_) => true,
            Err(e) => {
                warn!(key, error = %e, "Failed to save macro");
                false
            }
        }
    }

    fn delete(&self, key: &str) -> bool {
        match self.try_delete(key) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Failed to delete macro");
                false
            }
        }
    }

    fn list_keys(&self) -> Vec<String> {
        self.try_list_keys().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to list macros");
            Vec::new()
        })
    }

    fn get_ordered_mappings(&self) -> IndexMap<String, String> {
        self.try_ordered_mappings().unwrap_or_else(|e| {
            warn!(error = %e, "Failed to reconcile gesture order");
            IndexMap::new()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CoordMode, KeyPhase, MouseButton, MouseEvent, MousePhase};

    fn sample() -> EventTimeline {
        let mut click = MouseEvent::new(MousePhase::Down, (15, -40), CoordMode::MonitorRelative)
            .with_button(MouseButton::Left);
        click.random_range = Some(4);
        let mut timeline = EventTimeline::from_events(vec![
            Event::key(0.0, "ControlLeft", KeyPhase::Down),
            Event::delay(0.1234567, 0.1234567),
            Event::mouse(0.1235567, click),
            Event::mouse(
                0.3,
                MouseEvent::new(MousePhase::Wheel, (700, 300), CoordMode::Absolute).with_wheel_delta(-3),
            ),
            Event::key(0.45, "ControlLeft", KeyPhase::Up),
        ]);
        timeline.set_delay_jitter(1, Some(0.05));
        timeline
    }

    #[test]
    fn test_filename_mapping() {
        assert_eq!(key_to_filename("Ctrl+→↓"), "Ctrl_RD.json");
        assert_eq!(key_to_filename("NONE+tooShort"), "NONE_tooShort.json");
        assert_eq!(key_to_filename("Shift+Alt+←↑•"), "Shift_Alt_LUO.json");
        assert_eq!(key_to_filename("../etc"), "___etc.json");
    }

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMacroStore::new(dir.path());
        let timeline = sample();

        assert!(store.save("Ctrl+→↓", &timeline));
        assert_eq!(store.load("Ctrl+→↓"), Some(timeline));
        assert!(dir.path().join("macros").join("Ctrl_RD.json").exists());
    }

    #[test]
    fn test_empty_timeline_is_not_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMacroStore::new(dir.path());

        assert_eq!(store.load("NONE+→"), None);
        assert!(store.save("NONE+→", &EventTimeline::new()));
        assert_eq!(store.load("NONE+→"), Some(EventTimeline::new()));
    }

    #[test]
    fn test_malformed_file_reads_as_missing() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMacroStore::new(dir.path());
        fs::create_dir_all(dir.path().join("macros")).unwrap();
        fs::write(dir.path().join("macros").join("NONE_R.json"), "{ not json").unwrap();

        assert_eq!(store.load("NONE+→"), None);
        assert!(store.list_keys().is_empty());
    }

    #[test]
    fn test_legacy_file_loads() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMacroStore::new(dir.path());
        fs::create_dir_all(dir.path().join("macros")).unwrap();
        let legacy = r#"{"key": "Alt+↑", "events": [
            {"type": "mouse", "time": 0.0, "event_type": "down", "button": "left",
             "position": [10, 20], "is_relative": true},
            {"type": "delay", "time": 0.05, "delay": 0.05}
        ]}"#;
        fs::write(dir.path().join("macros").join("Alt_U.json"), legacy).unwrap();

        let timeline = store.load("Alt+↑").unwrap();
        assert_eq!(timeline.len(), 2);
        let mouse = timeline.events()[0].as_mouse().unwrap();
        assert_eq!(mouse.coord_mode, CoordMode::MonitorRelative);
        assert_eq!(mouse.position, (10, 20));
    }

    #[test]
    fn test_delete() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMacroStore::new(dir.path());
        assert!(store.save("NONE+→", &sample()));
        assert!(store.save("NONE+←", &sample()));
        store.get_ordered_mappings();

        assert!(store.delete("NONE+→"));
        assert!(!store.delete("NONE+→"));
        assert_eq!(store.list_keys(), vec!["NONE+←".to_string()]);
        let order: Vec<OrderEntry> =
            serde_json::from_str(&fs::read_to_string(dir.path().join(ORDER_FILE)).unwrap()).unwrap();
        assert_eq!(order.len(), 1);
    }

    #[test]
    fn test_order_reconciliation() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMacroStore::new(dir.path());
        for key in ["NONE+→", "Ctrl+↓", "Alt+←"] {
            assert!(store.save(key, &sample()));
        }
        let stale = vec![
            OrderEntry { key: "Ctrl+↓".into(), file: "Ctrl_D.json".into() },
            OrderEntry { key: "Gone+→".into(), file: "Gone_R.json".into() },
            OrderEntry { key: "NONE+→".into(), file: "NONE_R.json".into() },
        ];
        fs::write(dir.path().join(ORDER_FILE), serde_json::to_string(&stale).unwrap()).unwrap();

        let mappings = store.get_ordered_mappings();
        let keys: Vec<&str> = mappings.keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["Ctrl+↓", "NONE+→", "Alt+←"]);
        assert_eq!(mappings["Alt+←"], "Alt_L.json");

        let rewritten: Vec<OrderEntry> =
            serde_json::from_str(&fs::read_to_string(dir.path().join(ORDER_FILE)).unwrap()).unwrap();
        assert_eq!(rewritten.len(), 3);
        assert_eq!(rewritten[2].key, "Alt+←");
    }

    #[test]
    fn test_reorder() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileMacroStore::new(dir.path());
        for key in ["A+→", "B+→", "C+→"] {
            assert!(store.save(key, &EventTimeline::new()));
        }
        assert!(store.reorder(&["C+→".to_string(), "nope".to_string(), "A+→".to_string()]));
        let keys: Vec<String> = store.get_ordered_mappings().into_keys().collect();
        assert_eq!(keys, vec!["C+→", "A+→", "B+→"]);
    }
}
