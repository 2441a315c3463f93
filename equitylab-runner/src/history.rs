//! Simulation history — persisted config + summary records over a keyed store.
//!
//! `HistoryStore` owns id and timestamp assignment and the record layout; the
//! storage technology sits behind the `KeyValueStore` trait. Two stores ship
//! with the crate: an in-memory map (tests, ephemeral sessions) and a directory
//! of pretty-printed JSON files, one per record.
//!
//! Records are camelCase JSON:
//! `{id, config: {...SimulationConfig, createdAt}, summary, sampleRuns, createdAt, backupRef?}`
//! where `sampleRuns` is `null` when no raw paths were kept.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, warn};

use equitylab_core::{PathResult, SimulationConfig};

use crate::engine::SimulationReport;
use crate::summary::SimulationSummary;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("backup upload failed: {0}")]
    Backup(String),
    #[error("invalid history key: {0:?}")]
    InvalidKey(String),
    #[error("store lock poisoned")]
    Poisoned,
}

fn io_err(path: &Path, source: io::Error) -> StorageError {
    StorageError::Io {
        path: path.to_path_buf(),
        source,
    }
}

// ─── Keyed object store ─────────────────────────────────────────────

/// Opaque keyed object store holding serialized JSON values.
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    fn put(&self, key: &str, value: Value) -> Result<(), StorageError>;
    /// Returns `false` when the key was absent.
    fn delete(&self, key: &str) -> Result<bool, StorageError>;
    fn list_all(&self) -> Result<Vec<(String, Value)>, StorageError>;
}

/// In-memory store. Contents are lost on drop.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        entries.insert(key.to_string(), value);
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let mut entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries.remove(key).is_some())
    }

    fn list_all(&self) -> Result<Vec<(String, Value)>, StorageError> {
        let entries = self.entries.lock().map_err(|_| StorageError::Poisoned)?;
        Ok(entries
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }
}

/// One `{key}.json` file per record under a directory.
///
/// Writes go to a temporary file first and are renamed into place, so a
/// crash mid-write never leaves a truncated record behind.
#[derive(Debug, Clone)]
pub struct JsonDirStore {
    dir: PathBuf,
}

impl JsonDirStore {
    /// Open (creating if needed) a store rooted at `dir`.
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StorageError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|e| io_err(&dir, e))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StorageError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !valid {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

impl KeyValueStore for JsonDirStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let path = self.path_for(key)?;
        match fs::read_to_string(&path) {
            Ok(text) => Ok(Some(serde_json::from_str(&text)?)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    fn put(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let path = self.path_for(key)?;
        let tmp = self.dir.join(format!(".{key}.json.tmp"));
        let json = serde_json::to_string_pretty(&value)?;
        fs::write(&tmp, json).map_err(|e| io_err(&tmp, e))?;
        fs::rename(&tmp, &path).map_err(|e| io_err(&path, e))?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool, StorageError> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(io_err(&path, e)),
        }
    }

    fn list_all(&self) -> Result<Vec<(String, Value)>, StorageError> {
        let mut out = Vec::new();
        for entry in fs::read_dir(&self.dir).map_err(|e| io_err(&self.dir, e))? {
            let entry = entry.map_err(|e| io_err(&self.dir, e))?;
            let path = entry.path();
            if !path.is_file() || path.extension().and_then(|s| s.to_str()) != Some("json") {
                continue;
            }
            let Some(key) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            if key.starts_with('.') {
                continue;
            }
            let parsed = fs::read_to_string(&path)
                .map_err(|e| e.to_string())
                .and_then(|text| serde_json::from_str::<Value>(&text).map_err(|e| e.to_string()));
            match parsed {
                Ok(value) => out.push((key.to_string(), value)),
                Err(reason) => {
                    warn!(path = %path.display(), %reason, "skipping unreadable history record");
                }
            }
        }
        out.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(out)
    }
}

// ─── Records ────────────────────────────────────────────────────────

/// The config as persisted: every `SimulationConfig` field plus `createdAt`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredConfig {
    #[serde(flatten)]
    pub config: SimulationConfig,
    pub created_at: DateTime<Utc>,
}

/// One saved simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryItem {
    pub id: String,
    pub config: StoredConfig,
    pub summary: SimulationSummary,
    pub sample_runs: Option<Vec<PathResult>>,
    pub created_at: DateTime<Utc>,
    /// Reference returned by the backup sink, when one is attached.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_ref: Option<String>,
}

/// External backup target for saved items.
pub trait BackupSink: Send + Sync {
    /// Upload `item` and return an opaque reference to the stored copy.
    fn upload(&self, item: &HistoryItem) -> Result<String, StorageError>;
}

/// Assign a fresh history id: `sim-` + 16 hex chars.
///
/// Mixes the config hash, the save timestamp, and a random nonce so two saves
/// of the same config in the same instant still get distinct ids.
fn new_history_id(config: &SimulationConfig, created_at: &DateTime<Utc>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(config.config_hash().as_bytes());
    hasher.update(created_at.to_rfc3339().as_bytes());
    hasher.update(&rand::random::<u64>().to_le_bytes());
    let hex = hasher.finalize().to_hex();
    format!("sim-{}", &hex.as_str()[..16])
}

// ─── HistoryStore ───────────────────────────────────────────────────

/// Save, list, fetch, and delete simulation records.
pub struct HistoryStore<S: KeyValueStore> {
    store: S,
    backup: Option<Box<dyn BackupSink>>,
}

impl<S: KeyValueStore> HistoryStore<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            backup: None,
        }
    }

    /// Upload every saved item to `sink` before persisting it locally.
    pub fn with_backup(mut self, sink: Box<dyn BackupSink>) -> Self {
        self.backup = Some(sink);
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Persist a config and its summary, assigning id and timestamp.
    ///
    /// With a backup sink attached, an upload failure aborts the save and
    /// nothing is written.
    pub fn save(
        &self,
        config: &SimulationConfig,
        summary: &SimulationSummary,
        sample_runs: Option<&[PathResult]>,
    ) -> Result<HistoryItem, StorageError> {
        let created_at = Utc::now();
        let mut item = HistoryItem {
            id: new_history_id(config, &created_at),
            config: StoredConfig {
                config: config.clone(),
                created_at,
            },
            summary: summary.clone(),
            sample_runs: sample_runs.map(<[PathResult]>::to_vec),
            created_at,
            backup_ref: None,
        };

        if let Some(sink) = &self.backup {
            let reference = sink.upload(&item)?;
            debug!(id = %item.id, %reference, "history item backed up");
            item.backup_ref = Some(reference);
        }

        self.store.put(&item.id, serde_json::to_value(&item)?)?;
        info!(id = %item.id, "saved simulation to history");
        Ok(item)
    }

    /// Save a completed engine report, keeping its sample runs when non-empty.
    pub fn save_report(
        &self,
        config: &SimulationConfig,
        report: &SimulationReport,
    ) -> Result<HistoryItem, StorageError> {
        let sample = (!report.sample_runs.is_empty()).then_some(report.sample_runs.as_slice());
        self.save(config, &report.summary, sample)
    }

    /// All items, newest first.
    ///
    /// Records that no longer parse as a `HistoryItem` are skipped.
    pub fn list(&self) -> Result<Vec<HistoryItem>, StorageError> {
        let mut items: Vec<HistoryItem> = self
            .store
            .list_all()?
            .into_iter()
            .filter_map(|(key, value)| match serde_json::from_value(value) {
                Ok(item) => Some(item),
                Err(e) => {
                    warn!(key = %key, error = %e, "skipping malformed history item");
                    None
                }
            })
            .collect();
        items.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| b.id.cmp(&a.id))
        });
        Ok(items)
    }

    pub fn get(&self, id: &str) -> Result<Option<HistoryItem>, StorageError> {
        match self.store.get(id)? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Returns `false` when no item has this id.
    pub fn delete(&self, id: &str) -> Result<bool, StorageError> {
        let removed = self.store.delete(id)?;
        if removed {
            info!(id, "deleted simulation from history");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{run_simulation, EngineOptions};
    use crate::summary::summarize;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn config() -> SimulationConfig {
        SimulationConfig {
            name: Some("breakout".into()),
            simulations: 40,
            max_trades_per_run: 25,
            win_prob: 0.55,
            expectancy_r: 1.2,
            risk_per_trade_pct: Some(0.01),
            initial_capital: 5_000.0,
            seed: Some(3),
            sample_runs_to_keep: 3,
            ..SimulationConfig::default()
        }
    }

    fn report() -> SimulationReport {
        run_simulation(&config(), &EngineOptions::default(), None, None).unwrap()
    }

    #[test]
    fn save_then_get_round_trips() {
        let history = HistoryStore::new(MemoryStore::new());
        let report = report();
        let saved = history.save_report(&config(), &report).unwrap();

        let loaded = history.get(&saved.id).unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(loaded.config.config, config());
        assert_eq!(loaded.summary, report.summary);
        assert_eq!(loaded.sample_runs.as_deref(), Some(report.sample_runs.as_slice()));
        assert!(saved.id.starts_with("sim-"));
    }

    #[test]
    fn missing_sample_serializes_as_null() {
        let history = HistoryStore::new(MemoryStore::new());
        let summary = summarize(&[], &config());
        let saved = history.save(&config(), &summary, None).unwrap();

        let raw = history.store().get(&saved.id).unwrap().unwrap();
        assert!(raw["sampleRuns"].is_null());
        assert!(raw["config"]["createdAt"].is_string());
        assert_eq!(raw["config"]["initialCapital"], 5_000.0);
        assert!(raw.get("backupRef").is_none());
    }

    #[test]
    fn list_is_newest_first() {
        let history = HistoryStore::new(MemoryStore::new());
        let summary = report().summary;
        let first = history.save(&config(), &summary, None).unwrap();
        std::thread::sleep(std::time::Duration::from_millis(5));
        let second = history.save(&config(), &summary, None).unwrap();

        let ids: Vec<String> = history.list().unwrap().into_iter().map(|i| i.id).collect();
        assert_eq!(ids, vec![second.id, first.id]);
    }

    #[test]
    fn delete_reports_presence() {
        let history = HistoryStore::new(MemoryStore::new());
        let saved = history.save(&config(), &report().summary, None).unwrap();
        assert!(history.delete(&saved.id).unwrap());
        assert!(!history.delete(&saved.id).unwrap());
        assert!(history.get(&saved.id).unwrap().is_none());
    }

    #[test]
    fn same_config_saved_twice_gets_distinct_ids() {
        let history = HistoryStore::new(MemoryStore::new());
        let summary = report().summary;
        let a = history.save(&config(), &summary, None).unwrap();
        let b = history.save(&config(), &summary, None).unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(history.list().unwrap().len(), 2);
    }

    struct CountingSink {
        uploads: Arc<AtomicUsize>,
    }

    impl BackupSink for CountingSink {
        fn upload(&self, item: &HistoryItem) -> Result<String, StorageError> {
            self.uploads.fetch_add(1, Ordering::Relaxed);
            Ok(format!("backup://{}", item.id))
        }
    }

    struct FailingSink;

    impl BackupSink for FailingSink {
        fn upload(&self, _item: &HistoryItem) -> Result<String, StorageError> {
            Err(StorageError::Backup("offline".into()))
        }
    }

    #[test]
    fn backup_reference_is_recorded() {
        let uploads = Arc::new(AtomicUsize::new(0));
        let history = HistoryStore::new(MemoryStore::new()).with_backup(Box::new(CountingSink {
            uploads: Arc::clone(&uploads),
        }));
        let saved = history.save(&config(), &report().summary, None).unwrap();

        assert_eq!(uploads.load(Ordering::Relaxed), 1);
        let loaded = history.get(&saved.id).unwrap().unwrap();
        assert_eq!(loaded.backup_ref, Some(format!("backup://{}", saved.id)));
    }

    #[test]
    fn failed_backup_persists_nothing() {
        let history = HistoryStore::new(MemoryStore::new()).with_backup(Box::new(FailingSink));
        let err = history.save(&config(), &report().summary, None).unwrap_err();
        assert!(matches!(err, StorageError::Backup(_)));
        assert!(history.store().is_empty());
    }

    #[test]
    fn dir_store_creates_nested_root() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("a").join("history");
        let store = JsonDirStore::open(&root).unwrap();
        assert_eq!(store.dir(), root.as_path());
        assert!(root.is_dir());
        store.put("abc", Value::Null).unwrap();
        assert!(store.dir().join("abc.json").is_file());
    }

    #[test]
    fn dir_store_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonDirStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.put("../escape", Value::Null),
            Err(StorageError::InvalidKey(_))
        ));
        assert!(matches!(store.get(""), Err(StorageError::InvalidKey(_))));
    }

    #[test]
    fn dir_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let saved = {
            let history = HistoryStore::new(JsonDirStore::open(dir.path()).unwrap());
            history.save_report(&config(), &report()).unwrap()
        };

        let reopened = HistoryStore::new(JsonDirStore::open(dir.path()).unwrap());
        let loaded = reopened.get(&saved.id).unwrap().unwrap();
        assert_eq!(loaded, saved);
        assert_eq!(reopened.list().unwrap().len(), 1);
    }

    #[test]
    fn dir_store_skips_malformed_files() {
        let dir = tempfile::tempdir().unwrap();
        let history = HistoryStore::new(JsonDirStore::open(dir.path()).unwrap());
        let saved = history.save(&config(), &report().summary, None).unwrap();

        fs::write(dir.path().join("garbage.json"), "{ not json").unwrap();
        fs::write(dir.path().join("wrong-shape.json"), r#"{"hello": 1}"#).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let items = history.list().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, saved.id);
    }
}
