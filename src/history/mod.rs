pub mod backend;
pub mod lock;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::DeployError;

use backend::{FileBackend, LedgerBackend};

/// Number of history entries retained per environment.
pub const HISTORY_LIMIT: usize = 10;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(alias = "artifact")]
    pub image: String,
    pub timestamp: DateTime<Utc>,
    pub action: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeploymentRecord {
    #[serde(default)]
    pub current: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    #[serde(default, alias = "last_deployment_time")]
    pub last_deployment: Option<DateTime<Utc>>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl DeploymentRecord {
    /// Applies a committed transition: the live image becomes `previous`,
    /// `image` becomes live and the history is trimmed to the newest entries.
    pub fn commit(&mut self, image: &str, action: &str, timestamp: DateTime<Utc>) {
        self.previous = self.current.replace(image.to_string());
        self.last_deployment = Some(timestamp);
        self.history.push(HistoryEntry {
            image: image.to_string(),
            timestamp,
            action: action.to_string(),
            extra: Map::new(),
        });

        if self.history.len() > HISTORY_LIMIT {
            let overflow = self.history.len() - HISTORY_LIMIT;
            self.history.drain(..overflow);
        }
    }
}

/// The whole ledger document: one record per environment, plus any
/// top-level keys this version does not understand, kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct Ledger {
    environments: BTreeMap<String, DeploymentRecord>,
    other: Map<String, Value>,
}

impl Ledger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.environments.is_empty()
    }

    pub fn get(&self, environment: &str) -> Option<&DeploymentRecord> {
        self.environments.get(environment)
    }

    /// The environment's record, created empty if absent. A foreign value
    /// stored under the same key is replaced.
    pub fn record_mut(&mut self, environment: &str) -> &mut DeploymentRecord {
        self.other.remove(environment);
        self.environments.entry(environment.to_string()).or_default()
    }
}

// Each key is parsed on its own so one unreadable entry cannot take the
// other environments down with it.
impl From<Map<String, Value>> for Ledger {
    fn from(document: Map<String, Value>) -> Self {
        let mut ledger = Ledger::new();
        for (key, value) in document {
            if value.is_object() {
                match serde_json::from_value::<DeploymentRecord>(value.clone()) {
                    Ok(record) => {
                        ledger.environments.insert(key, record);
                        continue;
                    }
                    Err(e) => warn!(
                        "Ledger entry '{}' is not a deployment record ({}); keeping it as is",
                        key, e
                    ),
                }
            }
            ledger.other.insert(key, value);
        }
        ledger
    }
}

impl Serialize for Ledger {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.other.len() + self.environments.len()))?;
        for (key, value) in &self.other {
            map.serialize_entry(key, value)?;
        }
        for (key, record) in &self.environments {
            map.serialize_entry(key, record)?;
        }
        map.end()
    }
}

/// Durable per-environment deployment state.
///
/// Reads never fail on a malformed document: the ledger is reset to empty,
/// the reset is persisted and a warning is logged. Writes are serialized
/// through an in-process mutex and each one replaces the whole document.
pub struct HistoryStore {
    backend: Box<dyn LedgerBackend>,
    write_lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(backend: impl LedgerBackend + 'static) -> Self {
        Self {
            backend: Box::new(backend),
            write_lock: Mutex::new(()),
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self::new(FileBackend::new(path))
    }

    pub fn location(&self) -> String {
        self.backend.describe()
    }

    pub fn load(&self) -> Result<Ledger, DeployError> {
        let Some(content) = self.backend.read()? else {
            return Ok(Ledger::new());
        };

        if content.trim().is_empty() {
            return Ok(Ledger::new());
        }

        match serde_json::from_str::<Ledger>(&content) {
            Ok(ledger) => Ok(ledger),
            Err(e) => {
                let corruption = DeployError::LedgerCorruption(e.to_string());
                warn!(
                    "{} ({}); resetting to an empty ledger",
                    corruption,
                    self.backend.describe()
                );
                let empty = Ledger::new();
                self.persist(&empty)?;
                Ok(empty)
            }
        }
    }

    pub fn get(&self, environment: &str) -> Result<Option<DeploymentRecord>, DeployError> {
        Ok(self.load()?.get(environment).cloned())
    }

    pub fn current_image(&self, environment: &str) -> Result<Option<String>, DeployError> {
        Ok(self.get(environment)?.and_then(|r| r.current))
    }

    pub fn previous_image(&self, environment: &str) -> Result<Option<String>, DeployError> {
        Ok(self.get(environment)?.and_then(|r| r.previous))
    }

    /// Records a committed transition and returns the updated record.
    pub fn record(
        &self,
        environment: &str,
        image: &str,
        action: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<DeploymentRecord, DeployError> {
        let _guard = self
            .write_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut ledger = self.load()?;
        let record = ledger.record_mut(environment);
        record.commit(image, action, timestamp);
        let updated = record.clone();

        self.persist(&ledger)?;
        debug!(
            "Recorded {} of {} for {} in {}",
            action,
            image,
            environment,
            self.backend.describe()
        );
        Ok(updated)
    }

    fn persist(&self, ledger: &Ledger) -> Result<(), DeployError> {
        let content = serde_json::to_string_pretty(ledger)
            .map_err(|e| DeployError::LedgerCorruption(e.to_string()))?;
        self.backend.write(&content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::backend::MemoryBackend;
    use super::*;
    use chrono::{Duration, TimeZone};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap() + Duration::minutes(minute)
    }

    #[test]
    fn empty_store_has_no_images() {
        let store = HistoryStore::new(MemoryBackend::default());
        assert!(store.load().unwrap().is_empty());
        assert_eq!(store.current_image("dev").unwrap(), None);
        assert_eq!(store.previous_image("dev").unwrap(), None);
    }

    #[test]
    fn record_shifts_current_into_previous() {
        let store = HistoryStore::new(MemoryBackend::default());

        let first = store.record("dev", "app:a", "deploy", at(0)).unwrap();
        assert_eq!(first.current.as_deref(), Some("app:a"));
        assert_eq!(first.previous, None);

        store.record("dev", "app:b", "update", at(1)).unwrap();
        assert_eq!(store.current_image("dev").unwrap().as_deref(), Some("app:b"));
        assert_eq!(store.previous_image("dev").unwrap().as_deref(), Some("app:a"));

        let record = store.get("dev").unwrap().unwrap();
        assert_eq!(record.last_deployment, Some(at(1)));
        assert_eq!(record.history.len(), 2);
    }

    #[test]
    fn history_keeps_latest_ten_in_order() {
        let store = HistoryStore::new(MemoryBackend::default());
        for i in 0..11 {
            store
                .record("dev", &format!("app:v{}", i), "deploy", at(i))
                .unwrap();
        }

        let record = store.get("dev").unwrap().unwrap();
        let images: Vec<_> = record.history.iter().map(|e| e.image.as_str()).collect();
        let expected: Vec<String> = (1..11).map(|i| format!("app:v{}", i)).collect();
        assert_eq!(images, expected);
        assert_eq!(record.current.as_deref(), Some("app:v10"));
        assert_eq!(record.previous.as_deref(), Some("app:v9"));
    }

    #[test]
    fn environments_are_isolated() {
        let store = HistoryStore::new(MemoryBackend::default());
        store.record("dev", "app:dev", "deploy", at(0)).unwrap();
        store.record("prod", "app:prod", "deploy", at(1)).unwrap();
        store.record("dev", "app:dev2", "update", at(2)).unwrap();

        let prod = store.get("prod").unwrap().unwrap();
        assert_eq!(prod.current.as_deref(), Some("app:prod"));
        assert_eq!(prod.previous, None);
        assert_eq!(prod.history.len(), 1);
    }

    #[test]
    fn corrupt_ledger_is_reset_and_persisted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("deployments.json");
        std::fs::write(&path, "{\"dev\": {\"current\": ").unwrap();

        let store = HistoryStore::open(&path);
        assert!(store.load().unwrap().is_empty());

        let on_disk = std::fs::read_to_string(&path).unwrap();
        assert!(serde_json::from_str::<Ledger>(&on_disk).unwrap().is_empty());

        store.record("dev", "app:a", "deploy", at(0)).unwrap();
        let on_disk = std::fs::read_to_string(&path).unwrap();
        let ledger: Ledger = serde_json::from_str(&on_disk).unwrap();
        assert_eq!(ledger.get("dev").unwrap().current.as_deref(), Some("app:a"));
    }

    #[test]
    fn wrong_shape_counts_as_corruption() {
        let store = HistoryStore::new(MemoryBackend::with_contents("[1, 2, 3]"));
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn unknown_fields_survive_a_write() {
        let seeded = r#"{
            "dev": {
                "current": "app:a",
                "previous": null,
                "last_deployment": "2026-03-01T12:00:00Z",
                "owner": "team-web",
                "history": [
                    {"image": "app:a", "timestamp": "2026-03-01T12:00:00Z", "action": "deploy", "ticket": "OPS-1"}
                ]
            },
            "legacy": {"notes": "kept"}
        }"#;
        let store = HistoryStore::new(MemoryBackend::with_contents(seeded));

        store.record("dev", "app:b", "update", at(5)).unwrap();

        let ledger = store.load().unwrap();
        let dev = ledger.get("dev").unwrap();
        assert_eq!(dev.extra.get("owner"), Some(&Value::from("team-web")));
        assert_eq!(
            dev.history[0].extra.get("ticket"),
            Some(&Value::from("OPS-1"))
        );
        assert_eq!(
            ledger.get("legacy").unwrap().extra.get("notes"),
            Some(&Value::from("kept"))
        );
    }

    #[test]
    fn foreign_top_level_keys_leave_environments_intact() {
        let seeded = r#"{
            "schema_version": 2,
            "dev": {"current": "app:d", "previous": null, "history": []},
            "prod": {"current": "app:p", "previous": "app:o", "history": []},
            "staging": {"current": 42}
        }"#;
        let store = HistoryStore::new(MemoryBackend::with_contents(seeded));

        assert_eq!(store.current_image("prod").unwrap().as_deref(), Some("app:p"));
        assert_eq!(store.previous_image("prod").unwrap().as_deref(), Some("app:o"));
        assert_eq!(store.current_image("staging").unwrap(), None);

        store.record("dev", "app:d2", "update", at(0)).unwrap();

        let on_disk: Value = serde_json::from_str(&store.backend.read().unwrap().unwrap()).unwrap();
        assert_eq!(on_disk["schema_version"], Value::from(2));
        assert_eq!(on_disk["staging"]["current"], Value::from(42));
        assert_eq!(on_disk["prod"]["current"], Value::from("app:p"));
        assert_eq!(on_disk["dev"]["current"], Value::from("app:d2"));
        assert_eq!(on_disk["dev"]["previous"], Value::from("app:d"));
    }

    #[test]
    fn reads_artifact_and_last_deployment_time_spellings() {
        let seeded = r#"{
            "dev": {
                "current": "app:a",
                "last_deployment_time": "2026-03-01T12:00:00Z",
                "history": [{"artifact": "app:a", "timestamp": "2026-03-01T12:00:00Z", "action": "deploy"}]
            }
        }"#;
        let store = HistoryStore::new(MemoryBackend::with_contents(seeded));

        let dev = store.get("dev").unwrap().unwrap();
        assert_eq!(dev.last_deployment, Some(at(0)));
        assert_eq!(dev.history[0].image, "app:a");
    }

    #[test]
    fn concurrent_records_are_all_kept() {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(HistoryStore::open(dir.path().join("deployments.json")));

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    store
                        .record("dev", &format!("app:t{}", i), "deploy", at(i))
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let record = store.get("dev").unwrap().unwrap();
        assert_eq!(record.history.len(), 8);
        // previous always trails current by exactly one committed entry
        assert_eq!(record.previous.as_deref(), Some(record.history[6].image.as_str()));
        assert_eq!(record.current.as_deref(), Some(record.history[7].image.as_str()));
    }
}
