//! The durable record of armed notifications.
//!
//! An `ArmedSet` is an arena of `ArmedNotification` records with an index by
//! `EventId`. A `ScheduleStore` persists it one record at a time, so that a
//! pass interrupted halfway leaves the store matching exactly the gateway
//! calls that succeeded.

use crate::common::{ArmedId, EventId, NotificationHandle};
use crate::error::StoreError;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use slotmap::SlotMap;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, RwLock};
use tracing::trace;

/// A notification the gateway accepted for one prayer event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmedNotification {
    pub event_id: EventId,
    pub handle: NotificationHandle,
    /// The instant the notification was armed to fire at.
    pub scheduled_for: DateTime<Utc>,
    pub armed_at: DateTime<Utc>,
}

/// The set of armed notifications, at most one per event.
#[derive(Debug, Clone, Default)]
pub struct ArmedSet {
    records: SlotMap<ArmedId, ArmedNotification>,
    by_event: HashMap<EventId, ArmedId>,
}

impl ArmedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a set from persisted records. A later record for the same event
    /// replaces an earlier one.
    pub fn from_records(records: impl IntoIterator<Item = ArmedNotification>) -> Self {
        let mut set = Self::new();
        for record in records {
            set.insert(record);
        }
        set
    }

    /// Inserts a record, returning the one it replaced for the same event.
    pub fn insert(&mut self, record: ArmedNotification) -> Option<ArmedNotification> {
        let replaced = self.remove(&record.event_id);
        let event_id = record.event_id.clone();
        let id = self.records.insert(record);
        self.by_event.insert(event_id, id);
        replaced
    }

    pub fn remove(&mut self, event_id: &EventId) -> Option<ArmedNotification> {
        let id = self.by_event.remove(event_id)?;
        self.records.remove(id)
    }

    pub fn get(&self, event_id: &EventId) -> Option<&ArmedNotification> {
        self.by_event
            .get(event_id)
            .and_then(|id| self.records.get(*id))
    }

    pub fn contains(&self, event_id: &EventId) -> bool {
        self.by_event.contains_key(event_id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ArmedNotification> {
        self.records.values()
    }

    /// All records ordered by firing instant.
    pub fn records(&self) -> Vec<ArmedNotification> {
        let mut records: Vec<ArmedNotification> = self.records.values().cloned().collect();
        records.sort_by(|a, b| {
            a.scheduled_for
                .cmp(&b.scheduled_for)
                .then_with(|| a.event_id.cmp(&b.event_id))
        });
        records
    }

    /// Records whose handle the gateway no longer reports as pending.
    pub fn drifted(&self, pending: &HashSet<NotificationHandle>) -> Vec<ArmedNotification> {
        let mut drifted: Vec<ArmedNotification> = self
            .records
            .values()
            .filter(|r| !pending.contains(&r.handle))
            .cloned()
            .collect();
        drifted.sort_by_key(|r| r.scheduled_for);
        drifted
    }
}

/// Durable storage for the armed set.
#[async_trait]
pub trait ScheduleStore: Send + Sync {
    async fn load(&self) -> Result<ArmedSet, StoreError>;

    /// Records an armed notification, replacing any record for the same event.
    async fn insert(&self, record: ArmedNotification) -> Result<(), StoreError>;

    /// Forgets an event. Removing an unknown event is not an error.
    async fn remove(&self, event_id: &EventId) -> Result<(), StoreError>;
}

/// Keeps the armed set in memory. Read and write failures can be switched on
/// to exercise the fatal-store paths.
#[derive(Debug, Default)]
pub struct MemoryScheduleStore {
    set: RwLock<ArmedSet>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryScheduleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// The current contents, bypassing any injected failure.
    pub async fn snapshot(&self) -> ArmedSet {
        self.set.read().await.clone()
    }

    fn check(&self, flag: &AtomicBool, op: &str) -> Result<(), StoreError> {
        if flag.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!("{} failed", op)));
        }
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for MemoryScheduleStore {
    async fn load(&self) -> Result<ArmedSet, StoreError> {
        self.check(&self.fail_reads, "read")?;
        Ok(self.set.read().await.clone())
    }

    async fn insert(&self, record: ArmedNotification) -> Result<(), StoreError> {
        self.check(&self.fail_writes, "write")?;
        self.set.write().await.insert(record);
        Ok(())
    }

    async fn remove(&self, event_id: &EventId) -> Result<(), StoreError> {
        self.check(&self.fail_writes, "write")?;
        self.set.write().await.remove(event_id);
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    armed: Vec<ArmedNotification>,
}

/// Persists the armed set as a JSON document, rewritten atomically on every change.
///
/// A missing file is an empty set. A file that cannot be parsed is reported
/// as `StoreError::Corrupt` and left in place.
#[derive(Debug)]
pub struct JsonFileScheduleStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileScheduleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_file(&self) -> Result<ArmedSet, StoreError> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(ArmedSet::new()),
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };
        let file: StoreFile =
            serde_json::from_slice(&bytes).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        Ok(ArmedSet::from_records(file.armed))
    }

    async fn write_file(&self, set: &ArmedSet) -> Result<(), StoreError> {
        let file = StoreFile {
            armed: set.records(),
        };
        let bytes = serde_json::to_vec_pretty(&file).map_err(|source| StoreError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(io_err)?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(io_err)?;
        trace!(path = %self.path.display(), records = set.len(), "schedule store written");
        Ok(())
    }
}

#[async_trait]
impl ScheduleStore for JsonFileScheduleStore {
    async fn load(&self) -> Result<ArmedSet, StoreError> {
        self.read_file().await
    }

    async fn insert(&self, record: ArmedNotification) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut set = self.read_file().await?;
        set.insert(record);
        self.write_file(&set).await
    }

    async fn remove(&self, event_id: &EventId) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut set = self.read_file().await?;
        if set.remove(event_id).is_none() {
            return Ok(());
        }
        self.write_file(&set).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn record(event: &str, handle: u64, hour: u32) -> ArmedNotification {
        let at = Utc.with_ymd_and_hms(2026, 10, 16, hour, 0, 0).unwrap();
        ArmedNotification {
            event_id: event.parse().unwrap(),
            handle: NotificationHandle(handle),
            scheduled_for: at,
            armed_at: at - chrono::Duration::hours(1),
        }
    }

    #[test]
    fn armed_set_keeps_one_record_per_event() {
        let mut set = ArmedSet::new();
        assert!(set.insert(record("2026-10-16/fajr", 1, 3)).is_none());
        let replaced = set.insert(record("2026-10-16/fajr", 2, 3)).unwrap();
        assert_eq!(replaced.handle, NotificationHandle(1));
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.get(&"2026-10-16/fajr".parse().unwrap()).unwrap().handle,
            NotificationHandle(2)
        );
    }

    #[test]
    fn drifted_lists_records_missing_from_gateway() {
        let set = ArmedSet::from_records([
            record("2026-10-16/fajr", 1, 3),
            record("2026-10-16/dhuhr", 2, 9),
            record("2026-10-16/asr", 3, 12),
        ]);
        let pending = HashSet::from([NotificationHandle(2)]);
        let drifted: Vec<String> = set
            .drifted(&pending)
            .into_iter()
            .map(|r| r.event_id.to_string())
            .collect();
        assert_eq!(drifted, vec!["2026-10-16/fajr", "2026-10-16/asr"]);
    }

    #[tokio::test]
    async fn json_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("armed.json");
        let store = JsonFileScheduleStore::new(&path);
        assert!(store.load().await.unwrap().is_empty());

        store.insert(record("2026-10-16/fajr", 1, 3)).await.unwrap();
        store.insert(record("2026-10-16/dhuhr", 2, 9)).await.unwrap();
        store
            .remove(&"2026-10-16/fajr".parse().unwrap())
            .await
            .unwrap();

        let reopened = JsonFileScheduleStore::new(&path);
        let set = reopened.load().await.unwrap();
        assert_eq!(set.records(), vec![record("2026-10-16/dhuhr", 2, 9)]);
    }

    #[tokio::test]
    async fn corrupt_file_is_reported_and_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("armed.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = JsonFileScheduleStore::new(&path);
        assert!(matches!(
            store.load().await,
            Err(StoreError::Corrupt { .. })
        ));
        assert!(store.insert(record("2026-10-16/fajr", 1, 3)).await.is_err());
        assert_eq!(std::fs::read(&path).unwrap(), b"{ not json");
    }

    #[tokio::test]
    async fn memory_store_failures_are_injectable() {
        let store = MemoryScheduleStore::new();
        store.insert(record("2026-10-16/fajr", 1, 3)).await.unwrap();
        store.set_fail_writes(true);
        assert!(store.insert(record("2026-10-16/isha", 2, 16)).await.is_err());
        store.set_fail_reads(true);
        assert!(store.load().await.is_err());
        assert_eq!(store.snapshot().await.len(), 1);
    }
}
