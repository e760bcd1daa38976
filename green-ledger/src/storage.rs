//! Persistent key-value substrate
//!
//! The ledger is persisted as a handful of text entries in a key-value store
//! shared by every view on the device. A store must:
//!
//! - apply all writes of one `commit` as a single atomic unit
//! - publish a `StorageEvent` per changed key after the commit succeeded
//!
//! # Backends
//!
//! - `MemoryStore` - process-local map, used in tests and for the `memory` backend
//! - `RocksStore` - RocksDB, one `ledger` column family, commits as a `WriteBatch`

use crate::{
    error::{Error, Result},
    types::ViewId,
    Config,
};
use parking_lot::{Mutex, RwLock};
use rocksdb::{BoundColumnFamily, ColumnFamilyDescriptor, Options, WriteBatch, WriteOptions, DB};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// Column family holding ledger entries
const CF_LEDGER: &str = "ledger";

/// Default buffered events per change-feed receiver
pub const DEFAULT_FEED_CAPACITY: usize = 256;

/// Change notification for one key, emitted after a successful commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    /// Key that changed
    pub key: String,
    /// Value before the commit
    pub old_value: Option<String>,
    /// Value after the commit
    pub new_value: Option<String>,
    /// View that performed the write
    pub origin: ViewId,
}

/// Shared key-value substrate with a native change feed
pub trait KeyValueStore: Send + Sync {
    /// Read a single entry
    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Write all entries atomically on behalf of `origin`
    fn commit(&self, origin: ViewId, writes: Vec<(String, String)>) -> Result<()>;

    /// Subscribe to the change feed
    fn watch(&self) -> broadcast::Receiver<StorageEvent>;
}

fn publish_events(feed: &broadcast::Sender<StorageEvent>, events: Vec<StorageEvent>) {
    for event in events {
        // No receivers is fine: no other view is open
        let _ = feed.send(event);
    }
}

/// In-memory substrate
pub struct MemoryStore {
    entries: RwLock<HashMap<String, String>>,
    feed: broadcast::Sender<StorageEvent>,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new(feed_capacity: usize) -> Self {
        let (feed, _) = broadcast::channel(feed_capacity.max(1));
        Self {
            entries: RwLock::new(HashMap::new()),
            feed,
        }
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Whether nothing has been stored yet
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_FEED_CAPACITY)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.read().get(key).cloned())
    }

    fn commit(&self, origin: ViewId, writes: Vec<(String, String)>) -> Result<()> {
        let mut events = Vec::with_capacity(writes.len());
        {
            let mut entries = self.entries.write();
            for (key, value) in writes {
                let old_value = entries.insert(key.clone(), value.clone());
                if old_value.as_deref() != Some(value.as_str()) {
                    events.push(StorageEvent {
                        key,
                        old_value,
                        new_value: Some(value),
                        origin,
                    });
                }
            }
        }

        publish_events(&self.feed, events);
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<StorageEvent> {
        self.feed.subscribe()
    }
}

/// RocksDB substrate
///
/// RocksDB locks its directory, so one process owns a device's ledger and every
/// view of the application reaches it through that process.
pub struct RocksStore {
    db: Arc<DB>,
    sync_writes: bool,
    // Serializes read-old-value + write so feed events carry the right old value
    commit_lock: Mutex<()>,
    feed: broadcast::Sender<StorageEvent>,
}

impl RocksStore {
    /// Open or create database
    pub fn open(config: &Config) -> Result<Self> {
        let path = &config.data_dir;

        // Create directory if not exists
        std::fs::create_dir_all(path)?;

        // Database options
        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_write_buffer_size(config.rocksdb.write_buffer_size_mb * 1024 * 1024);

        if config.rocksdb.enable_statistics {
            db_opts.enable_statistics();
        }

        let cf_descriptors = vec![ColumnFamilyDescriptor::new(CF_LEDGER, Options::default())];

        let db = DB::open_cf_descriptors(&db_opts, path, cf_descriptors)?;

        tracing::info!(path = ?path, "Opened RocksDB ledger store");

        let (feed, _) = broadcast::channel(config.feed_capacity.max(1));

        Ok(Self {
            db: Arc::new(db),
            sync_writes: config.rocksdb.sync_writes,
            commit_lock: Mutex::new(()),
            feed,
        })
    }

    fn cf_handle(&self) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(CF_LEDGER)
            .ok_or_else(|| Error::Storage(format!("Column family {} not found", CF_LEDGER)))
    }

    fn decode(key: &str, bytes: Vec<u8>) -> Result<String> {
        String::from_utf8(bytes)
            .map_err(|e| Error::Storage(format!("Entry {} is not valid UTF-8: {}", key, e)))
    }

    /// Close database (graceful shutdown)
    pub fn close(self) -> Result<()> {
        drop(self.db);
        tracing::info!("RocksDB closed gracefully");
        Ok(())
    }
}

impl KeyValueStore for RocksStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let cf = self.cf_handle()?;
        self.db
            .get_cf(&cf, key.as_bytes())?
            .map(|bytes| Self::decode(key, bytes))
            .transpose()
    }

    fn commit(&self, origin: ViewId, writes: Vec<(String, String)>) -> Result<()> {
        let events = {
            let _guard = self.commit_lock.lock();
            let cf = self.cf_handle()?;

            let mut batch = WriteBatch::default();
            let mut events = Vec::with_capacity(writes.len());

            for (key, value) in writes {
                let old_value = self
                    .db
                    .get_cf(&cf, key.as_bytes())?
                    .map(|bytes| Self::decode(&key, bytes))
                    .transpose()?;

                batch.put_cf(&cf, key.as_bytes(), value.as_bytes());

                if old_value.as_deref() != Some(value.as_str()) {
                    events.push(StorageEvent {
                        key,
                        old_value,
                        new_value: Some(value),
                        origin,
                    });
                }
            }

            let mut write_opts = WriteOptions::default();
            write_opts.set_sync(self.sync_writes);

            // Atomic commit
            self.db.write_opt(batch, &write_opts)?;
            events
        };

        tracing::debug!(%origin, changed = events.len(), "Ledger entries committed");

        publish_events(&self.feed, events);
        Ok(())
    }

    fn watch(&self) -> broadcast::Receiver<StorageEvent> {
        self.feed.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_config() -> (Config, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.data_dir = temp_dir.path().to_path_buf();
        (config, temp_dir)
    }

    fn writes(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_memory_commit_and_get() {
        let store = MemoryStore::default();
        assert!(store.is_empty());

        store
            .commit(ViewId::system(), writes(&[("a", "1"), ("b", "2")]))
            .unwrap();

        assert_eq!(store.get("a").unwrap().as_deref(), Some("1"));
        assert_eq!(store.get("b").unwrap().as_deref(), Some("2"));
        assert_eq!(store.get("c").unwrap(), None);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_memory_feed_carries_old_and_new() {
        let store = MemoryStore::default();
        let origin = ViewId::new();

        store.commit(origin, writes(&[("ledger.balance", "10")])).unwrap();
        let mut feed = store.watch();
        store.commit(origin, writes(&[("ledger.balance", "30")])).unwrap();

        let event = feed.try_recv().unwrap();
        assert_eq!(event.key, "ledger.balance");
        assert_eq!(event.old_value.as_deref(), Some("10"));
        assert_eq!(event.new_value.as_deref(), Some("30"));
        assert_eq!(event.origin, origin);
    }

    #[test]
    fn test_memory_feed_skips_unchanged_values() {
        let store = MemoryStore::default();
        store.commit(ViewId::system(), writes(&[("k", "v")])).unwrap();

        let mut feed = store.watch();
        store.commit(ViewId::system(), writes(&[("k", "v")])).unwrap();
        assert!(feed.try_recv().is_err());
    }

    #[test]
    fn test_rocks_open() {
        let (config, _temp) = test_config();
        let store = RocksStore::open(&config).unwrap();
        assert!(store.db.cf_handle(CF_LEDGER).is_some());
    }

    #[test]
    fn test_rocks_commit_and_get() {
        let (config, _temp) = test_config();
        let store = RocksStore::open(&config).unwrap();
        let mut feed = store.watch();

        store
            .commit(ViewId::system(), writes(&[("ledger.balance", "20"), ("x", "y")]))
            .unwrap();

        assert_eq!(store.get("ledger.balance").unwrap().as_deref(), Some("20"));
        assert_eq!(store.get("x").unwrap().as_deref(), Some("y"));

        let event = feed.try_recv().unwrap();
        assert_eq!(event.key, "ledger.balance");
        assert_eq!(event.old_value, None);
    }

    #[test]
    fn test_rocks_survives_reopen() {
        let (config, _temp) = test_config();
        {
            let store = RocksStore::open(&config).unwrap();
            store
                .commit(ViewId::system(), writes(&[("ledger.balance", "42")]))
                .unwrap();
            store.close().unwrap();
        }

        let store = RocksStore::open(&config).unwrap();
        assert_eq!(store.get("ledger.balance").unwrap().as_deref(), Some("42"));
    }
}
