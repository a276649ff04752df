//! Record Store Storage (JSON file)
//!
//! In-memory map guarded by a read/write lock, mirrored to a single JSON
//! document. The file is rewritten wholesale after each mutation.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, warn};

use super::StoreError;

/// Indentation used for the persisted document
const FILE_INDENT: &[u8] = b"    ";

/// Domain name → IPv4 address store
pub struct RecordStore {
    /// Current mapping
    records: RwLock<HashMap<String, Ipv4Addr>>,

    /// Backing file, `None` for a purely in-memory store
    path: Option<PathBuf>,

    /// Serializes writers so the file always receives snapshots in mutation order.
    /// Always taken before `records`.
    persist_lock: Mutex<()>,
}

impl RecordStore {
    /// Open the store backed by `path`.
    ///
    /// Loading is best-effort: a missing, unreadable or malformed file yields
    /// an empty store, and entries whose value is not an IPv4 address are
    /// skipped.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let records = load_records(&path);

        info!("📦 Loaded {} DNS records from {:?}", records.len(), path);

        Self {
            records: RwLock::new(records),
            path: Some(path),
            persist_lock: Mutex::new(()),
        }
    }

    /// Create a store with no backing file
    #[cfg(test)]
    pub fn in_memory() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
            path: None,
            persist_lock: Mutex::new(()),
        }
    }

    /// Path of the backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Address recorded for `name`, matched exactly
    pub async fn lookup(&self, name: &str) -> Option<Ipv4Addr> {
        self.records.read().await.get(name).copied()
    }

    /// Insert or replace every entry, then persist.
    ///
    /// If persisting fails the entries stay applied in memory.
    pub async fn upsert_many<I>(&self, entries: I) -> Result<(), StoreError>
    where
        I: IntoIterator<Item = (String, Ipv4Addr)>,
    {
        let _guard = self.persist_lock.lock().await;

        let encoded = {
            let mut records = self.records.write().await;
            records.extend(entries);
            self.encode(&records)?
        };

        self.write(encoded).await
    }

    /// Insert or replace a single entry, then persist
    pub async fn upsert_one(&self, name: impl Into<String>, address: Ipv4Addr) -> Result<(), StoreError> {
        self.upsert_many(std::iter::once((name.into(), address))).await
    }

    /// Remove `name`. Returns whether an entry existed; persists only if so.
    pub async fn remove(&self, name: &str) -> Result<bool, StoreError> {
        let _guard = self.persist_lock.lock().await;

        let encoded = {
            let mut records = self.records.write().await;
            if records.remove(name).is_none() {
                return Ok(false);
            }
            self.encode(&records)?
        };

        self.write(encoded).await?;
        Ok(true)
    }

    /// Copy of the whole mapping, ordered by name
    pub async fn snapshot(&self) -> BTreeMap<String, Ipv4Addr> {
        self.records
            .read()
            .await
            .iter()
            .map(|(name, addr)| (name.clone(), *addr))
            .collect()
    }

    /// Number of records
    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    /// Serialize the map for the backing file, if there is one
    fn encode(&self, records: &HashMap<String, Ipv4Addr>) -> Result<Option<Vec<u8>>, StoreError> {
        if self.path.is_none() {
            return Ok(None);
        }

        let ordered: BTreeMap<&str, &Ipv4Addr> = records
            .iter()
            .map(|(name, addr)| (name.as_str(), addr))
            .collect();

        let mut buf = Vec::new();
        let formatter = serde_json::ser::PrettyFormatter::with_indent(FILE_INDENT);
        let mut serializer = serde_json::Serializer::with_formatter(&mut buf, formatter);
        ordered.serialize(&mut serializer)?;

        Ok(Some(buf))
    }

    async fn write(&self, encoded: Option<Vec<u8>>) -> Result<(), StoreError> {
        let (Some(path), Some(bytes)) = (self.path.as_ref(), encoded) else {
            return Ok(());
        };

        tokio::fs::write(path, &bytes)
            .await
            .map_err(|source| StoreError::Persist {
                path: path.clone(),
                source,
            })?;

        debug!("Persisted {} bytes of DNS records to {:?}", bytes.len(), path);
        Ok(())
    }
}

/// Read the persisted mapping, tolerating every failure
fn load_records(path: &Path) -> HashMap<String, Ipv4Addr> {
    let content = match std::fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!("DNS records file {:?} not found, starting empty", path);
            return HashMap::new();
        }
        Err(e) => {
            error!("Error reading DNS records file {:?}: {}", path, e);
            return HashMap::new();
        }
    };

    let raw: HashMap<String, serde_json::Value> = match serde_json::from_slice(&content) {
        Ok(raw) => raw,
        Err(e) => {
            error!("Error parsing DNS records file {:?}: {}", path, e);
            return HashMap::new();
        }
    };

    raw.into_iter()
        .filter_map(|(name, value)| {
            match value.as_str().and_then(|s| s.parse::<Ipv4Addr>().ok()) {
                Some(addr) => Some((name, addr)),
                None => {
                    warn!("Skipping record {}: {} is not an IPv4 address", name, value);
                    None
                }
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn addr(s: &str) -> Ipv4Addr {
        s.parse().unwrap()
    }

    #[tokio::test]
    async fn test_open_missing_file_is_empty() {
        let dir = tempdir().unwrap();
        let store = RecordStore::open(dir.path().join("records.json"));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_open_malformed_file_is_empty() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(&path, b"{ not json").unwrap();

        let store = RecordStore::open(&path);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_open_skips_invalid_entries() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        std::fs::write(
            &path,
            br#"{"foo.test": "10.0.0.5", "bad.test": "not-an-ip", "num.test": 42}"#,
        )
        .unwrap();

        let store = RecordStore::open(&path);
        assert_eq!(store.len().await, 1);
        assert_eq!(store.lookup("foo.test").await, Some(addr("10.0.0.5")));
    }

    #[tokio::test]
    async fn test_upsert_and_lookup() {
        let store = RecordStore::in_memory();

        store
            .upsert_many(vec![
                ("foo.test".to_string(), addr("10.0.0.5")),
                ("bar.test".to_string(), addr("10.0.0.6")),
            ])
            .await
            .unwrap();

        assert_eq!(store.lookup("foo.test").await, Some(addr("10.0.0.5")));
        assert_eq!(store.lookup("bar.test").await, Some(addr("10.0.0.6")));
        assert_eq!(store.lookup("baz.test").await, None);
    }

    #[tokio::test]
    async fn test_lookup_is_case_sensitive() {
        let store = RecordStore::in_memory();
        store.upsert_one("Foo.Test", addr("10.0.0.5")).await.unwrap();

        assert_eq!(store.lookup("Foo.Test").await, Some(addr("10.0.0.5")));
        assert_eq!(store.lookup("foo.test").await, None);
    }

    #[tokio::test]
    async fn test_upsert_one_is_idempotent() {
        let store = RecordStore::in_memory();
        store.upsert_one("foo.test", addr("10.0.0.5")).await.unwrap();
        let once = store.snapshot().await;

        store.upsert_one("foo.test", addr("10.0.0.5")).await.unwrap();
        store.upsert_one("foo.test", addr("10.0.0.5")).await.unwrap();

        assert_eq!(store.snapshot().await, once);
    }

    #[tokio::test]
    async fn test_upsert_replaces_existing() {
        let store = RecordStore::in_memory();
        store.upsert_one("foo.test", addr("10.0.0.5")).await.unwrap();
        store.upsert_one("foo.test", addr("10.0.0.9")).await.unwrap();

        assert_eq!(store.lookup("foo.test").await, Some(addr("10.0.0.9")));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_remove() {
        let store = RecordStore::in_memory();
        store.upsert_one("foo.test", addr("10.0.0.5")).await.unwrap();

        assert!(store.remove("foo.test").await.unwrap());
        assert_eq!(store.lookup("foo.test").await, None);
        assert!(!store.remove("foo.test").await.unwrap());
    }

    #[tokio::test]
    async fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");

        // Write and drop
        {
            let store = RecordStore::open(&path);
            store.upsert_one("foo.test", addr("10.0.0.5")).await.unwrap();
            store.upsert_one("bar.test", addr("10.0.0.6")).await.unwrap();
            store.remove("bar.test").await.unwrap();
        }

        // Reopen and verify
        {
            let store = RecordStore::open(&path);
            assert_eq!(store.len().await, 1);
            assert_eq!(store.lookup("foo.test").await, Some(addr("10.0.0.5")));
        }

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "{\n    \"foo.test\": \"10.0.0.5\"\n}");
    }

    #[tokio::test]
    async fn test_persist_failure_keeps_memory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing-dir").join("records.json");
        let store = RecordStore::open(&path);

        let result = store.upsert_one("foo.test", addr("10.0.0.5")).await;

        assert!(matches!(result, Err(StoreError::Persist { .. })));
        assert_eq!(store.lookup("foo.test").await, Some(addr("10.0.0.5")));
    }

    #[tokio::test]
    async fn test_remove_absent_does_not_touch_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        let store = RecordStore::open(&path);

        assert!(!store.remove("foo.test").await.unwrap());
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_concurrent_writers_do_not_lose_updates() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("records.json");
        let store = std::sync::Arc::new(RecordStore::open(&path));

        let mut handles = Vec::new();
        for i in 0..20u8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .upsert_one(format!("host{}.test", i), Ipv4Addr::new(10, 0, 0, i))
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(store.len().await, 20);

        let reopened = RecordStore::open(&path);
        assert_eq!(reopened.snapshot().await, store.snapshot().await);
    }
}
