//! Disk store engine
//!
//! [`DiskStore`] coordinates the manifest and the blob store for every
//! externally visible operation: save routing between inline and file
//! placement, self-healing reads, LRU-ordered eviction, and the fast
//! trash-based remove-all.
//!
//! The engine is single-caller: mutating operations take `&mut self` and
//! concurrent use of one directory is undefined. For sharded concurrency,
//! open multiple stores on disjoint paths. The only background activity is
//! the serial trash sweeper, which never touches the live data directory.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::blob::BlobStore;
use super::config::{DiskStoreConfig, StorageKind};
use super::error::{StoreError, StoreResult};
use super::manifest::{Manifest, ManifestRow};

/// LRU candidates fetched per round while trimming to a size or count
/// budget.
const TRIM_BATCH: usize = 16;

/// LRU candidates deleted per progress callback in the slow remove-all.
const REMOVE_ALL_BATCH: usize = 32;

/// Durable key-value store over an embedded SQLite manifest and a data
/// directory.
///
/// Small values live inline in the manifest; large values live as separate
/// files referenced by filename. The manifest is the single source of truth
/// for membership, sizes, and access times, and drives least-recently-used
/// eviction.
///
/// # Example
/// ```no_run
/// use strata_cache::{DiskStore, DiskStoreConfig};
///
/// let mut store = DiskStore::open(DiskStoreConfig::new("/tmp/my-cache"))?;
/// store.save("small", b"goes inline")?;
/// store.save_with("large", &[0u8; 30_000], Some("large.bin"), None)?;
/// # Ok::<(), strata_cache::StoreError>(())
/// ```
pub struct DiskStore {
    config: DiskStoreConfig,
    manifest: Manifest,
    blobs: BlobStore,
}

impl DiskStore {
    /// Open a store rooted at the configured path, creating the directory
    /// layout and schema as needed.
    ///
    /// If the database cannot be opened or initialized, the store resets
    /// itself once (removing the database files and trashing the data
    /// directory) and retries; a second failure is terminal. Leftover trash
    /// from previous runs is drained in the background.
    pub fn open(config: DiskStoreConfig) -> StoreResult<Self> {
        config.validate()?;
        fs::create_dir_all(&config.path)?;
        let blobs = BlobStore::new(&config.path)?;
        let mut manifest = Manifest::new(config.path.join(super::DB_FILE_NAME), config.log_errors);

        if let Err(e) = manifest.open().and_then(|_| manifest.initialize()) {
            warn!("storage at {} failed to initialize ({}), resetting", config.path.display(), e);
            manifest.close();
            blobs.reset()?;
            manifest.open()?;
            manifest.initialize().map_err(|e| StoreError::Corrupt(e.to_string()))?;
        }
        blobs.empty_trash_async();

        Ok(Self { config, manifest, blobs })
    }

    /// Root path of this store
    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Value routing policy of this store
    pub fn kind(&self) -> StorageKind {
        self.config.kind
    }

    /// Save a value inline under `key` (or as a file when the routing
    /// policy demands one; see [`DiskStore::save_with`])
    pub fn save(&mut self, key: &str, value: &[u8]) -> StoreResult<()> {
        self.save_with(key, value, None, None)
    }

    /// Save a value under `key`, replacing any existing entry.
    ///
    /// Routing: a non-empty `filename` stores the value as a file in the
    /// data directory; otherwise the value is stored inline. A store of
    /// kind [`StorageKind::File`] rejects saves without a filename. The
    /// optional `extended` payload is preserved verbatim alongside the
    /// entry.
    ///
    /// The file is written before the manifest row; if the row insert
    /// fails, the just-written file is deleted again so no orphan outlives
    /// the failed save.
    pub fn save_with(
        &mut self,
        key: &str,
        value: &[u8],
        filename: Option<&str>,
        extended: Option<&[u8]>,
    ) -> StoreResult<()> {
        if key.is_empty() {
            return Err(StoreError::InvalidArgument("key must not be empty".to_string()));
        }
        if value.is_empty() {
            return Err(StoreError::InvalidArgument("value must not be empty".to_string()));
        }
        let filename = filename.filter(|name| !name.is_empty());
        if self.config.kind == StorageKind::File && filename.is_none() {
            return Err(StoreError::InvalidArgument(
                "file-backed storage requires a filename".to_string(),
            ));
        }

        match filename {
            Some(name) => {
                self.blobs.write(name, value)?;
                if let Err(e) = self.manifest.save(key, Some(name), value, extended) {
                    let _ = self.blobs.delete(name);
                    return Err(e);
                }
            }
            None => {
                // The replacement is inline; a file left from a previous
                // file-backed save of this key would become an orphan.
                if self.config.kind != StorageKind::Sqlite {
                    if let Some(old) = self.manifest.filename(key).ok().flatten() {
                        let _ = self.blobs.delete(&old);
                    }
                }
                self.manifest.save(key, None, value, extended)?;
            }
        }
        Ok(())
    }

    /// Get the value stored under `key`.
    ///
    /// Returns `Ok(None)` on a miss. A manifest row whose file has gone
    /// missing is self-healed: the row is deleted and the read reports a
    /// miss. Every successful read refreshes the entry's access time.
    pub fn get_value(&mut self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        if key.is_empty() {
            return Ok(None);
        }
        let value = match self.manifest.filename(key)? {
            Some(name) => match self.blobs.read(&name) {
                Ok(bytes) => Some(bytes),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("file {} for key {:?} is gone, dropping the entry", name, key);
                    self.manifest.delete(key)?;
                    None
                }
                Err(e) => return Err(e.into()),
            },
            None => self.manifest.get_value(key)?,
        };
        if value.is_some() {
            self.manifest.bump_access_time(key)?;
        }
        Ok(value)
    }

    /// Get the full entry stored under `key`, value included.
    pub fn get_item(&mut self, key: &str) -> StoreResult<Option<ManifestRow>> {
        if key.is_empty() {
            return Ok(None);
        }
        let Some(mut row) = self.manifest.get(key, false)? else {
            return Ok(None);
        };
        if let Some(name) = row.filename.clone() {
            match self.blobs.read(&name) {
                Ok(bytes) => row.inline_data = Some(bytes),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("file {} for key {:?} is gone, dropping the entry", name, key);
                    self.manifest.delete(key)?;
                    return Ok(None);
                }
                Err(e) => return Err(e.into()),
            }
        }
        self.manifest.bump_access_time(key)?;
        Ok(Some(row))
    }

    /// Get an entry's metadata without its value. Does not refresh the
    /// access time.
    pub fn get_item_info(&mut self, key: &str) -> StoreResult<Option<ManifestRow>> {
        if key.is_empty() {
            return Ok(None);
        }
        self.manifest.get(key, true)
    }

    /// Get the full entries for many keys, values included.
    ///
    /// Missing keys are omitted; entries whose files have gone missing are
    /// self-healed and omitted. A batch that cannot be completed returns an
    /// error, never a partial result.
    pub fn get_items(&mut self, keys: &[&str]) -> StoreResult<Vec<ManifestRow>> {
        let rows = self.manifest.get_many(keys, false)?;
        let mut items = Vec::with_capacity(rows.len());
        for mut row in rows {
            if let Some(name) = row.filename.clone() {
                match self.blobs.read(&name) {
                    Ok(bytes) => row.inline_data = Some(bytes),
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {
                        debug!("file {} for key {:?} is gone, dropping the entry", name, row.key);
                        self.manifest.delete(&row.key)?;
                        continue;
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            items.push(row);
        }
        if !items.is_empty() {
            let read_keys: Vec<&str> = items.iter().map(|row| row.key.as_str()).collect();
            self.manifest.bump_access_times(&read_keys)?;
        }
        Ok(items)
    }

    /// Get the metadata for many keys without values.
    pub fn get_item_infos(&mut self, keys: &[&str]) -> StoreResult<Vec<ManifestRow>> {
        self.manifest.get_many(keys, true)
    }

    /// Get the values for many keys as a key → bytes map.
    pub fn get_values(&mut self, keys: &[&str]) -> StoreResult<HashMap<String, Vec<u8>>> {
        let items = self.get_items(keys)?;
        Ok(items
            .into_iter()
            .filter_map(|row| row.inline_data.map(|value| (row.key, value)))
            .collect())
    }

    /// Whether an entry exists for `key`
    pub fn exists(&mut self, key: &str) -> StoreResult<bool> {
        if key.is_empty() {
            return Ok(false);
        }
        self.manifest.exists(key)
    }

    /// Total number of entries
    pub fn count(&mut self) -> StoreResult<u64> {
        self.manifest.count()
    }

    /// Total size of stored values in bytes
    pub fn total_size(&mut self) -> StoreResult<u64> {
        self.manifest.total_size()
    }

    /// Remove the entry stored under `key`
    pub fn remove(&mut self, key: &str) -> StoreResult<()> {
        if key.is_empty() {
            return Err(StoreError::InvalidArgument("key must not be empty".to_string()));
        }
        if self.config.kind != StorageKind::Sqlite {
            if let Some(name) = self.manifest.filename(key)? {
                self.blobs.delete(&name)?;
            }
        }
        self.manifest.delete(key)
    }

    /// Remove the entries stored under many keys
    pub fn remove_many(&mut self, keys: &[&str]) -> StoreResult<()> {
        if keys.is_empty() {
            return Ok(());
        }
        if self.config.kind != StorageKind::Sqlite {
            for name in self.manifest.filenames(keys)? {
                self.blobs.delete(&name)?;
            }
        }
        self.manifest.delete_many(keys)
    }

    /// Remove every entry whose value is larger than `size` bytes
    pub fn trim_larger_than(&mut self, size: u32) -> StoreResult<()> {
        if self.config.kind != StorageKind::Sqlite {
            for name in self.manifest.filenames_larger_than(size)? {
                self.blobs.delete(&name)?;
            }
        }
        self.manifest.delete_larger_than(size)?;
        self.manifest.checkpoint()
    }

    /// Remove every entry last accessed before `timestamp` (unix seconds)
    pub fn trim_older_than(&mut self, timestamp: i64) -> StoreResult<()> {
        if self.config.kind != StorageKind::Sqlite {
            for name in self.manifest.filenames_accessed_before(timestamp)? {
                self.blobs.delete(&name)?;
            }
        }
        self.manifest.delete_accessed_before(timestamp)?;
        self.manifest.checkpoint()
    }

    /// Evict least-recently-used entries until the total value size is at
    /// most `max_size` bytes.
    ///
    /// A store already within budget returns immediately. Trims that
    /// evicted anything checkpoint the write-ahead log on success.
    pub fn trim_to_size(&mut self, max_size: u64) -> StoreResult<()> {
        if max_size == 0 {
            return self.remove_all();
        }
        let mut total = self.manifest.total_size()?;
        if total <= max_size {
            return Ok(());
        }
        'evict: loop {
            let batch = self.manifest.lru_entries(TRIM_BATCH)?;
            if batch.is_empty() {
                break;
            }
            for entry in &batch {
                if total <= max_size {
                    break 'evict;
                }
                if let Some(name) = &entry.filename {
                    self.blobs.delete(name)?;
                }
                self.manifest.delete(&entry.key)?;
                total = total.saturating_sub(u64::from(entry.size));
            }
            if total <= max_size {
                break;
            }
        }
        self.manifest.checkpoint()
    }

    /// Evict least-recently-used entries until at most `max_count` remain.
    pub fn trim_to_count(&mut self, max_count: u64) -> StoreResult<()> {
        if max_count == 0 {
            return self.remove_all();
        }
        let mut total = self.manifest.count()?;
        if total <= max_count {
            return Ok(());
        }
        'evict: loop {
            let batch = self.manifest.lru_entries(TRIM_BATCH)?;
            if batch.is_empty() {
                break;
            }
            for entry in &batch {
                if total <= max_count {
                    break 'evict;
                }
                if let Some(name) = &entry.filename {
                    self.blobs.delete(name)?;
                }
                self.manifest.delete(&entry.key)?;
                total -= 1;
            }
            if total <= max_count {
                break;
            }
        }
        self.manifest.checkpoint()
    }

    /// Remove every entry by trashing the data wholesale.
    ///
    /// Closes the database, stages the data directory into the trash,
    /// removes the database files, then reopens and reinitializes. Runs in
    /// the time of a directory rename plus a reopen; the trash empties in
    /// the background.
    pub fn remove_all(&mut self) -> StoreResult<()> {
        self.manifest.close();
        self.blobs.reset()?;
        self.manifest.open()?;
        self.manifest.initialize()
    }

    /// Remove every entry row by row, reporting progress.
    ///
    /// Slower than [`DiskStore::remove_all`]: iterates LRU batches,
    /// deleting each entry's file and row, and invokes `progress(removed,
    /// total)` after each batch.
    pub fn remove_all_with_progress<F>(&mut self, mut progress: F) -> StoreResult<()>
    where
        F: FnMut(u64, u64),
    {
        let total = self.manifest.count()?;
        if total == 0 {
            return Ok(());
        }
        let mut removed = 0u64;
        loop {
            let batch = self.manifest.lru_entries(REMOVE_ALL_BATCH)?;
            if batch.is_empty() {
                break;
            }
            for entry in &batch {
                if let Some(name) = &entry.filename {
                    self.blobs.delete(name)?;
                }
            }
            let keys: Vec<&str> = batch.iter().map(|entry| entry.key.as_str()).collect();
            self.manifest.delete_many(&keys)?;
            removed += batch.len() as u64;
            progress(removed, total);
            if batch.len() < REMOVE_ALL_BATCH {
                break;
            }
        }
        Ok(())
    }

    /// Derive the default filename for a key: the first 128 bits of its
    /// SHA-256 digest in lowercase hex.
    ///
    /// Useful with [`StorageKind::File`] and [`StorageKind::Mixed`] stores
    /// when the caller has no natural filename for a value.
    pub fn default_filename(key: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(key.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        digest[..32].to_string()
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for storage::core.
    use tempfile::TempDir;

    use super::*;

    fn open_store(dir: &TempDir, kind: StorageKind) -> DiskStore {
        let config = DiskStoreConfig::builder(dir.path()).kind(kind).log_errors(false).build();
        DiskStore::open(config).unwrap()
    }

    /// Validates `DiskStore::save_with` argument checks.
    ///
    /// Assertions:
    /// - Ensures empty keys and values are rejected.
    /// - Ensures a `File` store rejects saves without a filename.
    #[test]
    fn test_save_rejects_invalid_arguments() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir, StorageKind::File);

        assert!(matches!(
            store.save_with("", b"v", Some("f"), None),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(
            store.save_with("k", b"", Some("f"), None),
            Err(StoreError::InvalidArgument(_))
        ));
        assert!(matches!(store.save("k", b"v"), Err(StoreError::InvalidArgument(_))));

        store.save_with("k", b"v", Some("f"), None).unwrap();
    }

    /// Validates `DiskStore::remove` behavior for the file cleanup scenario.
    ///
    /// Assertions:
    /// - Confirms removing a file-backed entry deletes its file.
    #[test]
    fn test_remove_deletes_backing_file() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir, StorageKind::Mixed);

        store.save_with("k", b"value", Some("k.bin"), None).unwrap();
        assert!(dir.path().join("data/k.bin").exists());

        store.remove("k").unwrap();

        assert!(!dir.path().join("data/k.bin").exists());
        assert!(!store.exists("k").unwrap());
    }

    /// Validates inline replacement of a file-backed entry.
    ///
    /// Assertions:
    /// - Confirms the superseded file is deleted when the key goes inline.
    #[test]
    fn test_inline_save_deletes_superseded_file() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir, StorageKind::Mixed);

        store.save_with("k", b"file payload", Some("k.bin"), None).unwrap();
        assert!(dir.path().join("data/k.bin").exists());

        store.save("k", b"inline payload").unwrap();

        assert!(!dir.path().join("data/k.bin").exists());
        assert_eq!(store.get_value("k").unwrap().as_deref(), Some(&b"inline payload"[..]));
    }

    /// Validates `DiskStore::default_filename` derivation.
    ///
    /// Assertions:
    /// - Confirms 32 lowercase hex characters, stable per key, distinct
    ///   across keys.
    #[test]
    fn test_default_filename() {
        let a = DiskStore::default_filename("some-key");
        let b = DiskStore::default_filename("other-key");

        assert_eq!(a.len(), 32);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
        assert_eq!(a, DiskStore::default_filename("some-key"));
        assert_ne!(a, b);
    }

    /// Validates `DiskStore::get_item_info` behavior.
    ///
    /// Assertions:
    /// - Confirms the info projection drops the value but keeps metadata.
    #[test]
    fn test_get_item_info_excludes_value() {
        let dir = TempDir::new().unwrap();
        let mut store = open_store(&dir, StorageKind::Sqlite);

        store.save_with("k", b"payload", None, Some(b"meta")).unwrap();

        let info = store.get_item_info("k").unwrap().unwrap();
        assert!(info.inline_data.is_none());
        assert_eq!(info.size, 7);
        assert_eq!(info.extended_data.as_deref(), Some(&b"meta"[..]));
    }
}
