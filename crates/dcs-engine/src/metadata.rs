//! File record repository.
//!
//! The chunk manager only produces and consumes [`FileRecord`]s; keeping
//! them is the job of a [`MetadataRepository`]. Two backends:
//!   - **memory**: a map behind a lock, for tests and embedding
//!   - **JSON**: loaded into memory on open, flushed atomically via
//!     temp+rename after every mutation

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, RwLock};

use anyhow::Context;
use dcs_core::{DcsError, DcsResult, FileRecord};
use tracing::debug;

/// Storage for file records, keyed by file id.
pub trait MetadataRepository: Send + Sync {
    fn get(&self, id: &str) -> DcsResult<Option<FileRecord>>;

    /// Insert or replace the record under `record.id`.
    fn put(&self, record: FileRecord) -> DcsResult<()>;

    /// Remove a record. Returns whether one existed.
    fn delete(&self, id: &str) -> DcsResult<bool>;

    /// All records, ordered by id.
    fn list(&self) -> DcsResult<Vec<FileRecord>>;
}

fn poisoned() -> DcsError {
    DcsError::Metadata("metadata lock poisoned".into())
}

#[derive(Default)]
pub struct MemoryMetadataRepository {
    records: RwLock<BTreeMap<String, FileRecord>>,
}

impl MemoryMetadataRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl MetadataRepository for MemoryMetadataRepository {
    fn get(&self, id: &str) -> DcsResult<Option<FileRecord>> {
        Ok(self.records.read().map_err(|_| poisoned())?.get(id).cloned())
    }

    fn put(&self, record: FileRecord) -> DcsResult<()> {
        self.records
            .write()
            .map_err(|_| poisoned())?
            .insert(record.id.clone(), record);
        Ok(())
    }

    fn delete(&self, id: &str) -> DcsResult<bool> {
        Ok(self.records.write().map_err(|_| poisoned())?.remove(id).is_some())
    }

    fn list(&self) -> DcsResult<Vec<FileRecord>> {
        Ok(self.records.read().map_err(|_| poisoned())?.values().cloned().collect())
    }
}

/// Records held in memory and persisted to a single JSON index file
pub struct JsonMetadataRepository {
    path: PathBuf,
    records: Mutex<BTreeMap<String, FileRecord>>,
}

impl JsonMetadataRepository {
    /// Load or create an index at `path`. A missing file is an empty index.
    pub fn open(path: impl AsRef<Path>) -> DcsResult<Self> {
        let path = path.as_ref().to_path_buf();
        let records = if path.exists() {
            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("reading metadata index: {}", path.display()))?;
            serde_json::from_str(&content)
                .with_context(|| format!("parsing metadata index: {}", path.display()))?
        } else {
            BTreeMap::new()
        };

        debug!(path = %path.display(), records = records.len(), "opened metadata index");
        Ok(Self {
            path,
            records: Mutex::new(records),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn flush(&self, records: &BTreeMap<String, FileRecord>) -> DcsResult<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating metadata dir: {}", parent.display()))?;
        }

        let json = serde_json::to_string_pretty(records)?;

        let tmp_path = self.path.with_extension("tmp");
        std::fs::write(&tmp_path, json)
            .with_context(|| format!("writing metadata temp: {}", tmp_path.display()))?;
        std::fs::rename(&tmp_path, &self.path)
            .with_context(|| format!("renaming metadata index: {}", self.path.display()))?;
        Ok(())
    }
}

impl MetadataRepository for JsonMetadataRepository {
    fn get(&self, id: &str) -> DcsResult<Option<FileRecord>> {
        Ok(self.records.lock().map_err(|_| poisoned())?.get(id).cloned())
    }

    fn put(&self, record: FileRecord) -> DcsResult<()> {
        let mut records = self.records.lock().map_err(|_| poisoned())?;
        let id = record.id.clone();
        let previous = records.insert(id.clone(), record);

        // Keep memory and disk in step: undo the insert if the flush fails.
        if let Err(e) = self.flush(&records) {
            match previous {
                Some(prev) => records.insert(id, prev),
                None => records.remove(&id),
            };
            return Err(e);
        }
        Ok(())
    }

    fn delete(&self, id: &str) -> DcsResult<bool> {
        let mut records = self.records.lock().map_err(|_| poisoned())?;
        let Some(removed) = records.remove(id) else {
            return Ok(false);
        };
        if let Err(e) = self.flush(&records) {
            records.insert(id.to_string(), removed);
            return Err(e);
        }
        Ok(true)
    }

    fn list(&self) -> DcsResult<Vec<FileRecord>> {
        Ok(self.records.lock().map_err(|_| poisoned())?.values().cloned().collect())
    }
}
