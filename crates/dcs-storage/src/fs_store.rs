//! File-based blob store with a single-level sharded layout.
//!
//! Each blob is stored at `{base_dir}/{hex[0..2]}/{hex}`. With uniformly
//! distributed ids, each of the 256 shard directories holds about
//! `total / 256` entries.

use std::path::{Path, PathBuf};

use dcs_chunks::{ContentId, SHARD_PREFIX_LEN};
use tracing::{debug, warn};

use crate::blob::BlobStore;
use crate::error::StoreError;

/// Suffix of in-flight temp files; these are skipped by `list` and `usage`.
const TMP_SUFFIX: &str = ".tmp";

pub struct FsBlobStore {
    base_dir: PathBuf,
}

impl FsBlobStore {
    /// Open a store rooted at `base_dir`, creating the directory if needed.
    pub fn new(base_dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let base_dir = base_dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&base_dir).map_err(StoreError::io("create dir", &base_dir))?;
        Ok(Self { base_dir })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Full on-disk path for a blob id.
    pub fn blob_path(&self, id: &ContentId) -> PathBuf {
        let hex = id.to_hex();
        self.base_dir.join(&hex[..SHARD_PREFIX_LEN]).join(&hex)
    }

    /// Walk `base/XX/<hex>` and collect every well-formed blob file.
    fn entries(&self) -> Result<Vec<(ContentId, PathBuf)>, StoreError> {
        let mut out = Vec::new();
        let shards =
            std::fs::read_dir(&self.base_dir).map_err(StoreError::io("read dir", &self.base_dir))?;

        for shard in shards {
            let shard = shard.map_err(StoreError::io("read dir", &self.base_dir))?;
            let shard_path = shard.path();
            let is_shard = shard.file_name().to_str().is_some_and(|n| {
                n.len() == SHARD_PREFIX_LEN && n.bytes().all(|b| b.is_ascii_hexdigit())
            });
            if !is_shard || !shard_path.is_dir() {
                continue;
            }

            let files =
                std::fs::read_dir(&shard_path).map_err(StoreError::io("read dir", &shard_path))?;
            for file in files {
                let file = file.map_err(StoreError::io("read dir", &shard_path))?;
                let name = file.file_name();
                let Some(name) = name.to_str() else { continue };
                if name.ends_with(TMP_SUFFIX) {
                    continue;
                }
                match ContentId::from_hex(name) {
                    Ok(id) => out.push((id, file.path())),
                    Err(_) => debug!(path = %file.path().display(), "ignoring foreign file in shard"),
                }
            }
        }
        Ok(out)
    }
}

impl BlobStore for FsBlobStore {
    fn put(&self, id: &ContentId, data: &[u8]) -> Result<(), StoreError> {
        let path = self.blob_path(id);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(StoreError::io("create dir", parent))?;
        }

        // Write to a temp file in the same shard, then rename into place,
        // so a crash never leaves a half-written blob under its final name.
        // The random infix keeps concurrent writers of one id apart.
        let tmp_path =
            path.with_file_name(format!("{}.{:016x}{TMP_SUFFIX}", id.to_hex(), rand::random::<u64>()));
        std::fs::write(&tmp_path, data).map_err(StoreError::io("write", &tmp_path))?;
        if let Err(e) = std::fs::rename(&tmp_path, &path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(StoreError::io("rename", &path)(e));
        }

        debug!(%id, size = data.len(), "stored blob");
        Ok(())
    }

    fn get(&self, id: &ContentId) -> Result<Vec<u8>, StoreError> {
        let path = self.blob_path(id);
        match std::fs::read(&path) {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(*id)),
            Err(e) => Err(StoreError::io("read", path)(e)),
        }
    }

    fn delete(&self, id: &ContentId) -> Result<(), StoreError> {
        let path = self.blob_path(id);
        match std::fs::remove_file(&path) {
            Ok(()) => {
                debug!(%id, "deleted blob");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StoreError::io("remove", path)(e)),
        }
    }

    fn contains(&self, id: &ContentId) -> Result<bool, StoreError> {
        let path = self.blob_path(id);
        match std::fs::metadata(&path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(StoreError::io("stat", path)(e)),
        }
    }

    fn list(&self) -> Result<Vec<ContentId>, StoreError> {
        Ok(self.entries()?.into_iter().map(|(id, _)| id).collect())
    }

    fn usage(&self) -> Result<u64, StoreError> {
        let mut total = 0u64;
        for (id, path) in self.entries()? {
            match std::fs::metadata(&path) {
                Ok(meta) => total += meta.len(),
                // Deleted between listing and stat
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    warn!(%id, "blob vanished during usage scan");
                }
                Err(e) => return Err(StoreError::io("stat", path)(e)),
            }
        }
        Ok(total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dcs_chunks::hash_bytes;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn make_store() -> (FsBlobStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FsBlobStore::new(dir.path().join("blobs")).unwrap();
        (store, dir)
    }

    #[test]
    fn put_get_roundtrip() {
        let (store, _dir) = make_store();
        let id = hash_bytes(b"hello");
        store.put(&id, b"sealed bytes").unwrap();
        assert_eq!(store.get(&id).unwrap(), b"sealed bytes");
        assert!(store.contains(&id).unwrap());
    }

    #[test]
    fn layout_is_shard_then_id() {
        let (store, _dir) = make_store();
        let id = hash_bytes(b"layout");
        store.put(&id, b"x").unwrap();

        let hex = id.to_hex();
        let expected = store.base_dir().join(&hex[..2]).join(&hex);
        assert!(expected.is_file());
        assert_eq!(store.blob_path(&id), expected);
    }

    #[test]
    fn get_missing_is_not_found() {
        let (store, _dir) = make_store();
        let id = hash_bytes(b"absent");
        assert!(matches!(store.get(&id), Err(StoreError::NotFound(got)) if got == id));
    }

    #[test]
    fn delete_is_idempotent() {
        let (store, _dir) = make_store();
        let id = hash_bytes(b"gone");
        store.put(&id, b"data").unwrap();
        store.delete(&id).unwrap();
        store.delete(&id).unwrap();
        assert!(!store.contains(&id).unwrap());
    }

    #[test]
    fn put_overwrites() {
        let (store, _dir) = make_store();
        let id = hash_bytes(b"over");
        store.put(&id, b"first").unwrap();
        store.put(&id, b"second!").unwrap();
        assert_eq!(store.get(&id).unwrap(), b"second!");
        assert_eq!(store.usage().unwrap(), 7);
    }

    #[test]
    fn list_and_usage() {
        let (store, _dir) = make_store();
        assert!(store.list().unwrap().is_empty());
        assert_eq!(store.usage().unwrap(), 0);

        let mut ids = Vec::new();
        for i in 0..20u32 {
            let id = hash_bytes(&i.to_le_bytes());
            store.put(&id, &vec![0u8; i as usize]).unwrap();
            ids.push(id);
        }

        let mut listed = store.list().unwrap();
        listed.sort();
        ids.sort();
        assert_eq!(listed, ids);
        assert_eq!(store.usage().unwrap(), (0..20u64).sum::<u64>());
    }

    #[test]
    fn list_skips_foreign_and_temp_files() {
        let (store, _dir) = make_store();
        let id = hash_bytes(b"real");
        store.put(&id, b"abc").unwrap();

        let shard = store.base_dir().join(id.shard());
        std::fs::write(shard.join("notes.txt"), b"junk").unwrap();
        std::fs::write(shard.join(format!("{}.tmp", id.to_hex())), b"partial").unwrap();
        std::fs::write(store.base_dir().join("README"), b"top-level junk").unwrap();
        std::fs::create_dir_all(store.base_dir().join("zz")).unwrap();

        assert_eq!(store.list().unwrap(), vec![id]);
        assert_eq!(store.usage().unwrap(), 3);
    }

    #[test]
    fn shard_distribution_is_near_uniform() {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for i in 0..10_000u32 {
            let id = hash_bytes(&i.to_be_bytes());
            *counts.entry(id.shard()).or_default() += 1;
        }

        // 10_000 / 256 ≈ 39 per shard
        assert_eq!(counts.len(), 256, "every shard must be used");
        for (shard, n) in &counts {
            assert!((10..=80).contains(n), "shard {shard} got {n} ids");
        }
    }

    #[test]
    fn concurrent_puts_on_distinct_ids() {
        let (store, _dir) = make_store();
        let store = Arc::new(store);

        let handles: Vec<_> = (0..8u32)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..25u32 {
                        let id = hash_bytes(&[t.to_le_bytes(), i.to_le_bytes()].concat());
                        store.put(&id, &i.to_le_bytes()).unwrap();
                        assert_eq!(store.get(&id).unwrap(), i.to_le_bytes());
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.list().unwrap().len(), 200);
    }

    #[test]
    fn concurrent_puts_on_the_same_id() {
        let (store, _dir) = make_store();
        let store = Arc::new(store);
        let id = hash_bytes(b"contended");

        let handles: Vec<_> = (0..8u8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        store.put(&id, &[t; 16]).unwrap();
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.list().unwrap(), vec![id]);
        let blob = store.get(&id).unwrap();
        assert_eq!(blob.len(), 16);
        assert!(blob.iter().all(|b| *b == blob[0]), "blob mixes two writers");

        let leftovers: Vec<_> = std::fs::read_dir(store.base_dir().join(id.shard()))
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left behind: {leftovers:?}");
    }
}
