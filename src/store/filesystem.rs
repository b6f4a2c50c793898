//! Filesystem document store
//!
//! Each key maps to a file under the root directory. The version token lives
//! in a `.version` sidecar, and every read or write holds an advisory lock on
//! a `.lock` sidecar, so a conditional write is checked and applied atomically
//! with respect to other processes using the same root.

use super::{
    next_version, DocumentStore, Precondition, StoreError, VersionedDocument, UNVERSIONED,
};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

const VERSION_SUFFIX: &str = ".version";
const LOCK_SUFFIX: &str = ".lock";

/// Document store rooted at a directory
#[derive(Debug, Clone)]
pub struct FsDocumentStore {
    root: PathBuf,
}

impl FsDocumentStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let valid = !key.is_empty()
            && !key.contains('\\')
            && !key.ends_with(VERSION_SUFFIX)
            && !key.ends_with(LOCK_SUFFIX)
            && key
                .split('/')
                .all(|part| !part.is_empty() && part != "." && part != "..");
        if !valid {
            return Err(StoreError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(key))
    }

    fn lock_file(path: &Path) -> Result<File, StoreError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(sidecar(path, LOCK_SUFFIX))?;
        Ok(lock)
    }

    fn read_version(path: &Path) -> Result<Option<String>, StoreError> {
        if !path.exists() {
            return Ok(None);
        }
        match fs::read_to_string(sidecar(path, VERSION_SUFFIX)) {
            Ok(version) => Ok(Some(version.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(Some(UNVERSIONED.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    fn collect_keys(&self, dir: &Path, keys: &mut Vec<String>) -> Result<(), StoreError> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.collect_keys(&path, keys)?;
                continue;
            }

            let Ok(relative) = path.strip_prefix(&self.root) else {
                continue;
            };
            let key = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");

            let is_sidecar = key.ends_with(VERSION_SUFFIX) || key.ends_with(LOCK_SUFFIX);
            let is_temp = path
                .file_name()
                .map(|name| name.to_string_lossy().starts_with(".tmp"))
                .unwrap_or(false);
            if !is_sidecar && !is_temp {
                keys.push(key);
            }
        }
        Ok(())
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Write `contents` to `path` by renaming a fully written temp file over it
fn write_atomic(path: &Path, contents: &str) -> Result<(), StoreError> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(contents.as_bytes())?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

impl DocumentStore for FsDocumentStore {
    fn get(&self, key: &str) -> Result<Option<VersionedDocument>, StoreError> {
        let path = self.path_for(key)?;
        if !path.exists() {
            return Ok(None);
        }

        let lock = Self::lock_file(&path)?;
        lock.lock_shared()
            .map_err(|e| StoreError::Lock(e.to_string()))?;

        let body = match fs::read_to_string(&path) {
            Ok(body) => body,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let version = Self::read_version(&path)?.unwrap_or_else(|| UNVERSIONED.to_string());

        lock.unlock().map_err(|e| StoreError::Lock(e.to_string()))?;
        Ok(Some(VersionedDocument { body, version }))
    }

    fn put(&self, key: &str, body: &str, expected: &Precondition) -> Result<String, StoreError> {
        let path = self.path_for(key)?;

        let lock = Self::lock_file(&path)?;
        lock.lock_exclusive()
            .map_err(|e| StoreError::Lock(e.to_string()))?;

        let current = Self::read_version(&path)?;
        if !expected.holds(current.as_deref()) {
            return Err(StoreError::VersionMismatch {
                key: key.to_string(),
            });
        }

        // Token first: an interrupted commit leaves a token no reader has seen
        let version = next_version();
        write_atomic(&sidecar(&path, VERSION_SUFFIX), &version)?;
        write_atomic(&path, body)?;

        lock.unlock().map_err(|e| StoreError::Lock(e.to_string()))?;
        Ok(version)
    }

    fn list(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }
        let mut keys = Vec::new();
        self.collect_keys(&self.root, &mut keys)?;
        keys.retain(|key| key.starts_with(prefix));
        keys.sort();
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_put_get_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());

        let version = store
            .put("analytics/alice/wrapped.json", "{\"a\":1}", &Precondition::Absent)
            .unwrap();
        let doc = store.get("analytics/alice/wrapped.json").unwrap().unwrap();
        assert_eq!(doc.body, "{\"a\":1}");
        assert_eq!(doc.version, version);
        assert!(store.get("analytics/bob/wrapped.json").unwrap().is_none());
    }

    #[test]
    fn test_conditional_put() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());

        let v1 = store.put("doc.json", "1", &Precondition::Absent).unwrap();
        assert!(matches!(
            store.put("doc.json", "2", &Precondition::Absent),
            Err(StoreError::VersionMismatch { .. })
        ));
        let v2 = store
            .put("doc.json", "2", &Precondition::Version(v1.clone()))
            .unwrap();
        assert!(matches!(
            store.put("doc.json", "3", &Precondition::Version(v1)),
            Err(StoreError::VersionMismatch { .. })
        ));
        assert_eq!(store.get("doc.json").unwrap().unwrap().version, v2);
    }

    #[test]
    fn test_externally_written_document_is_unversioned() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("meta")).unwrap();
        fs::write(dir.path().join("meta/p1.json"), "{}").unwrap();

        let store = FsDocumentStore::new(dir.path());
        let doc = store.get("meta/p1.json").unwrap().unwrap();
        assert_eq!(doc.version, UNVERSIONED);
        store
            .put("meta/p1.json", "{}", &Precondition::Version(UNVERSIONED.to_string()))
            .unwrap();
    }

    #[test]
    fn test_interrupted_commit_rejects_stale_token() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        let v1 = store.put("doc.json", "1", &Precondition::Absent).unwrap();

        // a commit that stopped after its token was written
        let path = dir.path().join("doc.json");
        write_atomic(&sidecar(&path, VERSION_SUFFIX), &next_version()).unwrap();

        assert!(matches!(
            store.put("doc.json", "2", &Precondition::Version(v1)),
            Err(StoreError::VersionMismatch { .. })
        ));
        assert_eq!(store.get("doc.json").unwrap().unwrap().body, "1");
    }

    #[test]
    fn test_list_skips_sidecars() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsDocumentStore::new(dir.path());
        store.put("analytics/a/wrapped.json", "{}", &Precondition::Any).unwrap();
        store.put("analytics/b/wrapped.json", "{}", &Precondition::Any).unwrap();
        store.put("meta/p.json", "{}", &Precondition::Any).unwrap();

        assert_eq!(
            store.list("analytics/").unwrap(),
            vec![
                "analytics/a/wrapped.json".to_string(),
                "analytics/b/wrapped.json".to_string()
            ]
        );
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let store = FsDocumentStore::new("/tmp/unused");
        for key in ["", "../x", "a/../b", "/abs", "a//b", "x.lock", "x.version"] {
            assert!(
                matches!(store.get(key), Err(StoreError::InvalidKey(_))),
                "{key:?} should be rejected"
            );
        }
    }
}
