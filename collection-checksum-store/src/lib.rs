// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Per-package version checksum storage (C5).
//!
//! One JSON file per package lives in a fixed directory. Every
//! read-modify-write is performed under an exclusive lock on a sibling
//! `.lock` file, the same discipline the donor workspace uses for its
//! download-and-verify cache: lock, read current state, compute the new
//! state, write to a temp file, rename into place, unlock.

use {
    fs2::FileExt,
    serde::{Deserialize, Serialize},
    std::{
        collections::BTreeMap,
        fs::File,
        path::{Path, PathBuf},
    },
};

#[derive(Debug, thiserror::Error)]
pub enum ChecksumStoreError {
    #[error("a checksum is already recorded for this package and version")]
    Conflict { given: String, existing: String },

    #[error("no checksum recorded for this package and version")]
    NotFound,

    #[error("io error accessing {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed checksum file {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, ChecksumStoreError>;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
struct ChecksumFile {
    #[serde(rename = "versionChecksums")]
    version_checksums: BTreeMap<String, String>,
}

/// Persists per-package version-to-checksum mappings under `root`.
///
/// The directory is created lazily, on first write; reads against a store
/// whose directory does not yet exist behave as if every package file were
/// empty.
pub struct ChecksumStore {
    root: PathBuf,
}

impl ChecksumStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn file_path(&self, package_identity: &str) -> PathBuf {
        self.root.join(format!("{package_identity}.json"))
    }

    fn lock_path(&self) -> PathBuf {
        self.root.join(".lock")
    }

    /// Acquire the directory-level exclusive lock, creating the directory
    /// (and lock file) first if necessary.
    fn acquire_lock(&self) -> Result<File> {
        std::fs::create_dir_all(&self.root).map_err(|source| ChecksumStoreError::Io {
            path: self.root.clone(),
            source,
        })?;

        let lock_path = self.lock_path();
        let lock = File::create(&lock_path).map_err(|source| ChecksumStoreError::Io {
            path: lock_path.clone(),
            source,
        })?;
        lock.lock_exclusive().map_err(|source| ChecksumStoreError::Io {
            path: lock_path,
            source,
        })?;

        Ok(lock)
    }

    /// A missing or empty file is treated as an empty map, never an error.
    fn read_unlocked(&self, path: &Path) -> Result<ChecksumFile> {
        if !path.exists() {
            return Ok(ChecksumFile::default());
        }

        let data = std::fs::read(path).map_err(|source| ChecksumStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        if data.is_empty() {
            return Ok(ChecksumFile::default());
        }

        serde_json::from_slice(&data).map_err(|source| ChecksumStoreError::Malformed {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write_unlocked(&self, path: &Path, file: &ChecksumFile) -> Result<()> {
        let data = serde_json::to_vec_pretty(file).expect("checksum file always serializes");

        let temp_path = path.with_extension("json.tmp");
        std::fs::write(&temp_path, &data).map_err(|source| ChecksumStoreError::Io {
            path: temp_path.clone(),
            source,
        })?;
        std::fs::rename(&temp_path, path).map_err(|source| ChecksumStoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Ok(())
    }

    /// Look up the checksum recorded for `package_identity` at `version`.
    pub fn get(&self, package_identity: &str, version: &str) -> Result<String> {
        let lock = self.acquire_lock()?;
        let path = self.file_path(package_identity);
        let file = self.read_unlocked(&path)?;
        lock.unlock().ok();

        file.version_checksums
            .get(version)
            .cloned()
            .ok_or(ChecksumStoreError::NotFound)
    }

    /// Record `checksum` for `package_identity` at `version`.
    ///
    /// Idempotent when the stored value already matches `checksum`. A
    /// mismatched existing value yields [ChecksumStoreError::Conflict]
    /// without modifying the file on disk.
    pub fn put(&self, package_identity: &str, version: &str, checksum: &str) -> Result<()> {
        let lock = self.acquire_lock()?;
        let path = self.file_path(package_identity);
        let mut file = self.read_unlocked(&path)?;

        if let Some(existing) = file.version_checksums.get(version) {
            if existing == checksum {
                lock.unlock().ok();
                return Ok(());
            }

            let existing = existing.clone();
            lock.unlock().ok();
            return Err(ChecksumStoreError::Conflict {
                given: checksum.to_string(),
                existing,
            });
        }

        file.version_checksums.insert(version.to_string(), checksum.to_string());
        let result = self.write_unlocked(&path, &file);
        lock.unlock().ok();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_reports_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChecksumStore::new(dir.path());

        assert!(matches!(store.get("pkg", "1.0.0"), Err(ChecksumStoreError::NotFound)));
    }

    #[test]
    fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChecksumStore::new(dir.path());

        store.put("pkg", "1.0.0", "aaa").unwrap();
        assert_eq!(store.get("pkg", "1.0.0").unwrap(), "aaa");
    }

    #[test]
    fn repeated_put_with_same_value_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChecksumStore::new(dir.path());

        store.put("pkg", "1.0.0", "aaa").unwrap();
        store.put("pkg", "1.0.0", "aaa").unwrap();
        assert_eq!(store.get("pkg", "1.0.0").unwrap(), "aaa");
    }

    #[test]
    fn put_with_different_value_conflicts_without_modifying_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChecksumStore::new(dir.path());

        store.put("pkg", "1.0.0", "aaa").unwrap();

        let err = store.put("pkg", "1.0.0", "bbb").unwrap_err();
        assert!(matches!(
            err,
            ChecksumStoreError::Conflict { given, existing }
                if given == "bbb" && existing == "aaa"
        ));

        assert_eq!(store.get("pkg", "1.0.0").unwrap(), "aaa");
    }

    #[test]
    fn distinct_versions_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let store = ChecksumStore::new(dir.path());

        store.put("pkg", "1.0.0", "aaa").unwrap();
        store.put("pkg", "2.0.0", "zzz").unwrap();

        assert_eq!(store.get("pkg", "1.0.0").unwrap(), "aaa");
        assert_eq!(store.get("pkg", "2.0.0").unwrap(), "zzz");
    }
}
