// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! TTL'd, size-bounded cache for fetched package metadata (C6).
//!
//! Backed by [sled], an embedded, crash-safe key/value store, so
//! cross-process safety comes from the backend's own file locking rather
//! than anything this crate does itself. Values are stored as
//! [CacheEntry]s, JSON-encoded; eviction walks entries ordered by
//! `timestamp`, oldest first, until the running size total is back under
//! the configured cap.

use {
    chrono::{DateTime, Utc},
    serde::{de::DeserializeOwned, Deserialize, Serialize},
    std::marker::PhantomData,
};

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("a value is already cached for this key")]
    Conflict,

    #[error("cache backend error: {0}")]
    Backend(#[from] sled::Error),

    #[error("failed encoding a cache entry: {0}")]
    Encode(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CacheError>;

/// A cached value and the wall-clock instant it was written.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CacheEntry<V> {
    pub value: V,
    pub timestamp: DateTime<Utc>,
}

const META_SIZE_KEY: &[u8] = b"__meta/size";

/// Opens or creates the backing database at `path`; entries older than
/// `ttl` are reported as a miss on read, and writes are rejected with
/// eviction once the running size total would exceed `max_size_bytes`.
pub struct MetadataCache<V> {
    db: sled::Db,
    ttl: chrono::Duration,
    max_size_bytes: u64,
    _value: PhantomData<V>,
}

impl<V> MetadataCache<V>
where
    V: Serialize + DeserializeOwned,
{
    pub fn open(path: impl AsRef<std::path::Path>, ttl: chrono::Duration, max_size_bytes: u64) -> Result<Self> {
        let db = sled::open(path)?;

        Ok(Self {
            db,
            ttl,
            max_size_bytes,
            _value: PhantomData,
        })
    }

    fn total_size(&self) -> u64 {
        self.db
            .get(META_SIZE_KEY)
            .ok()
            .flatten()
            .and_then(|bytes| bytes.as_ref().try_into().ok())
            .map(u64::from_le_bytes)
            .unwrap_or(0)
    }

    fn set_total_size(&self, size: u64) -> Result<()> {
        self.db.insert(META_SIZE_KEY, &size.to_le_bytes())?;
        Ok(())
    }

    /// Look up `key`. A missing or stale (age > ttl) entry is reported as a
    /// miss, never an error; lookup failures against the backend are
    /// likewise downgraded to a miss, since cache failures must never fail
    /// the caller's enclosing fetch.
    pub fn get(&self, key: &str) -> Option<V> {
        let raw = match self.db.get(key) {
            Ok(raw) => raw?,
            Err(e) => {
                log::warn!("metadata cache read for {key:?} failed: {e}");
                return None;
            }
        };

        let entry: CacheEntry<V> = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("metadata cache entry for {key:?} is malformed: {e}");
                return None;
            }
        };

        if Utc::now() > entry.timestamp + self.ttl {
            return None;
        }

        Some(entry.value)
    }

    /// Store `value` under `key` with the current time as its timestamp.
    ///
    /// `replace = false` fails with [CacheError::Conflict] if a (possibly
    /// stale) entry already occupies `key`, without overwriting it.
    pub fn put(&self, key: &str, value: V, replace: bool) -> Result<()> {
        if !replace && self.db.contains_key(key)? {
            return Err(CacheError::Conflict);
        }

        let entry = CacheEntry {
            value,
            timestamp: Utc::now(),
        };
        let encoded = serde_json::to_vec(&entry)?;

        let previous_len = self.db.get(key)?.map(|v| v.len() as u64).unwrap_or(0);
        self.db.insert(key, encoded.as_slice())?;

        let new_total = self.total_size() - previous_len + encoded.len() as u64;
        self.set_total_size(new_total)?;

        if new_total > self.max_size_bytes {
            self.evict_until_under_budget()?;
        }

        Ok(())
    }

    /// Evict entries in ascending `timestamp` order (oldest first) until
    /// the running size total is back at or under the configured cap.
    fn evict_until_under_budget(&self) -> Result<()> {
        let mut candidates: Vec<(sled::IVec, DateTime<Utc>, u64)> = Vec::new();

        for item in self.db.iter() {
            let (key, raw) = item?;
            if key.as_ref() == META_SIZE_KEY {
                continue;
            }

            if let Ok(entry) = serde_json::from_slice::<CacheEntry<V>>(&raw) {
                candidates.push((key, entry.timestamp, raw.len() as u64));
            }
        }

        candidates.sort_by_key(|(_, timestamp, _)| *timestamp);

        let mut total = self.total_size();
        for (key, _, size) in candidates {
            if total <= self.max_size_bytes {
                break;
            }

            self.db.remove(&key)?;
            total = total.saturating_sub(size);
        }

        self.set_total_size(total)?;
        Ok(())
    }

    /// Flush pending writes and close the backend.
    pub fn close(self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cache(ttl: chrono::Duration, max_size_bytes: u64) -> (tempfile::TempDir, MetadataCache<String>) {
        let dir = tempfile::tempdir().unwrap();
        let cache = MetadataCache::open(dir.path(), ttl, max_size_bytes).unwrap();
        (dir, cache)
    }

    #[test]
    fn miss_on_unknown_key() {
        let (_dir, cache) = cache(chrono::Duration::seconds(3600), 10_000_000);
        assert!(cache.get("missing").is_none());
    }

    #[test]
    fn put_then_get_round_trips() {
        let (_dir, cache) = cache(chrono::Duration::seconds(3600), 10_000_000);
        cache.put("k", "v".to_string(), true).unwrap();
        assert_eq!(cache.get("k"), Some("v".to_string()));
    }

    #[test]
    fn replace_false_conflicts_on_existing_key() {
        let (_dir, cache) = cache(chrono::Duration::seconds(3600), 10_000_000);
        cache.put("k", "v".to_string(), true).unwrap();
        let err = cache.put("k", "v2".to_string(), false).unwrap_err();
        assert!(matches!(err, CacheError::Conflict));
    }

    #[test]
    fn stale_entry_reports_as_miss() {
        let (_dir, cache) = cache(chrono::Duration::seconds(-1), 10_000_000);
        cache.put("k", "v".to_string(), true).unwrap();
        assert!(cache.get("k").is_none());
    }

    #[test]
    fn eviction_drops_oldest_entries_first_when_over_budget() {
        // Each entry's JSON encoding is a little over 100 bytes; a budget
        // of 200 holds one comfortably but forces eviction once a second
        // is written.
        let (_dir, cache) = cache(chrono::Duration::seconds(3600), 200);
        cache.put("old", "a".repeat(100), true).unwrap();
        cache.put("new", "b".repeat(100), true).unwrap();

        assert!(cache.get("old").is_none());
        assert_eq!(cache.get("new"), Some("b".repeat(100)));
    }
}
