use crate::types::GeoCoordinate;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Derives the stable cache key for a candidate query string.
pub fn cache_key(query: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(query.as_bytes());
    hex::encode(hasher.finalize())
}

/// Persistent query-string → coordinate cache consulted before any provider
/// call.
///
/// Keys are digests produced by [`cache_key`]. Entries are written once and
/// never evicted here; an implementation may expire entries behind this
/// interface without affecting the resolver. Both operations are best-effort:
/// a corrupt or unreadable record is a miss, a failed write is ignored.
pub trait GeocodeCache: Send + Sync {
    fn get(&self, key: &str) -> Option<GeoCoordinate>;
    fn put(&self, key: &str, coordinate: &GeoCoordinate);
}

/// Durable cache: one JSON record per key, sharded by the first two byte
/// pairs of the hex digest.
pub struct FsGeocodeCache {
    root: PathBuf,
}

impl FsGeocodeCache {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn record_path(&self, key: &str) -> Option<PathBuf> {
        // Keys are 64-char sha256 hex digests; anything shorter is not ours.
        if key.len() < 4 || !key.is_ascii() {
            return None;
        }
        Some(
            self.root
                .join(&key[0..2])
                .join(&key[2..4])
                .join(format!("{key}.json")),
        )
    }
}

impl GeocodeCache for FsGeocodeCache {
    fn get(&self, key: &str) -> Option<GeoCoordinate> {
        let path = self.record_path(key)?;
        let content = fs::read_to_string(path).ok()?;
        match serde_json::from_str(&content) {
            Ok(coordinate) => Some(coordinate),
            Err(err) => {
                debug!(key, "discarding unparseable cache record: {err}");
                None
            }
        }
    }

    fn put(&self, key: &str, coordinate: &GeoCoordinate) {
        let Some(path) = self.record_path(key) else {
            return;
        };
        let write = || -> std::io::Result<()> {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            let content = serde_json::to_string(coordinate)?;
            fs::write(&path, content)
        };
        if let Err(err) = write() {
            debug!(key, "failed to persist cache record: {err}");
        }
    }
}

/// In-memory cache for tests and cache-less deployments.
#[derive(Default)]
pub struct MemoryGeocodeCache {
    entries: Mutex<HashMap<String, GeoCoordinate>>,
}

impl MemoryGeocodeCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl GeocodeCache for MemoryGeocodeCache {
    fn get(&self, key: &str) -> Option<GeoCoordinate> {
        self.entries.lock().unwrap().get(key).copied()
    }

    fn put(&self, key: &str, coordinate: &GeoCoordinate) {
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), *coordinate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const COORD: GeoCoordinate = GeoCoordinate {
        lat: -23.561414,
        lng: -46.655881,
    };

    #[test]
    fn cache_key_is_deterministic_and_distinct() {
        let a = cache_key("Avenida Paulista, Bela Vista, Sao Paulo - SP, Brasil");
        let b = cache_key("Avenida Paulista, Bela Vista, Sao Paulo - SP, Brasil");
        let c = cache_key("Bela Vista, Sao Paulo - SP, Brasil");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fs_cache_round_trip() {
        let dir = tempdir().unwrap();
        let cache = FsGeocodeCache::new(dir.path());
        let key = cache_key("some query");

        assert!(cache.get(&key).is_none());
        cache.put(&key, &COORD);
        assert_eq!(cache.get(&key), Some(COORD));
    }

    #[test]
    fn corrupt_record_reads_as_miss() {
        let dir = tempdir().unwrap();
        let cache = FsGeocodeCache::new(dir.path());
        let key = cache_key("corrupted");

        let path = dir
            .path()
            .join(&key[0..2])
            .join(&key[2..4])
            .join(format!("{key}.json"));
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, "{not json").unwrap();

        assert!(cache.get(&key).is_none());
    }

    #[test]
    fn memory_cache_round_trip() {
        let cache = MemoryGeocodeCache::new();
        let key = cache_key("some query");

        assert!(cache.get(&key).is_none());
        cache.put(&key, &COORD);
        assert_eq!(cache.get(&key), Some(COORD));
        assert_eq!(cache.len(), 1);
    }
}
