//! Content-addressed memoization of comparison results.
//!
//! A [`ResultCache`] is an ordinary value with an explicit lifecycle: construct it with a
//! storage backend and a time-to-live, hand it to a
//! [`ComparisonEngine`](crate::ComparisonEngine), drop it when done. There is no
//! process-wide cache.
//!
//! The cache is best-effort. Missing files, corrupt JSON, I/O errors and poisoned locks
//! all behave like a miss (or a no-op on write) and are logged, never returned.
//!
//! Concurrent requests for the same key may both compute and both write. Every write
//! for a key stores an equivalent value, so the last writer wins harmlessly.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{CompareConfig, ComparisonResult, TrackPoint};

/// Entries older than this are treated as absent.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Number of leading points of each track that go into the fingerprint.
const FINGERPRINT_POINTS: usize = 100;

/// Bumped whenever the stored result layout changes.
const KEY_VERSION: &[u8] = b"route-divergence/v1";

const ENTRY_EXTENSION: &str = "json";

/// Expired entries are swept after every this many writes.
const PURGE_EVERY_WRITES: u64 = 64;

// ============================================================================
// Keys
// ============================================================================

/// Deterministic key for one comparison request (hex SHA-256).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey(String);

impl CacheKey {
    /// Fingerprint a request.
    ///
    /// Covers each track's point count and the latitude/longitude of its first 100
    /// points, plus both tunable parameters.
    ///
    /// # Example
    /// ```
    /// use route_divergence::{CacheKey, CompareConfig, TrackPoint};
    ///
    /// let a = vec![TrackPoint::new(1.0, 2.0), TrackPoint::new(1.001, 2.0)];
    /// let b = vec![TrackPoint::new(1.0, 2.001)];
    /// let config = CompareConfig::default();
    ///
    /// let key = CacheKey::for_request(&a, &b, &config);
    /// assert_eq!(key, CacheKey::for_request(&a, &b, &config));
    /// assert_ne!(key, CacheKey::for_request(&b, &a, &config));
    /// assert_eq!(key.as_str().len(), 64);
    /// ```
    pub fn for_request(track_a: &[TrackPoint], track_b: &[TrackPoint], config: &CompareConfig) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(KEY_VERSION);

        for track in [track_a, track_b] {
            hasher.update((track.len() as u64).to_le_bytes());
            for p in track.iter().take(FINGERPRINT_POINTS) {
                hasher.update(p.latitude.to_le_bytes());
                hasher.update(p.longitude.to_le_bytes());
            }
        }

        hasher.update(config.interpolation_distance.to_le_bytes());
        hasher.update(config.difference_threshold.to_le_bytes());

        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Entries
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
struct CacheEntry {
    created_at_ms: u64,
    result: ComparisonResult,
}

#[derive(Serialize)]
struct CacheEntryRef<'a> {
    created_at_ms: u64,
    result: &'a ComparisonResult,
}

/// Just the timestamp, for sweeping a directory without keeping whole results.
#[derive(Deserialize)]
struct EntryHeader {
    created_at_ms: u64,
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

// ============================================================================
// Cache
// ============================================================================

enum Storage {
    Memory(Mutex<HashMap<CacheKey, CacheEntry>>),
    Directory(PathBuf),
}

/// Time-limited store of [`ComparisonResult`]s keyed by [`CacheKey`].
pub struct ResultCache {
    storage: Storage,
    ttl: Duration,
    write_seq: AtomicU64,
}

impl fmt::Debug for ResultCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let backend = match &self.storage {
            Storage::Memory(_) => "memory".to_string(),
            Storage::Directory(root) => root.display().to_string(),
        };
        f.debug_struct("ResultCache")
            .field("storage", &backend)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl ResultCache {
    /// Cache held in process memory.
    pub fn in_memory(ttl: Duration) -> Self {
        Self {
            storage: Storage::Memory(Mutex::new(HashMap::new())),
            ttl,
            write_seq: AtomicU64::new(0),
        }
    }

    /// Cache stored as one JSON file per key under `root`.
    ///
    /// The directory is created on first write if it does not exist.
    pub fn in_directory(root: impl Into<PathBuf>, ttl: Duration) -> Self {
        let root = root.into();
        info!("[ResultCache] Using directory {}", root.display());
        Self {
            storage: Storage::Directory(root),
            ttl,
            write_seq: AtomicU64::new(0),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn is_expired(&self, created_at_ms: u64, now: u64) -> bool {
        let age = Duration::from_millis(now.saturating_sub(created_at_ms));
        age > self.ttl
    }

    /// Look up a fresh result. Expired entries are deleted and reported as absent.
    pub fn get(&self, key: &CacheKey) -> Option<ComparisonResult> {
        let now = now_ms();
        match &self.storage {
            Storage::Memory(map) => {
                let mut map = map.lock().ok()?;
                let expired = self.is_expired(map.get(key)?.created_at_ms, now);
                if expired {
                    debug!("[ResultCache] Entry {} expired", key);
                    map.remove(key);
                    return None;
                }
                map.get(key).map(|entry| entry.result.clone())
            }
            Storage::Directory(root) => {
                let path = entry_path(root, key);
                let entry = read_entry(&path)?;
                if self.is_expired(entry.created_at_ms, now) {
                    debug!("[ResultCache] Entry {} expired", key);
                    remove_file_quietly(&path);
                    return None;
                }
                Some(entry.result)
            }
        }
    }

    /// Store a result. Failures are logged and otherwise ignored.
    ///
    /// Every 64th write also sweeps expired entries, so a long-lived cache does not
    /// grow with keys that are never looked up again.
    pub fn put(&self, key: &CacheKey, value: &ComparisonResult) {
        let created_at_ms = now_ms();
        let seq = self.write_seq.fetch_add(1, Ordering::Relaxed);
        match &self.storage {
            Storage::Memory(map) => match map.lock() {
                Ok(mut map) => {
                    map.insert(
                        key.clone(),
                        CacheEntry {
                            created_at_ms,
                            result: value.clone(),
                        },
                    );
                }
                Err(_) => warn!("[ResultCache] Lock poisoned, skipping write of {}", key),
            },
            Storage::Directory(root) => {
                let entry = CacheEntryRef {
                    created_at_ms,
                    result: value,
                };
                if let Err(e) = write_entry(root, key, &entry, seq) {
                    warn!("[ResultCache] Failed to write entry {}: {}", key, e);
                }
            }
        }

        if (seq + 1) % PURGE_EVERY_WRITES == 0 {
            let removed = self.purge_expired();
            debug!("[ResultCache] Periodic sweep removed {} entries", removed);
        }
    }

    /// Drop one entry if present.
    pub fn remove(&self, key: &CacheKey) {
        match &self.storage {
            Storage::Memory(map) => {
                if let Ok(mut map) = map.lock() {
                    map.remove(key);
                }
            }
            Storage::Directory(root) => remove_file_quietly(&entry_path(root, key)),
        }
    }

    /// Delete every expired entry. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = now_ms();
        match &self.storage {
            Storage::Memory(map) => {
                let Ok(mut map) = map.lock() else {
                    return 0;
                };
                let before = map.len();
                map.retain(|_, entry| !self.is_expired(entry.created_at_ms, now));
                before - map.len()
            }
            Storage::Directory(root) => {
                let mut removed = 0;
                for path in entry_files(root) {
                    let expired = fs::read(&path)
                        .ok()
                        .and_then(|bytes| serde_json::from_slice::<EntryHeader>(&bytes).ok())
                        .map_or(true, |header| self.is_expired(header.created_at_ms, now));
                    if expired {
                        remove_file_quietly(&path);
                        removed += 1;
                    }
                }
                if removed > 0 {
                    info!("[ResultCache] Purged {} expired entries", removed);
                }
                removed
            }
        }
    }

    /// Delete every entry.
    pub fn clear(&self) {
        match &self.storage {
            Storage::Memory(map) => {
                if let Ok(mut map) = map.lock() {
                    map.clear();
                }
            }
            Storage::Directory(root) => {
                for path in entry_files(root) {
                    remove_file_quietly(&path);
                }
            }
        }
    }

    /// Number of stored entries, fresh or not.
    pub fn len(&self) -> usize {
        match &self.storage {
            Storage::Memory(map) => map.lock().map(|m| m.len()).unwrap_or(0),
            Storage::Directory(root) => entry_files(root).len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Directory backend helpers
// ============================================================================

fn entry_path(root: &Path, key: &CacheKey) -> PathBuf {
    root.join(format!("{}.{}", key.as_str(), ENTRY_EXTENSION))
}

fn read_entry(path: &Path) -> Option<CacheEntry> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return None,
        Err(e) => {
            warn!("[ResultCache] Failed to read {}: {}", path.display(), e);
            return None;
        }
    };

    match serde_json::from_slice::<CacheEntry>(&bytes) {
        Ok(entry) => Some(entry),
        Err(e) => {
            warn!("[ResultCache] Discarding corrupt entry {}: {}", path.display(), e);
            remove_file_quietly(path);
            None
        }
    }
}

fn write_entry(root: &Path, key: &CacheKey, entry: &CacheEntryRef<'_>, seq: u64) -> std::io::Result<()> {
    fs::create_dir_all(root)?;
    let bytes = serde_json::to_vec(entry)?;

    // Write beside the target, then rename so readers never see a partial file
    let tmp = root.join(format!("{}.{}.{}.tmp", key.as_str(), std::process::id(), seq));
    fs::write(&tmp, bytes)?;
    if let Err(e) = fs::rename(&tmp, entry_path(root, key)) {
        remove_file_quietly(&tmp);
        return Err(e);
    }
    Ok(())
}

fn entry_files(root: &Path) -> Vec<PathBuf> {
    let Ok(dir) = fs::read_dir(root) else {
        return vec![];
    };
    dir.filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION))
        .collect()
}

fn remove_file_quietly(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != ErrorKind::NotFound {
            warn!("[ResultCache] Failed to remove {}: {}", path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compare_tracks;
    use crate::Track;
    use std::thread::sleep;

    fn sample_result() -> ComparisonResult {
        let a: Vec<TrackPoint> = (0..5)
            .map(|i| TrackPoint::new(55.6761, 12.5683 + i as f64 * 0.0001).with_elevation(10.0))
            .collect();
        let b: Vec<TrackPoint> = a
            .iter()
            .map(|p| TrackPoint::new(p.latitude + 0.001, p.longitude))
            .collect();
        compare_tracks(&Track::new("a", a), &Track::new("b", b), &CompareConfig::default()).unwrap()
    }

    fn key(n: usize) -> CacheKey {
        let a: Vec<TrackPoint> = (0..n).map(|i| TrackPoint::new(0.0, i as f64)).collect();
        CacheKey::for_request(&a, &a, &CompareConfig::default())
    }

    #[test]
    fn test_key_depends_on_parameters() {
        let a = vec![TrackPoint::new(1.0, 2.0)];
        let k1 = CacheKey::for_request(&a, &a, &CompareConfig::new(10.0, 40.0));
        let k2 = CacheKey::for_request(&a, &a, &CompareConfig::new(10.0, 41.0));
        let k3 = CacheKey::for_request(&a, &a, &CompareConfig::new(5.0, 40.0));
        assert_ne!(k1, k2);
        assert_ne!(k1, k3);
    }

    #[test]
    fn test_key_depends_on_point_count() {
        // Same first 100 points, different lengths
        let base: Vec<TrackPoint> = (0..150).map(|i| TrackPoint::new(0.0, i as f64 * 0.001)).collect();
        let config = CompareConfig::default();
        let k1 = CacheKey::for_request(&base, &base, &config);
        let k2 = CacheKey::for_request(&base[..120], &base, &config);
        assert_ne!(k1, k2);
    }

    #[test]
    fn test_key_ignores_points_beyond_prefix() {
        let a: Vec<TrackPoint> = (0..150).map(|i| TrackPoint::new(0.0, i as f64 * 0.001)).collect();
        let mut b = a.clone();
        b[140] = TrackPoint::new(5.0, 5.0);
        let config = CompareConfig::default();
        assert_eq!(
            CacheKey::for_request(&a, &a, &config),
            CacheKey::for_request(&b, &a, &config)
        );
    }

    #[test]
    fn test_memory_round_trip() {
        let cache = ResultCache::in_memory(DEFAULT_CACHE_TTL);
        let value = sample_result();
        assert!(cache.get(&key(1)).is_none());

        cache.put(&key(1), &value);
        assert_eq!(cache.get(&key(1)), Some(value));
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key(2)).is_none());
    }

    #[test]
    fn test_memory_expiry() {
        let cache = ResultCache::in_memory(Duration::from_millis(10));
        cache.put(&key(1), &sample_result());
        sleep(Duration::from_millis(50));
        assert!(cache.get(&key(1)).is_none());
        // Lazily purged on lookup
        assert!(cache.is_empty());
    }

    #[test]
    fn test_memory_purge_and_clear() {
        let cache = ResultCache::in_memory(Duration::from_millis(10));
        cache.put(&key(1), &sample_result());
        cache.put(&key(2), &sample_result());
        sleep(Duration::from_millis(50));
        assert_eq!(cache.purge_expired(), 2);

        let cache = ResultCache::in_memory(DEFAULT_CACHE_TTL);
        cache.put(&key(1), &sample_result());
        cache.remove(&key(1));
        assert!(cache.is_empty());
        cache.put(&key(1), &sample_result());
        cache.clear();
        assert!(cache.is_empty());
    }

    #[test]
    fn test_writes_sweep_expired_entries() {
        let cache = ResultCache::in_memory(Duration::from_millis(200));
        let value = sample_result();
        for n in 0..10 {
            cache.put(&key(n), &value);
        }
        sleep(Duration::from_millis(300));

        // None of the stale keys is looked up again
        let fresh = PURGE_EVERY_WRITES as usize - 10;
        for n in 100..100 + fresh {
            cache.put(&key(n), &value);
        }
        assert!(cache.len() <= fresh);
        assert!(cache.get(&key(0)).is_none());
    }

    #[test]
    fn test_directory_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::in_directory(dir.path().join("cache"), DEFAULT_CACHE_TTL);
        let value = sample_result();

        assert!(cache.get(&key(1)).is_none());
        cache.put(&key(1), &value);
        assert_eq!(cache.get(&key(1)), Some(value.clone()));
        assert_eq!(cache.len(), 1);

        // A second cache over the same directory sees the entry
        let reopened = ResultCache::in_directory(dir.path().join("cache"), DEFAULT_CACHE_TTL);
        assert_eq!(reopened.get(&key(1)), Some(value));
    }

    #[test]
    fn test_directory_expiry_deletes_file() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::in_directory(dir.path(), Duration::from_millis(10));
        cache.put(&key(1), &sample_result());
        assert!(entry_path(dir.path(), &key(1)).exists());

        sleep(Duration::from_millis(50));
        assert!(cache.get(&key(1)).is_none());
        assert!(!entry_path(dir.path(), &key(1)).exists());
    }

    #[test]
    fn test_directory_corrupt_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::in_directory(dir.path(), DEFAULT_CACHE_TTL);
        fs::write(entry_path(dir.path(), &key(1)), b"{ not json").unwrap();

        assert!(cache.get(&key(1)).is_none());
        assert!(!entry_path(dir.path(), &key(1)).exists());
    }

    #[test]
    fn test_directory_unwritable_root_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("not-a-dir");
        fs::write(&file, b"occupied").unwrap();

        let cache = ResultCache::in_directory(&file, DEFAULT_CACHE_TTL);
        cache.put(&key(1), &sample_result());
        assert!(cache.get(&key(1)).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_directory_purge_and_clear() {
        let dir = tempfile::tempdir().unwrap();
        let cache = ResultCache::in_directory(dir.path(), Duration::from_millis(10));
        cache.put(&key(1), &sample_result());
        cache.put(&key(2), &sample_result());
        sleep(Duration::from_millis(50));
        assert_eq!(cache.purge_expired(), 2);
        assert!(cache.is_empty());

        let cache = ResultCache::in_directory(dir.path(), DEFAULT_CACHE_TTL);
        cache.put(&key(1), &sample_result());
        cache.put(&key(2), &sample_result());
        assert_eq!(cache.purge_expired(), 0);
        cache.remove(&key(1));
        assert_eq!(cache.len(), 1);
        cache.clear();
        assert!(cache.is_empty());
    }
}
