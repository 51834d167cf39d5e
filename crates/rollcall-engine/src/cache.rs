//! Cache layer: a read-through, TTL-bounded, tag-invalidated key/value
//! store in front of the catalog, enrollment state, and current-slot
//! decisions.
//!
//! The cache is injected as an `Arc<dyn CacheClient>`. Values are held as
//! [`serde_json::Value`] so a backend never needs to know the Rust types it
//! stores. A cached value is only ever an optimisation: attendance writes
//! always go through the store's uniqueness constraint regardless of what
//! the cache says.

use std::{
  collections::{HashMap, HashSet},
  fmt,
  time::{Duration, Instant},
};

use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use uuid::Uuid;

// ─── Keys and tags ───────────────────────────────────────────────────────────

/// A stable hash of a logical entity name and its identifying arguments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
  pub fn new(entity: &str, args: &[&dyn fmt::Display]) -> Self {
    let mut hasher = Sha256::new();
    hasher.update(entity.as_bytes());
    for arg in args {
      // Unit separator keeps ("ab", "c") and ("a", "bc") apart.
      hasher.update([0x1f]);
      hasher.update(arg.to_string().as_bytes());
    }
    Self(hex::encode(hasher.finalize()))
  }

  pub fn as_str(&self) -> &str { &self.0 }
}

/// A group of entries that are invalidated together.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheTag {
  Student(Uuid),
  DepartmentLevel(Uuid, Uuid),
}

impl fmt::Display for CacheTag {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Student(id) => write!(f, "student:{id}"),
      Self::DepartmentLevel(d, l) => write!(f, "department-level:{d}:{l}"),
    }
  }
}

// ─── TTL table ───────────────────────────────────────────────────────────────

/// Time-to-live per data class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TtlTable {
  /// Students, levels, courses.
  pub identity:    Duration,
  /// Timetable slots.
  pub schedule:    Duration,
  /// Level and course selections.
  pub selections:  Duration,
  /// Current-slot decisions.
  pub eligibility: Duration,
}

impl Default for TtlTable {
  fn default() -> Self {
    Self {
      identity:    Duration::from_secs(300),
      schedule:    Duration::from_secs(1800),
      selections:  Duration::from_secs(300),
      eligibility: Duration::from_secs(60),
    }
  }
}

// ─── Client trait ────────────────────────────────────────────────────────────

/// A thread-safe key/value cache with per-entry TTL and tag invalidation.
pub trait CacheClient: Send + Sync {
  /// The live value for `key`, if any.
  fn get(&self, key: &CacheKey) -> Option<serde_json::Value>;

  fn set(
    &self,
    key: CacheKey,
    value: serde_json::Value,
    ttl: Duration,
    tags: &[CacheTag],
  );

  /// Drop every entry carrying `tag`. Returns how many were dropped.
  fn invalidate(&self, tag: &CacheTag) -> usize;

  fn clear(&self);
}

// ─── In-memory implementation ────────────────────────────────────────────────

struct Entry {
  value:      serde_json::Value,
  expires_at: Instant,
  tags:       Vec<CacheTag>,
}

/// Entry count below which `set` never sweeps.
const PURGE_FLOOR: usize = 64;

#[derive(Default)]
struct Inner {
  entries:    HashMap<CacheKey, Entry>,
  by_tag:     HashMap<CacheTag, HashSet<CacheKey>>,
  /// Entry count at which the next `set` sweeps expired entries.
  next_purge: usize,
}

impl Inner {
  /// Drop every entry past its expiry. Returns how many were dropped.
  fn purge_expired(&mut self, now: Instant) -> usize {
    let expired: Vec<CacheKey> = self
      .entries
      .iter()
      .filter(|(_, entry)| entry.expires_at <= now)
      .map(|(key, _)| key.clone())
      .collect();
    expired.iter().filter(|key| self.remove(key)).count()
  }

  fn remove(&mut self, key: &CacheKey) -> bool {
    let Some(entry) = self.entries.remove(key) else {
      return false;
    };
    for tag in &entry.tags {
      if let Some(keys) = self.by_tag.get_mut(tag) {
        keys.remove(key);
        if keys.is_empty() {
          self.by_tag.remove(tag);
        }
      }
    }
    true
  }
}

/// Process-local cache.
///
/// An expired entry is dropped when it is read, and `set` sweeps out all
/// expired entries whenever the map has doubled since the last sweep. Keys
/// that are never read again therefore cannot accumulate.
#[derive(Default)]
pub struct MemoryCache {
  inner: Mutex<Inner>,
}

impl MemoryCache {
  pub fn new() -> Self { Self::default() }

  /// Number of stored entries, expired or not.
  pub fn len(&self) -> usize { self.inner.lock().entries.len() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}

impl CacheClient for MemoryCache {
  fn get(&self, key: &CacheKey) -> Option<serde_json::Value> {
    let mut inner = self.inner.lock();
    match inner.entries.get(key) {
      None => return None,
      Some(entry) if Instant::now() < entry.expires_at => {
        return Some(entry.value.clone());
      }
      Some(_) => {}
    }
    inner.remove(key);
    None
  }

  fn set(
    &self,
    key: CacheKey,
    value: serde_json::Value,
    ttl: Duration,
    tags: &[CacheTag],
  ) {
    let now = Instant::now();
    let mut inner = self.inner.lock();
    if inner.entries.len() >= inner.next_purge {
      let purged = inner.purge_expired(now);
      inner.next_purge = (inner.entries.len() * 2).max(PURGE_FLOOR);
      if purged > 0 {
        tracing::debug!(purged, remaining = inner.entries.len(), "purged expired cache entries");
      }
    }
    inner.remove(&key);
    for tag in tags {
      inner.by_tag.entry(*tag).or_default().insert(key.clone());
    }
    inner.entries.insert(key, Entry {
      value,
      expires_at: now + ttl,
      tags: tags.to_vec(),
    });
  }

  fn invalidate(&self, tag: &CacheTag) -> usize {
    let mut inner = self.inner.lock();
    let keys = inner.by_tag.remove(tag).unwrap_or_default();
    keys.iter().filter(|k| inner.remove(k)).count()
  }

  fn clear(&self) {
    let mut inner = self.inner.lock();
    inner.entries.clear();
    inner.by_tag.clear();
    inner.next_purge = 0;
  }
}
