//! The Rollcall attendance engine.
//!
//! [`Engine`] wraps any [`AttendanceStore`] with the behaviour that sits
//! above storage: the eligibility checks and attendance marking, the audited
//! enrollment workflows, session transitions with presence finalization, the
//! auto-absent sweep, and a read-through cache with explicit invalidation.
//!
//! ```rust,ignore
//! let engine = Engine::new(store)
//!   .with_offset(FixedOffset::east_opt(3600).unwrap())
//!   .with_finalizer(Arc::new(MyFinalizer));
//! let record = engine.mark_attendance(student_id, Utc::now()).await?;
//! ```

pub mod cache;
pub mod catalog;
pub mod collaborators;
pub mod eligibility;
pub mod enrollment;
pub mod error;
pub mod ledger;
pub mod sessions;
pub mod sweep;

use std::{future::Future, sync::Arc, time::Duration};

use chrono::{DateTime, FixedOffset, Offset as _, Utc};
use rollcall_core::{
  attendance::PresenceThresholds,
  catalog::LocalMoment,
  store::AttendanceStore,
};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
  cache::{CacheClient, CacheKey, CacheTag, MemoryCache, TtlTable},
  collaborators::{LoggingFinalizer, NoopNotifier, Notification, Notifier, PresenceFinalizer},
};

pub use error::{Error, Result};

/// The attendance engine over a storage backend `S`.
///
/// Cloning is cheap; clones share the store, cache, and collaborators.
pub struct Engine<S> {
  store:      Arc<S>,
  cache:      Arc<dyn CacheClient>,
  ttl:        TtlTable,
  offset:     FixedOffset,
  thresholds: PresenceThresholds,
  finalizer:  Arc<dyn PresenceFinalizer>,
  notifier:   Arc<dyn Notifier>,
}

impl<S> Clone for Engine<S> {
  fn clone(&self) -> Self {
    Self {
      store:      self.store.clone(),
      cache:      self.cache.clone(),
      ttl:        self.ttl,
      offset:     self.offset,
      thresholds: self.thresholds,
      finalizer:  self.finalizer.clone(),
      notifier:   self.notifier.clone(),
    }
  }
}

impl<S: AttendanceStore> Engine<S> {
  /// An engine with an in-memory cache, default TTLs, UTC local time, and
  /// logging-only collaborators.
  pub fn new(store: S) -> Self {
    Self {
      store:      Arc::new(store),
      cache:      Arc::new(MemoryCache::new()),
      ttl:        TtlTable::default(),
      offset:     Utc.fix(),
      thresholds: PresenceThresholds::default(),
      finalizer:  Arc::new(LoggingFinalizer),
      notifier:   Arc::new(NoopNotifier),
    }
  }

  pub fn with_cache(mut self, cache: Arc<dyn CacheClient>) -> Self {
    self.cache = cache;
    self
  }

  pub fn with_ttl(mut self, ttl: TtlTable) -> Self {
    self.ttl = ttl;
    self
  }

  /// The institution's local time zone.
  pub fn with_offset(mut self, offset: FixedOffset) -> Self {
    self.offset = offset;
    self
  }

  pub fn with_thresholds(mut self, thresholds: PresenceThresholds) -> Self {
    self.thresholds = thresholds;
    self
  }

  pub fn with_finalizer(mut self, finalizer: Arc<dyn PresenceFinalizer>) -> Self {
    self.finalizer = finalizer;
    self
  }

  pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
    self.notifier = notifier;
    self
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn cache(&self) -> &dyn CacheClient { self.cache.as_ref() }

  /// `now` on the institution's calendar.
  pub fn local(&self, now: DateTime<Utc>) -> LocalMoment {
    LocalMoment::at(now, self.offset)
  }

  // ─── Cache plumbing ────────────────────────────────────────────────────────

  /// Serve `key` from the cache, or run `load` and cache its result.
  ///
  /// An entry that no longer deserialises as `T` is treated as a miss.
  async fn cached<T, F, Fut>(
    &self,
    key: CacheKey,
    ttl: Duration,
    tags: &[CacheTag],
    load: F,
  ) -> Result<T>
  where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
  {
    if let Some(hit) = self.cache.get(&key) {
      match serde_json::from_value(hit) {
        Ok(value) => {
          tracing::debug!(key = key.as_str(), "cache hit");
          return Ok(value);
        }
        Err(error) => {
          tracing::debug!(key = key.as_str(), %error, "discarding undecodable cache entry");
        }
      }
    }

    let value = load().await?;
    match serde_json::to_value(&value) {
      Ok(json) => self.cache.set(key, json, ttl, tags),
      Err(error) => tracing::warn!(%error, "value not cacheable"),
    }
    Ok(value)
  }

  fn invalidate(&self, tag: CacheTag) {
    let dropped = self.cache.invalidate(&tag);
    tracing::debug!(%tag, dropped, "cache invalidated");
  }

  // ─── Collaborators ─────────────────────────────────────────────────────────

  fn notify(&self, notification: Notification) {
    if let Err(error) = self.notifier.notify(&notification) {
      tracing::warn!(%error, ?notification, "notification failed");
    }
  }
}

#[cfg(test)]
mod tests;
