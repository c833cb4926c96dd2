//! This module contains the bounded report cache: analysis results keyed by
//! a content hash of the bytecode, with least-recently-used eviction and
//! per-key locking so concurrent requests for the same bytecode converge on
//! a single computation.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
};

use dashmap::DashMap;
use sha3::{Digest, Keccak256};

use crate::{
    constant::DEFAULT_CACHE_CAPACITY,
    error::cache,
    report::AnalysisReport,
};

/// The identity of a bytecode in the cache: the Keccak-256 hash of its raw
/// bytes.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct CacheKey([u8; 32]);

impl CacheKey {
    /// Computes the cache key for the provided bytecode.
    #[must_use]
    pub fn of(bytecode: &[u8]) -> Self {
        let mut hasher = Keccak256::new();
        hasher.update(bytecode);
        Self(hasher.finalize().into())
    }
}

/// A bounded, thread-safe cache of analysis reports.
///
/// Entries are immutable once written. Each key owns a cell guarded by its
/// own lock, so a second request for a bytecode that is already being
/// analysed blocks on that cell and receives the first request's result
/// instead of duplicating the work. Cache failures degrade to uncached
/// computation; they are logged, never surfaced to the caller.
#[derive(Debug)]
pub struct ReportCache {
    entries:  DashMap<CacheKey, Arc<Mutex<Option<Arc<AnalysisReport>>>>>,
    recency:  Mutex<VecDeque<CacheKey>>,
    capacity: usize,
}

impl ReportCache {
    /// Constructs a cache with the default capacity.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CACHE_CAPACITY)
    }

    /// Constructs a cache that retains at most `capacity` reports.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: DashMap::new(),
            recency: Mutex::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// Gets the cached report for `bytecode`, computing and caching it with
    /// `compute` on a miss.
    ///
    /// A cached report comes back with its `cache_hit` flag raised.
    ///
    /// # Errors
    ///
    /// Only when `compute` fails; cache-internal failures fall back to an
    /// uncached computation.
    pub fn get_or_compute<E>(
        &self,
        bytecode: &[u8],
        compute: impl FnOnce() -> Result<AnalysisReport, E>,
    ) -> Result<Arc<AnalysisReport>, E> {
        let key = CacheKey::of(bytecode);

        let cell = self
            .entries
            .entry(key)
            .or_insert_with(|| Arc::new(Mutex::new(None)))
            .clone();

        let mut guard = match cell.lock() {
            Ok(guard) => guard,
            Err(_) => {
                // A previous holder panicked mid-computation. The entry is
                // suspect, so compute fresh and leave the cache alone.
                let error = cache::Error::PoisonedEntry {
                    key: hex::encode(key.0),
                };
                tracing::warn!(error = %error, "report cache degraded to uncached computation");
                return compute().map(Arc::new);
            }
        };

        if let Some(report) = guard.as_ref() {
            let mut hit = (**report).clone();
            hit.cache_hit = true;
            drop(guard);
            self.touch(key);
            return Ok(Arc::new(hit));
        }

        let report = Arc::new(compute()?);
        *guard = Some(report.clone());
        drop(guard);

        self.touch(key);
        self.evict_over_capacity();

        Ok(report)
    }

    /// Gets the number of reports currently retained.
    #[must_use]
    pub fn len(&self) -> usize {
        self.recency
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Checks if the cache holds no reports.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Marks `key` as the most recently used entry.
    fn touch(&self, key: CacheKey) {
        let mut recency = self
            .recency
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        recency.retain(|existing| *existing != key);
        recency.push_back(key);
    }

    /// Drops least-recently-used entries until the cache fits its capacity.
    fn evict_over_capacity(&self) {
        let mut recency = self
            .recency
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        while recency.len() > self.capacity {
            if let Some(evicted) = recency.pop_front() {
                self.entries.remove(&evicted);
                tracing::debug!(key = %hex::encode(evicted.0), "evicted cached report");
            }
        }
    }
}

impl Default for ReportCache {
    fn default() -> Self {
        Self::new()
    }
}
