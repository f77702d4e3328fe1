//! Same-day memoization of analysis results.
//!
//! Entries are keyed by request and the calendar date on which they were computed. A
//! result is served only on the day it was computed; the first request on a new day
//! recomputes it and older entries are purged on the next write.

use crate::model::{AnalysisRequest, AnalysisResult};
use chrono::{Datelike, Local, NaiveDate};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicI32, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Source of "today" for cache validity.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Local calendar date of the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

/// A settable clock for tests and replays.
#[derive(Debug)]
pub struct FixedClock {
    days_from_ce: AtomicI32,
}

impl FixedClock {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            days_from_ce: AtomicI32::new(today.num_days_from_ce()),
        }
    }

    pub fn set(&self, today: NaiveDate) {
        self.days_from_ce
            .store(today.num_days_from_ce(), Ordering::SeqCst);
    }

    pub fn advance_days(&self, days: i32) {
        self.days_from_ce.fetch_add(days, Ordering::SeqCst);
    }
}

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        NaiveDate::from_num_days_from_ce_opt(self.days_from_ce.load(Ordering::SeqCst))
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct CacheKey {
    request: AnalysisRequest,
    as_of: NaiveDate,
}

#[derive(Debug)]
struct CacheEntry {
    result: Arc<AnalysisResult>,
    computed_on: NaiveDate,
    last_used: AtomicU64,
}

#[derive(Debug)]
struct CacheInner {
    map: HashMap<CacheKey, CacheEntry>,
    max_entries: Option<usize>,
}

impl CacheInner {
    fn get(&self, key: &CacheKey, today: NaiveDate, tick: u64) -> Option<Arc<AnalysisResult>> {
        self.map.get(key).and_then(|entry| {
            if entry.computed_on == today {
                entry.last_used.store(tick, Ordering::Relaxed);
                Some(entry.result.clone())
            } else {
                None
            }
        })
    }

    fn put(&mut self, key: CacheKey, entry: CacheEntry) {
        let today = entry.computed_on;
        self.map.retain(|_, e| e.computed_on == today);
        self.map.insert(key, entry);

        if let Some(max) = self.max_entries {
            while self.map.len() > max {
                let oldest = self
                    .map
                    .iter()
                    .min_by_key(|(_, e)| e.last_used.load(Ordering::Relaxed))
                    .map(|(k, _)| *k);
                match oldest {
                    Some(k) => {
                        debug!("Evicting cached analysis {}", k.request);
                        self.map.remove(&k);
                    }
                    None => break,
                }
            }
        }
    }
}

/// Thread-safe cache of analysis results with an injected clock.
///
/// Concurrent misses for the same key may compute twice; the last write wins. Entries
/// are replaced whole under the write lock, so readers never see a partial entry.
#[derive(Clone)]
pub struct AnalysisCache {
    inner: Arc<RwLock<CacheInner>>,
    clock: Arc<dyn Clock>,
    tick: Arc<AtomicU64>,
}

impl AnalysisCache {
    /// Unbounded cache living as long as the process.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity_limit(clock, None)
    }

    /// Cache holding at most `max_entries` results, evicting the least recently used.
    /// An evicted key is recomputed on its next request even on the same day.
    pub fn with_capacity_limit(clock: Arc<dyn Clock>, max_entries: Option<usize>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(CacheInner {
                map: HashMap::new(),
                max_entries,
            })),
            clock,
            tick: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Returns today's cached result for `request`, or runs `compute` and caches its
    /// result. Errors are returned to the caller and never cached.
    pub async fn get_or_compute<F, Fut, E>(
        &self,
        request: AnalysisRequest,
        compute: F,
    ) -> Result<Arc<AnalysisResult>, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<AnalysisResult, E>>,
    {
        let today = self.clock.today();
        let key = CacheKey {
            request,
            as_of: today,
        };

        {
            let store = self.inner.read().await;
            if let Some(hit) = store.get(&key, today, self.next_tick()) {
                debug!("Cache hit for {}", request);
                return Ok(hit);
            }
        }

        debug!("Cache miss for {}, computing", request);
        let result = Arc::new(compute().await?);

        let mut store = self.inner.write().await;
        if self.clock.today() != today {
            // The day rolled over mid-computation; the result is already stale.
            debug!("Not caching {}, computed across a date change", request);
            return Ok(result);
        }
        let entry = CacheEntry {
            result: result.clone(),
            computed_on: today,
            last_used: AtomicU64::new(self.next_tick()),
        };
        store.put(key, entry);

        Ok(result)
    }

    /// Drops entries computed on a day other than today.
    pub async fn purge_stale(&self) {
        let today = self.clock.today();
        self.inner
            .write()
            .await
            .map
            .retain(|_, e| e.computed_on == today);
    }

    pub async fn clear(&self) {
        self.inner.write().await.map.clear();
    }

    /// Number of stored entries, stale ones included.
    pub async fn len(&self) -> usize {
        self.inner.read().await.map.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    fn next_tick(&self) -> u64 {
        self.tick.fetch_add(1, Ordering::Relaxed) + 1
    }
}
