//! Snapshot cache shared by every hook of a session.
//!
//! Entries are keyed by (entity, tenant, filters) and hold the collection
//! exactly as last fetched. Each fetch draws a ticket before it starts; a
//! result is stored only if its ticket is newer than the one already stored,
//! so a slow, older response never overwrites a newer one.

use std::{
    any::Any,
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, PoisonError, RwLock,
    },
    time::{Duration, Instant},
};

use serde::Serialize;

use crate::tenant::TenantId;

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub entity: &'static str,
    pub tenant: TenantId,
    /// Canonical JSON of the filter set.
    pub filters: String,
}

impl CacheKey {
    pub fn new<F: Serialize>(entity: &'static str, tenant: TenantId, filters: &F) -> Self {
        Self {
            entity,
            tenant,
            filters: serde_json::to_string(filters).unwrap_or_default(),
        }
    }

    pub fn belongs_to(&self, entity: &str, tenant: &TenantId) -> bool {
        self.entity == entity && &self.tenant == tenant
    }
}

struct CacheEntry {
    rows: Arc<dyn Any + Send + Sync>,
    ticket: u64,
    fetched_at: Instant,
    stale: bool,
}

#[derive(Debug)]
pub struct Snapshot<T> {
    pub rows: Arc<Vec<T>>,
    pub ticket: u64,
    pub fetched_at: Instant,
    pub stale: bool,
}

#[derive(Clone, Default)]
pub struct QueryClient {
    entries: Arc<RwLock<HashMap<CacheKey, CacheEntry>>>,
    tickets: Arc<AtomicU64>,
}

impl QueryClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_ticket(&self) -> u64 {
        self.tickets.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn get<T: Send + Sync + 'static>(&self, key: &CacheKey) -> Option<Snapshot<T>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let entry = entries.get(key)?;
        let rows = entry.rows.clone().downcast::<Vec<T>>().ok()?;
        Some(Snapshot {
            rows,
            ticket: entry.ticket,
            fetched_at: entry.fetched_at,
            stale: entry.stale,
        })
    }

    /// The cached rows if they were fetched less than `stale_time` ago and
    /// have not been invalidated since.
    pub fn fresh<T: Send + Sync + 'static>(&self, key: &CacheKey, stale_time: Duration) -> Option<Snapshot<T>> {
        self.get(key)
            .filter(|s: &Snapshot<T>| !s.stale && s.fetched_at.elapsed() < stale_time)
    }

    /// Stores `rows` under `key` unless a newer fetch already did. Returns
    /// whether the rows were stored.
    pub fn put<T: Send + Sync + 'static>(&self, key: CacheKey, rows: Arc<Vec<T>>, ticket: u64) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = entries.get(&key) {
            if existing.ticket > ticket {
                log::debug!(
                    "cache: dropping out-of-order result for {} (ticket {} < {})",
                    key.entity,
                    ticket,
                    existing.ticket
                );
                return false;
            }
        }
        entries.insert(
            key,
            CacheEntry {
                rows,
                ticket,
                fetched_at: Instant::now(),
                stale: false,
            },
        );
        true
    }

    /// Marks every entry of `entity` under `tenant` stale, whatever its
    /// filters. Returns how many entries were affected.
    pub fn invalidate(&self, entity: &str, tenant: &TenantId) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let mut count = 0;
        for (key, entry) in entries.iter_mut() {
            if key.belongs_to(entity, tenant) {
                entry.stale = true;
                count += 1;
            }
        }
        log::debug!("cache: invalidated {} entries for {}/{}", count, entity, tenant);
        count
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
