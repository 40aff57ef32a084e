//! Per-entity data hook: tenant-scoped list plus create, update and delete.
//!
//! An `EntityStore` never patches its snapshot locally. Every successful
//! mutation invalidates the (entity, tenant) cache entries and refetches the
//! whole collection.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, PoisonError, RwLock,
    },
    time::{Duration, Instant},
};

use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::{
    backend::{Backend, Filter, Row, Select},
    cache::{CacheKey, QueryClient},
    error::{Result, SyncError},
    session::SyncContext,
    tenant::{TenantId, TenantStore},
};

/// Column holding the owning tenant on every table.
pub const TENANT_COLUMN: &str = "empresa_uid";
pub const PRIMARY_KEY: &str = "uid";

/// Describes one entity: where it lives, how its rows decode, how its
/// collection is queried and how writes are validated.
pub trait Resource: Send + Sync + 'static {
    /// Cache namespace.
    const ENTITY: &'static str;
    const TABLE: &'static str;
    /// How long a fetched collection may be served from the cache.
    const STALE_TIME: Duration;

    type Row: DeserializeOwned + Clone + Send + Sync + 'static;
    type Draft: Send;
    type Patch: Send;
    type Filters: Serialize + Clone + Default + Send + Sync + 'static;

    /// The read for the whole collection of `tenant` narrowed by `filters`.
    fn select(tenant: &TenantId, filters: &Self::Filters) -> Select;

    /// Change-feed filter replacing the default tenant equality filter.
    fn feed_filter(_filters: &Self::Filters) -> Option<String> {
        None
    }

    fn prepare_create(ctx: &WriteContext<'_>, draft: Self::Draft) -> Result<Row>;

    fn prepare_update(ctx: &WriteContext<'_>, id: &str, patch: Self::Patch) -> Result<Row>;
}

/// What validation sees while preparing a write.
pub struct WriteContext<'a> {
    pub backend: &'a dyn Backend,
    pub tenant: &'a TenantId,
    pub user_uid: &'a str,
}

impl WriteContext<'_> {
    /// Select narrowed to the current tenant.
    pub fn scoped(&self, table: &str) -> Select {
        Select::from(table).eq(TENANT_COLUMN, self.tenant.as_str())
    }

    pub fn exists(&self, table: &str, uid: &str) -> Result<bool> {
        let query = self.scoped(table).eq(PRIMARY_KEY, uid).limit(1);
        Ok(!self.backend.select(&query)?.is_empty())
    }

    pub fn any(&self, query: Select) -> Result<bool> {
        Ok(!self.backend.select(&query.limit(1))?.is_empty())
    }
}

/// Decodes a backend row into its typed form.
pub fn decode<T: DeserializeOwned>(table: &str, row: Row) -> Result<T> {
    serde_json::from_value(Value::Object(row)).map_err(|e| SyncError::Decode {
        table: table.to_string(),
        message: e.to_string(),
    })
}

pub struct QueryState<T> {
    pub data: Arc<Vec<T>>,
    pub is_loading: bool,
    pub error: Option<SyncError>,
    pub fetched_at: Option<Instant>,
}

impl<T> Clone for QueryState<T> {
    fn clone(&self) -> Self {
        Self {
            data: self.data.clone(),
            is_loading: self.is_loading,
            error: self.error.clone(),
            fetched_at: self.fetched_at,
        }
    }
}

impl<T> Default for QueryState<T> {
    fn default() -> Self {
        Self {
            data: Arc::new(Vec::new()),
            is_loading: false,
            error: None,
            fetched_at: None,
        }
    }
}

struct Snapshot<T> {
    state: QueryState<T>,
    tenant: Option<TenantId>,
    applied_ticket: u64,
}

struct Inner<R: Resource> {
    backend: Arc<dyn Backend>,
    tenants: TenantStore,
    queries: QueryClient,
    user_uid: String,
    filters: R::Filters,
    snapshot: RwLock<Snapshot<R::Row>>,
    in_flight: AtomicUsize,
    mounted: AtomicBool,
}

pub struct EntityStore<R: Resource> {
    inner: Arc<Inner<R>>,
}

impl<R: Resource> Clone for EntityStore<R> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<R: Resource> EntityStore<R> {
    pub fn new(ctx: &SyncContext, filters: R::Filters) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend: ctx.backend.clone(),
                tenants: ctx.tenants.clone(),
                queries: ctx.queries.clone(),
                user_uid: ctx.user_uid.clone(),
                filters,
                snapshot: RwLock::new(Snapshot {
                    state: QueryState::default(),
                    tenant: None,
                    applied_ticket: 0,
                }),
                in_flight: AtomicUsize::new(0),
                mounted: AtomicBool::new(true),
            }),
        }
    }

    pub fn filters(&self) -> &R::Filters {
        &self.inner.filters
    }

    pub fn tenants(&self) -> &TenantStore {
        &self.inner.tenants
    }

    pub fn backend(&self) -> &Arc<dyn Backend> {
        &self.inner.backend
    }

    /// The snapshot, or an empty state when it belongs to a tenant other
    /// than the selected one.
    pub fn state(&self) -> QueryState<R::Row> {
        let snapshot = self.read();
        match &snapshot.tenant {
            Some(owner) if self.inner.tenants.current_id().as_ref() != Some(owner) => QueryState {
                is_loading: snapshot.state.is_loading,
                ..QueryState::default()
            },
            _ => snapshot.state.clone(),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.inner.mounted.load(Ordering::SeqCst)
    }

    /// After unmounting, fetches still return to their caller but never
    /// touch the state again.
    pub fn unmount(&self) {
        if self.inner.mounted.swap(false, Ordering::SeqCst) {
            log::debug!("{}: store unmounted", R::ENTITY);
        }
    }

    /// The tenant's collection, served from the cache while fresh.
    pub fn list(&self) -> Result<Arc<Vec<R::Row>>> {
        let tenant = self.require_tenant()?;
        let key = self.key(&tenant);
        if let Some(cached) = self.inner.queries.fresh::<R::Row>(&key, R::STALE_TIME) {
            log::debug!("{}: serving {} cached rows for {}", R::ENTITY, cached.rows.len(), tenant);
            self.apply(&tenant, cached.rows.clone(), cached.ticket);
            return Ok(cached.rows);
        }
        self.fetch(tenant, key, true)
    }

    /// Fetches the collection from the backend, bypassing the cache.
    pub fn refetch(&self) -> Result<Arc<Vec<R::Row>>> {
        let tenant = self.require_tenant()?;
        let key = self.key(&tenant);
        self.fetch(tenant, key, true)
    }

    /// Like `refetch`, but a failure is only returned, never recorded in the
    /// state: the previous rows stay on screen without an error.
    pub fn refetch_in_background(&self) -> Result<Arc<Vec<R::Row>>> {
        let tenant = self.inner.tenants.require()?;
        let key = self.key(&tenant);
        self.fetch(tenant, key, false)
    }

    /// Drops the snapshot, e.g. when the tenant it belongs to is gone.
    pub fn reset(&self) {
        let mut snapshot = self.write();
        snapshot.state = QueryState {
            is_loading: snapshot.state.is_loading,
            ..QueryState::default()
        };
        snapshot.tenant = None;
    }

    pub fn create(&self, draft: R::Draft) -> Result<R::Row> {
        let tenant = self.inner.tenants.require()?;
        let mut row = R::prepare_create(&self.write_context(&tenant), draft)?;
        row.insert(TENANT_COLUMN.to_string(), Value::from(tenant.as_str()));

        let stored = self.inner.backend.insert(R::TABLE, row).map_err(|e| {
            log::error!("{}: create failed: {}", R::ENTITY, e);
            SyncError::from(e)
        })?;
        let created = decode(R::TABLE, stored)?;
        self.after_write(&tenant);
        Ok(created)
    }

    pub fn update(&self, id: &str, patch: R::Patch) -> Result<R::Row> {
        let tenant = self.inner.tenants.require()?;
        let mut row = R::prepare_update(&self.write_context(&tenant), id, patch)?;
        row.remove(TENANT_COLUMN);
        row.remove(PRIMARY_KEY);

        let filters = self.row_filters(&tenant, id);
        if row.is_empty() {
            let current = self.inner.backend.select(
                &Select::from(R::TABLE)
                    .eq(PRIMARY_KEY, id)
                    .eq(TENANT_COLUMN, tenant.as_str()),
            )?;
            let row = current
                .into_iter()
                .next()
                .ok_or_else(|| SyncError::not_found(R::ENTITY, id))?;
            return decode(R::TABLE, row);
        }

        let updated = self.inner.backend.update(R::TABLE, &filters, row).map_err(|e| {
            log::error!("{}: update of {} failed: {}", R::ENTITY, id, e);
            SyncError::from(e)
        })?;
        let row = updated
            .into_iter()
            .next()
            .ok_or_else(|| SyncError::not_found(R::ENTITY, id))?;
        let updated = decode(R::TABLE, row)?;
        self.after_write(&tenant);
        Ok(updated)
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        let tenant = self.inner.tenants.require()?;
        let deleted = self
            .inner
            .backend
            .delete(R::TABLE, &self.row_filters(&tenant, id))
            .map_err(|e| {
                log::error!("{}: delete of {} failed: {}", R::ENTITY, id, e);
                SyncError::from(e)
            })?;
        if deleted.is_empty() {
            return Err(SyncError::not_found(R::ENTITY, id));
        }
        self.after_write(&tenant);
        Ok(())
    }

    fn require_tenant(&self) -> Result<TenantId> {
        self.inner.tenants.require().inspect_err(|e| {
            if self.is_mounted() {
                self.write().state.error = Some(e.clone());
            }
        })
    }

    fn key(&self, tenant: &TenantId) -> CacheKey {
        CacheKey::new(R::ENTITY, tenant.clone(), &self.inner.filters)
    }

    fn row_filters(&self, tenant: &TenantId, id: &str) -> [Filter; 2] {
        [
            Filter::eq(PRIMARY_KEY, id),
            Filter::eq(TENANT_COLUMN, tenant.as_str()),
        ]
    }

    fn write_context<'a>(&'a self, tenant: &'a TenantId) -> WriteContext<'a> {
        WriteContext {
            backend: self.inner.backend.as_ref(),
            tenant,
            user_uid: &self.inner.user_uid,
        }
    }

    fn after_write(&self, tenant: &TenantId) {
        self.inner.queries.invalidate(R::ENTITY, tenant);
        if !self.is_mounted() {
            return;
        }
        if let Err(e) = self.fetch(tenant.clone(), self.key(tenant), false) {
            log::warn!("{}: refetch after write failed: {}", R::ENTITY, e);
        }
    }

    fn fetch(&self, tenant: TenantId, key: CacheKey, record_error: bool) -> Result<Arc<Vec<R::Row>>> {
        let ticket = self.inner.queries.next_ticket();
        self.begin_loading();

        let query = R::select(&tenant, &self.inner.filters);
        let result = self
            .inner
            .backend
            .select(&query)
            .map_err(SyncError::from)
            .and_then(|rows| {
                rows.into_iter()
                    .map(|row| decode::<R::Row>(R::TABLE, row))
                    .collect::<Result<Vec<_>>>()
            });
        self.inner.in_flight.fetch_sub(1, Ordering::SeqCst);

        match result {
            Ok(rows) => {
                let rows = Arc::new(rows);
                log::debug!("{}: fetched {} rows for {} (ticket {})", R::ENTITY, rows.len(), tenant, ticket);
                self.inner.queries.put(key, rows.clone(), ticket);
                self.apply(&tenant, rows.clone(), ticket);
                Ok(rows)
            }
            Err(err) => {
                log::warn!("{}: fetch for {} failed: {}", R::ENTITY, tenant, err);
                if record_error {
                    self.apply_error(&tenant, err.clone(), ticket);
                } else {
                    self.finish_loading();
                }
                Err(err)
            }
        }
    }

    fn begin_loading(&self) {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        if self.is_mounted() {
            self.write().state.is_loading = true;
        }
    }

    /// Stores fetched rows unless the store is unmounted, the tenant moved on
    /// or a newer fetch already landed.
    fn apply(&self, tenant: &TenantId, rows: Arc<Vec<R::Row>>, ticket: u64) {
        if !self.accepts(tenant) {
            return;
        }
        let mut snapshot = self.write();
        snapshot.state.is_loading = self.inner.in_flight.load(Ordering::SeqCst) > 0;
        let same_tenant = snapshot.tenant.as_ref() == Some(tenant);
        if same_tenant && ticket < snapshot.applied_ticket {
            log::debug!("{}: discarding out-of-order result (ticket {})", R::ENTITY, ticket);
            return;
        }
        snapshot.state.data = rows;
        snapshot.state.error = None;
        snapshot.state.fetched_at = Some(Instant::now());
        snapshot.tenant = Some(tenant.clone());
        snapshot.applied_ticket = ticket;
    }

    fn finish_loading(&self) {
        if self.is_mounted() {
            self.write().state.is_loading = self.inner.in_flight.load(Ordering::SeqCst) > 0;
        }
    }

    fn apply_error(&self, tenant: &TenantId, err: SyncError, ticket: u64) {
        if !self.accepts(tenant) {
            return;
        }
        let mut snapshot = self.write();
        snapshot.state.is_loading = self.inner.in_flight.load(Ordering::SeqCst) > 0;
        if snapshot.tenant.as_ref() == Some(tenant) && ticket < snapshot.applied_ticket {
            return;
        }
        snapshot.state.error = Some(err);
    }

    fn accepts(&self, tenant: &TenantId) -> bool {
        if !self.is_mounted() {
            log::debug!("{}: discarding result for unmounted store", R::ENTITY);
            return false;
        }
        if self.inner.tenants.current_id().as_ref() != Some(tenant) {
            log::debug!("{}: discarding result for previous tenant {}", R::ENTITY, tenant);
            return false;
        }
        true
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Snapshot<R::Row>> {
        self.inner.snapshot.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Snapshot<R::Row>> {
        self.inner.snapshot.write().unwrap_or_else(PoisonError::into_inner)
    }
}
