//! Realtime collection: an `EntityStore` kept current by a change feed.
//!
//! Every change event refetches the whole collection while the realtime
//! toggle is on. With the toggle off, events are received and dropped, and
//! the channel stays open. Turning the toggle back on never replays events
//! committed while it was off. There is no debouncing: N events cause N
//! refetches.

use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, PoisonError, RwLock,
};

use crate::{
    backend::{Backend, ChangeEvent},
    error::{Result, SyncError},
    feed::{ChangeFeedSubscriber, FeedHandler, FeedSpec},
    session::SyncContext,
    store::{EntityStore, QueryState, Resource},
    tenant::TenantId,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SyncPhase {
    /// No tenant selected.
    Uninitialized,
    /// Tenant known, channel open, snapshot populated.
    SubscribedIdle,
    Refetching,
    /// Terminal.
    Unsubscribed,
}

struct Shared {
    realtime: AtomicBool,
    /// Events up to this sequence were committed while realtime was off.
    resume_after: AtomicU64,
    phase: RwLock<SyncPhase>,
}

impl Shared {
    fn new(realtime: bool) -> Self {
        Self {
            realtime: AtomicBool::new(realtime),
            resume_after: AtomicU64::new(0),
            phase: RwLock::new(SyncPhase::Uninitialized),
        }
    }

    fn is_realtime(&self) -> bool {
        self.realtime.load(Ordering::SeqCst)
    }

    fn set_realtime(&self, enabled: bool, backend: &dyn Backend) {
        if enabled && !self.is_realtime() {
            // The watermark must be in place before events are accepted again.
            self.resume_after.fetch_max(backend.last_seq(), Ordering::SeqCst);
        }
        self.realtime.store(enabled, Ordering::SeqCst);
    }

    fn accepts(&self, event: &ChangeEvent) -> bool {
        self.is_realtime() && event.seq > self.resume_after.load(Ordering::SeqCst)
    }

    fn phase(&self) -> SyncPhase {
        *self.phase.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_phase(&self, phase: SyncPhase) {
        let mut current = self.phase.write().unwrap_or_else(PoisonError::into_inner);
        if *current != SyncPhase::Unsubscribed {
            *current = phase;
        }
    }

    /// Runs `op` in the `Refetching` phase. Success ends in `SubscribedIdle`,
    /// failure restores the phase `op` started from.
    fn refetching<T>(&self, op: impl FnOnce() -> Result<T>) -> Result<T> {
        let before = self.phase();
        self.set_phase(SyncPhase::Refetching);
        let result = op();
        self.set_phase(match result {
            Ok(_) => SyncPhase::SubscribedIdle,
            Err(_) => before,
        });
        result
    }
}

/// Receives feed callbacks on the subscriber's worker thread.
struct Refresher<R: Resource> {
    store: EntityStore<R>,
    shared: Arc<Shared>,
}

impl<R: Resource> Refresher<R> {
    fn refetch(&self, reason: &str) {
        if let Err(e) = self.shared.refetching(|| self.store.refetch_in_background()) {
            // Background failure: the previous snapshot stays visible.
            log::warn!("{}: refetch after {} failed: {}", R::ENTITY, reason, e);
        }
    }
}

impl<R: Resource> FeedHandler for Refresher<R> {
    fn on_change(&mut self, event: &ChangeEvent) {
        if !self.shared.accepts(event) {
            log::debug!(
                "{}: realtime disabled, ignoring {:?} (seq {})",
                R::ENTITY,
                event.kind,
                event.seq
            );
            return;
        }
        log::debug!("{}: {:?} event (seq {}), refetching", R::ENTITY, event.kind, event.seq);
        self.refetch("change event");
    }

    fn on_tenant_changed(&mut self, tenant: Option<&TenantId>) {
        self.store.reset();
        self.shared.set_phase(SyncPhase::Uninitialized);
        if let Some(tenant) = tenant {
            log::info!("{}: tenant changed to {}, reloading", R::ENTITY, tenant);
            self.refetch("tenant change");
        }
    }
}

pub struct RealtimeCollection<R: Resource> {
    store: EntityStore<R>,
    shared: Arc<Shared>,
    subscriber: Option<ChangeFeedSubscriber>,
}

impl<R: Resource> RealtimeCollection<R> {
    /// Loads the collection for the current tenant, if any, then subscribes
    /// to its table.
    pub fn mount(ctx: &SyncContext, filters: R::Filters) -> Self {
        let store = EntityStore::<R>::new(ctx, filters);
        let shared = Arc::new(Shared::new(ctx.config.realtime_by_default));

        if ctx.tenants.current_id().is_some() {
            if let Err(e) = shared.refetching(|| store.list()) {
                log::warn!("{}: initial load failed: {}", R::ENTITY, e);
            }
        }

        let spec = FeedSpec::new(R::TABLE).with_filter(R::feed_filter(store.filters()));
        let subscriber = ChangeFeedSubscriber::start(
            ctx.backend.clone(),
            ctx.tenants.clone(),
            spec,
            Refresher {
                store: store.clone(),
                shared: shared.clone(),
            },
            ctx.config.feed_poll_interval(),
        );

        Self {
            store,
            shared,
            subscriber: Some(subscriber),
        }
    }

    /// The current rows; empty until the first load lands.
    pub fn data(&self) -> Arc<Vec<R::Row>> {
        self.store.state().data
    }

    pub fn is_loading(&self) -> bool {
        self.store.state().is_loading
    }

    pub fn error(&self) -> Option<SyncError> {
        self.store.state().error
    }

    pub fn state(&self) -> QueryState<R::Row> {
        self.store.state()
    }

    /// `SubscribedIdle` is only reported while the channel is actually open.
    pub fn phase(&self) -> SyncPhase {
        match (self.shared.phase(), &self.subscriber) {
            (SyncPhase::SubscribedIdle, Some(subscriber)) if !subscriber.is_connected() => SyncPhase::Uninitialized,
            (phase, _) => phase,
        }
    }

    pub fn is_realtime(&self) -> bool {
        self.shared.is_realtime()
    }

    /// Flips the toggle and returns the new value.
    pub fn toggle_realtime(&self) -> bool {
        let enabled = !self.is_realtime();
        self.set_realtime(enabled);
        enabled
    }

    /// Events committed while the toggle was off are not replayed when it is
    /// turned back on.
    pub fn set_realtime(&self, enabled: bool) {
        self.shared.set_realtime(enabled, self.store.backend().as_ref());
        log::debug!("{}: realtime {}", R::ENTITY, if enabled { "enabled" } else { "disabled" });
    }

    pub fn store(&self) -> &EntityStore<R> {
        &self.store
    }

    pub fn refetch(&self) -> Result<Arc<Vec<R::Row>>> {
        self.store.tenants().require()?;
        self.shared.refetching(|| self.store.refetch())
    }

    pub fn create(&self, draft: R::Draft) -> Result<R::Row> {
        self.mutate(|store| store.create(draft))
    }

    pub fn update(&self, id: &str, patch: R::Patch) -> Result<R::Row> {
        self.mutate(|store| store.update(id, patch))
    }

    pub fn delete(&self, id: &str) -> Result<()> {
        self.mutate(|store| store.delete(id))
    }

    /// Closes the channel and stops applying results. Terminal.
    pub fn unmount(&mut self) {
        self.store.unmount();
        if let Some(mut subscriber) = self.subscriber.take() {
            subscriber.stop();
            log::debug!("{}: unsubscribed", R::ENTITY);
        }
        *self.shared.phase.write().unwrap_or_else(PoisonError::into_inner) = SyncPhase::Unsubscribed;
    }

    fn mutate<T>(&self, op: impl FnOnce(&EntityStore<R>) -> Result<T>) -> Result<T> {
        // Precondition failures must not disturb the phase.
        self.store.tenants().require()?;
        self.shared.refetching(|| op(&self.store))
    }
}

impl<R: Resource> Drop for RealtimeCollection<R> {
    fn drop(&mut self) {
        self.unmount();
    }
}
