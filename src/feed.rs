//! Generic change-feed subscriber.
//!
//! Keeps exactly one channel open for the currently selected tenant. A worker
//! thread forwards every event to a handler, follows tenant changes by closing
//! the old channel before opening the new one, and stops when asked.

use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    backend::{Backend, BackendError, ChangeEvent, Channel, ChannelSpec},
    store::TENANT_COLUMN,
    tenant::{TenantId, TenantStore},
};

/// Which table to follow and how to filter it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FeedSpec {
    pub table: String,
    /// Explicit filter expression; `None` means `<tenant_column>=eq.<tenant>`.
    pub filter: Option<String>,
    pub tenant_column: String,
}

impl FeedSpec {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filter: None,
            tenant_column: TENANT_COLUMN.to_string(),
        }
    }

    pub fn with_filter(mut self, filter: Option<String>) -> Self {
        self.filter = filter;
        self
    }

    pub fn channel_spec(&self, tenant: &TenantId) -> Result<ChannelSpec, BackendError> {
        let filter = match &self.filter {
            Some(filter) => filter.clone(),
            None => format!("{}=eq.{}", self.tenant_column, tenant),
        };
        ChannelSpec::parse(&self.table, &filter)
    }
}

pub trait FeedHandler: Send + 'static {
    fn on_change(&mut self, event: &ChangeEvent);

    /// Called after the channel has been swapped for a new tenant, or closed
    /// when the tenant was cleared.
    fn on_tenant_changed(&mut self, _tenant: Option<&TenantId>) {}
}

impl<F> FeedHandler for F
where
    F: FnMut(&ChangeEvent) + Send + 'static,
{
    fn on_change(&mut self, event: &ChangeEvent) {
        self(event)
    }
}

/// Handle to a running subscription. Dropping it stops the worker and
/// releases the channel before returning.
pub struct ChangeFeedSubscriber {
    table: String,
    connected: Arc<AtomicBool>,
    stop_signal: Option<Sender<()>>,
    thread_handle: Option<JoinHandle<()>>,
}

impl ChangeFeedSubscriber {
    pub fn start<H: FeedHandler>(
        backend: Arc<dyn Backend>,
        tenants: TenantStore,
        spec: FeedSpec,
        handler: H,
        poll_interval: Duration,
    ) -> Self {
        // Observe before reading the current tenant so no change is missed.
        let tenant_rx = tenants.observer();
        let tenant = tenants.current_id();
        let initial = tenant.as_ref().and_then(|t| open(backend.as_ref(), &spec, t));
        let connected = Arc::new(AtomicBool::new(initial.is_some()));

        let (stop_tx, stop_rx) = channel::<()>();
        let table = spec.table.clone();
        let worker_connected = connected.clone();
        let thread_handle = thread::spawn(move || {
            let mut worker = Worker {
                backend,
                spec,
                handler,
                channel: initial,
                connected: worker_connected,
                tenant,
            };
            worker.run(tenant_rx, stop_rx, poll_interval);
            log::debug!("feed {}: worker stopped", worker.spec.table);
        });

        ChangeFeedSubscriber {
            table,
            connected,
            stop_signal: Some(stop_tx),
            thread_handle: Some(thread_handle),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Whether a channel is currently open for the selected tenant.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    pub fn is_running(&self) -> bool {
        self.thread_handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Stops the worker and waits for it, so the channel is closed when this
    /// returns. Idempotent.
    pub fn stop(&mut self) {
        if let Some(stop_signal) = self.stop_signal.take() {
            let _ = stop_signal.send(());
        }
        if let Some(handle) = self.thread_handle.take() {
            if handle.join().is_err() {
                log::error!("feed {}: worker panicked", self.table);
            }
        }
    }
}

impl Drop for ChangeFeedSubscriber {
    fn drop(&mut self) {
        self.stop();
    }
}

fn open(backend: &dyn Backend, spec: &FeedSpec, tenant: &TenantId) -> Option<Channel> {
    let channel_spec = match spec.channel_spec(tenant) {
        Ok(channel_spec) => channel_spec,
        Err(e) => {
            log::error!("feed {}: invalid filter: {}", spec.table, e);
            return None;
        }
    };
    match backend.channel(channel_spec) {
        Ok(channel) => {
            log::info!("feed {}: subscribed for tenant {} ({})", spec.table, tenant, channel.id());
            Some(channel)
        }
        Err(e) => {
            log::error!("feed {}: failed to open channel for tenant {}: {}", spec.table, tenant, e);
            None
        }
    }
}

struct Worker<H: FeedHandler> {
    backend: Arc<dyn Backend>,
    spec: FeedSpec,
    handler: H,
    channel: Option<Channel>,
    connected: Arc<AtomicBool>,
    tenant: Option<TenantId>,
}

impl<H: FeedHandler> Worker<H> {
    fn run(&mut self, tenant_rx: Receiver<Option<TenantId>>, stop_rx: Receiver<()>, poll_interval: Duration) {
        loop {
            match stop_rx.try_recv() {
                Ok(()) | Err(TryRecvError::Disconnected) => break,
                Err(TryRecvError::Empty) => {}
            }

            if let Some(tenant) = latest(&tenant_rx) {
                self.switch_tenant(tenant);
            }

            let received = match &self.channel {
                Some(channel) => channel.recv_timeout(poll_interval),
                None => match stop_rx.recv_timeout(poll_interval) {
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                    Err(RecvTimeoutError::Timeout) => continue,
                },
            };
            match received {
                Ok(event) => self.handler.on_change(&event),
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => {
                    log::warn!("feed {}: channel closed by the backend", self.spec.table);
                    self.set_channel(None);
                }
            }
        }
        self.set_channel(None);
    }

    /// Replaces the open channel, closing the previous one first.
    fn set_channel(&mut self, channel: Option<Channel>) {
        if let Some(mut old) = self.channel.take() {
            old.unsubscribe();
        }
        self.connected.store(channel.is_some(), Ordering::SeqCst);
        self.channel = channel;
    }

    fn switch_tenant(&mut self, tenant: Option<TenantId>) {
        if tenant == self.tenant {
            return;
        }
        self.set_channel(None);
        let channel = tenant.as_ref().and_then(|t| open(self.backend.as_ref(), &self.spec, t));
        self.set_channel(channel);
        self.tenant = tenant;
        self.handler.on_tenant_changed(self.tenant.as_ref());
    }
}

/// The most recent tenant change, if any arrived since the last poll.
fn latest(rx: &Receiver<Option<TenantId>>) -> Option<Option<TenantId>> {
    rx.try_iter().last()
}
