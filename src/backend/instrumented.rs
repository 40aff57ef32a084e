use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use super::{Backend, BackendError, Channel, ChannelSpec, Filter, Row, Select};

/// Wraps another backend with artificial latency, an offline switch and call
/// counters, to simulate a slow or unreachable hosted service.
#[derive(Clone)]
pub struct InstrumentedBackend {
    inner: Arc<dyn Backend>,
    read_delay_ms: Arc<AtomicU64>,
    write_delay_ms: Arc<AtomicU64>,
    offline: Arc<AtomicBool>,
    selects: Arc<AtomicUsize>,
    writes: Arc<AtomicUsize>,
}

impl InstrumentedBackend {
    pub fn new(inner: Arc<dyn Backend>) -> Self {
        Self {
            inner,
            read_delay_ms: Arc::new(AtomicU64::new(0)),
            write_delay_ms: Arc::new(AtomicU64::new(0)),
            offline: Arc::new(AtomicBool::new(false)),
            selects: Arc::new(AtomicUsize::new(0)),
            writes: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn with_latency(self, read: Duration, write: Duration) -> Self {
        self.set_latency(read, write);
        self
    }

    pub fn set_latency(&self, read: Duration, write: Duration) {
        self.read_delay_ms.store(read.as_millis() as u64, Ordering::SeqCst);
        self.write_delay_ms.store(write.as_millis() as u64, Ordering::SeqCst);
    }

    /// While offline every read and write fails with `Unavailable`. Open
    /// channels keep delivering.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn select_count(&self) -> usize {
        self.selects.load(Ordering::SeqCst)
    }

    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn reset_counts(&self) {
        self.selects.store(0, Ordering::SeqCst);
        self.writes.store(0, Ordering::SeqCst);
    }

    fn before_read(&self) -> Result<(), BackendError> {
        self.selects.fetch_add(1, Ordering::SeqCst);
        self.pause(&self.read_delay_ms, "SELECT")
    }

    fn before_write(&self, statement: &str) -> Result<(), BackendError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.pause(&self.write_delay_ms, statement)
    }

    fn pause(&self, delay_ms: &AtomicU64, statement: &str) -> Result<(), BackendError> {
        let delay = delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            log::debug!("SLOW BACKEND {}: delay {}ms", statement, delay);
            std::thread::sleep(Duration::from_millis(delay));
        }
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("backend is offline".to_string()));
        }
        Ok(())
    }
}

impl Backend for InstrumentedBackend {
    fn select(&self, query: &Select) -> Result<Vec<Row>, BackendError> {
        self.before_read()?;
        self.inner.select(query)
    }

    fn insert(&self, table: &str, row: Row) -> Result<Row, BackendError> {
        self.before_write("INSERT")?;
        self.inner.insert(table, row)
    }

    fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>, BackendError> {
        self.before_write("UPDATE")?;
        self.inner.update(table, filters, patch)
    }

    fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>, BackendError> {
        self.before_write("DELETE")?;
        self.inner.delete(table, filters)
    }

    fn channel(&self, spec: ChannelSpec) -> Result<Channel, BackendError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(BackendError::Unavailable("backend is offline".to_string()));
        }
        self.inner.channel(spec)
    }

    fn open_channel_count(&self) -> usize {
        self.inner.open_channel_count()
    }

    fn last_seq(&self) -> u64 {
        self.inner.last_seq()
    }
}
