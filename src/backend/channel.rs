use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{channel, Receiver, RecvTimeoutError, Sender, TryRecvError},
        Arc, PoisonError, RwLock, Weak,
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{filter::FilterExpr, BackendError, Row};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// One committed row change, as pushed to subscribers.
#[derive(Clone, Debug, PartialEq)]
pub struct ChangeEvent {
    /// Commit sequence, strictly increasing per backend.
    pub seq: u64,
    pub table: String,
    pub kind: ChangeKind,
    pub new: Option<Row>,
    pub old: Option<Row>,
}

impl ChangeEvent {
    /// The row the filter is evaluated against: the new image for inserts and
    /// updates, the old image for deletes.
    pub fn record(&self) -> Option<&Row> {
        match self.kind {
            ChangeKind::Delete => self.old.as_ref(),
            ChangeKind::Insert | ChangeKind::Update => self.new.as_ref(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelSpec {
    pub table: String,
    pub filter: Option<FilterExpr>,
}

impl ChannelSpec {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
            filter: None,
        }
    }

    pub fn with_filter(mut self, filter: FilterExpr) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Builds a spec from a filter string such as `empresa_uid=eq.<uid>`.
    pub fn parse(table: &str, filter: &str) -> Result<Self, BackendError> {
        Ok(Self::new(table).with_filter(filter.parse()?))
    }

    pub fn name(&self) -> String {
        format!("public:{}", self.table)
    }

    pub fn accepts(&self, event: &ChangeEvent) -> bool {
        if event.table != self.table {
            return false;
        }
        match &self.filter {
            None => true,
            Some(filter) => event.record().is_some_and(|row| filter.matches(row)),
        }
    }
}

struct Subscriber {
    spec: ChannelSpec,
    sender: Sender<ChangeEvent>,
}

type Registry = RwLock<HashMap<String, Subscriber>>;

/// Routes committed changes to the channels whose spec accepts them.
#[derive(Clone, Default)]
pub struct ChangeHub {
    channels: Arc<Registry>,
    seq: Arc<AtomicU64>,
}

impl ChangeHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open(&self, spec: ChannelSpec) -> Channel {
        let id = Uuid::now_v7().to_string();
        let (sender, receiver) = channel();
        log::debug!(
            "CHANNEL OPEN: id={} name={} filter={}",
            id,
            spec.name(),
            spec.filter.as_ref().map(|f| f.to_string()).unwrap_or_default()
        );
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), Subscriber { spec: spec.clone(), sender });
        Channel {
            id,
            spec,
            receiver,
            registry: Arc::downgrade(&self.channels),
        }
    }

    /// Delivers one change to every accepting channel and returns how many
    /// received it. Channels whose handle is gone are dropped.
    pub fn publish(&self, table: &str, kind: ChangeKind, new: Option<Row>, old: Option<Row>) -> usize {
        // The sequence is taken under the registry lock so every channel sees
        // events in sequence order.
        let mut channels = self.channels.write().unwrap_or_else(PoisonError::into_inner);
        let event = ChangeEvent {
            seq: self.seq.fetch_add(1, Ordering::SeqCst) + 1,
            table: table.to_string(),
            kind,
            new,
            old,
        };
        let mut delivered = 0;
        channels.retain(|_, sub| {
            if !sub.spec.accepts(&event) {
                return true;
            }
            match sub.sender.send(event.clone()) {
                Ok(()) => {
                    delivered += 1;
                    true
                }
                Err(_) => false,
            }
        });
        log::debug!(
            "CHANNEL PUBLISH: seq={} table={} kind={:?} delivered={}",
            event.seq,
            table,
            kind,
            delivered
        );
        delivered
    }

    pub fn open_count(&self) -> usize {
        self.channels.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Sequence of the most recently published change; zero before the first.
    pub fn last_seq(&self) -> u64 {
        self.seq.load(Ordering::SeqCst)
    }
}

/// A live change-feed subscription. Unsubscribes on drop.
pub struct Channel {
    id: String,
    spec: ChannelSpec,
    receiver: Receiver<ChangeEvent>,
    registry: Weak<Registry>,
}

impl Channel {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn spec(&self) -> &ChannelSpec {
        &self.spec
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Result<ChangeEvent, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    pub fn try_recv(&self) -> Result<ChangeEvent, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Removes the channel from the hub. Idempotent.
    pub fn unsubscribe(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            let removed = registry
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .remove(&self.id)
                .is_some();
            if removed {
                log::debug!("CHANNEL CLOSE: id={} name={}", self.id, self.spec.name());
            }
        }
        self.registry = Weak::new();
    }
}

impl Drop for Channel {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: serde_json::Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn routes_by_table_and_filter() -> anyhow::Result<()> {
        let hub = ChangeHub::new();
        let t1 = hub.open(ChannelSpec::parse("gbp_eleitores", "empresa_uid=eq.t1")?);
        let t2 = hub.open(ChannelSpec::parse("gbp_eleitores", "empresa_uid=eq.t2")?);
        let all = hub.open(ChannelSpec::new("gbp_eleitores"));
        let other = hub.open(ChannelSpec::new("gbp_categorias"));

        let delivered = hub.publish(
            "gbp_eleitores",
            ChangeKind::Insert,
            Some(row(json!({"uid": "v1", "empresa_uid": "t1"}))),
            None,
        );

        assert_eq!(delivered, 2);
        assert_eq!(t1.try_recv()?.kind, ChangeKind::Insert);
        assert!(t2.try_recv().is_err());
        assert!(all.try_recv().is_ok());
        assert!(other.try_recv().is_err());
        Ok(())
    }

    #[test]
    fn deletes_are_matched_on_the_old_row() -> anyhow::Result<()> {
        let hub = ChangeHub::new();
        let t1 = hub.open(ChannelSpec::parse("gbp_eleitores", "empresa_uid=eq.t1")?);

        hub.publish(
            "gbp_eleitores",
            ChangeKind::Delete,
            None,
            Some(row(json!({"uid": "v1", "empresa_uid": "t1"}))),
        );

        assert_eq!(t1.try_recv()?.kind, ChangeKind::Delete);
        Ok(())
    }

    #[test]
    fn sequence_numbers_increase() {
        let hub = ChangeHub::new();
        let ch = hub.open(ChannelSpec::new("t"));
        hub.publish("t", ChangeKind::Insert, Some(Row::new()), None);
        hub.publish("t", ChangeKind::Update, Some(Row::new()), None);
        let a = ch.try_recv().unwrap();
        let b = ch.try_recv().unwrap();
        assert!(b.seq > a.seq);
        assert_eq!(hub.last_seq(), b.seq);
    }

    #[test]
    fn concurrent_publishers_deliver_in_sequence_order() {
        let hub = ChangeHub::new();
        let ch = hub.open(ChannelSpec::new("t"));
        let publishers: Vec<_> = (0..4)
            .map(|_| {
                let hub = hub.clone();
                std::thread::spawn(move || {
                    for _ in 0..50 {
                        hub.publish("t", ChangeKind::Insert, Some(Row::new()), None);
                    }
                })
            })
            .collect();
        for publisher in publishers {
            publisher.join().unwrap();
        }

        let seqs: Vec<u64> = ch.receiver.try_iter().map(|e| e.seq).collect();
        assert_eq!(seqs.len(), 200);
        assert!(seqs.windows(2).all(|w| w[0] < w[1]), "out of order: {:?}", seqs);
        assert_eq!(hub.last_seq(), 200);
    }

    #[test]
    fn unsubscribe_and_drop_release_the_channel() {
        let hub = ChangeHub::new();
        let mut a = hub.open(ChannelSpec::new("t"));
        {
            let _b = hub.open(ChannelSpec::new("t"));
            assert_eq!(hub.open_count(), 2);
        }
        assert_eq!(hub.open_count(), 1);

        a.unsubscribe();
        a.unsubscribe();
        assert_eq!(hub.open_count(), 0);
        assert!(matches!(
            a.recv_timeout(Duration::from_millis(10)),
            Err(RecvTimeoutError::Disconnected)
        ));
    }
}
