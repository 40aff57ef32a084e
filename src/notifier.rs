use std::sync::{
    mpsc::{channel, Receiver, Sender},
    Arc, PoisonError, RwLock,
};

/// Fans an event out to every live observer. Observers whose receiving end
/// has been dropped are pruned on the next `notify`.
#[derive(Clone)]
pub struct Notifier<Event: Send + Clone + 'static> {
    senders: Arc<RwLock<Vec<Sender<Event>>>>,
}

impl<Event: Send + Clone + 'static> Notifier<Event> {
    pub fn new() -> Self {
        Self {
            senders: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn notify(&self, event: Event) {
        let mut senders = self.senders.write().unwrap_or_else(PoisonError::into_inner);
        senders.retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn observer(&self) -> Receiver<Event> {
        let (tx, rx) = channel();
        self.senders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(tx);
        rx
    }

    /// Number of registered observers, including ones dropped since the last
    /// `notify`.
    pub fn observer_count(&self) -> usize {
        self.senders.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl<Event: Send + Clone + 'static> Default for Notifier<Event> {
    fn default() -> Self {
        Self::new()
    }
}
