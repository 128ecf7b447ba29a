// Marker notifications - one broadcast channel per store carrying key names

use std::sync::OnceLock;
use tokio::sync::broadcast;

/// Default capacity of the marker channel
pub const DEFAULT_CAPACITY: usize = 1024;

/// Multicast channel announcing writes to marker keys.
///
/// The sender is created on first use and lives as long as the store.
/// Receivers that fall behind see `RecvError::Lagged`, which waiters treat
/// as a reason to retry their pop.
#[derive(Debug)]
pub struct MarkerNotifier {
    sender: OnceLock<broadcast::Sender<String>>,
    capacity: usize,
}

impl MarkerNotifier {
    pub fn new(capacity: usize) -> Self {
        Self {
            sender: OnceLock::new(),
            capacity: capacity.max(1),
        }
    }

    fn sender(&self) -> &broadcast::Sender<String> {
        self.sender.get_or_init(|| {
            let (tx, _) = broadcast::channel(self.capacity);
            tx
        })
    }

    /// Publish a key name; returns the number of listeners that will see it
    pub fn publish(&self, key: &str) -> usize {
        match self.sender.get() {
            Some(tx) => tx.send(key.to_string()).unwrap_or(0),
            // Nobody has ever subscribed, so nobody can be waiting
            None => 0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<String> {
        self.sender().subscribe()
    }

    /// Number of live receivers
    pub fn listener_count(&self) -> usize {
        self.sender.get().map_or(0, |tx| tx.receiver_count())
    }
}

impl Default for MarkerNotifier {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
