// Connection lifecycle shim
//
// There is no socket. The store still reports the lifecycle a client library
// expects: ready on construction, then close and end on disconnect.

use tokio::sync::{broadcast, watch};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Ready,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    Ready,
    Close,
    End,
}

#[derive(Debug)]
pub struct ConnectionShim {
    status: watch::Sender<ConnectionStatus>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionShim {
    /// Status is `Ready` as soon as this returns
    pub fn new() -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Ready);
        let (events, _) = broadcast::channel(16);
        Self { status, events }
    }

    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    pub fn is_open(&self) -> bool {
        self.status() == ConnectionStatus::Ready
    }

    /// Lifecycle events emitted from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Status updates, used by blocked waiters to notice teardown
    pub fn watch(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Move to `End`, emitting `Close` then `End`. Returns false if already ended.
    pub fn disconnect(&self) -> bool {
        let previous = self.status.send_replace(ConnectionStatus::End);
        if previous == ConnectionStatus::End {
            return false;
        }

        let _ = self.events.send(ConnectionEvent::Close);
        let _ = self.events.send(ConnectionEvent::End);
        info!("Connection closed");
        true
    }
}

impl Default for ConnectionShim {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ready_on_construction() {
        let conn = ConnectionShim::new();
        assert_eq!(conn.status(), ConnectionStatus::Ready);
        assert!(conn.is_open());
    }

    #[tokio::test]
    async fn test_disconnect_emits_close_then_end() {
        let conn = ConnectionShim::new();
        let mut events = conn.subscribe();
        let mut status = conn.watch();

        assert!(conn.disconnect());
        assert_eq!(conn.status(), ConnectionStatus::End);
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::Close);
        assert_eq!(events.recv().await.unwrap(), ConnectionEvent::End);

        status.changed().await.unwrap();
        assert_eq!(*status.borrow(), ConnectionStatus::End);

        assert!(!conn.disconnect());
        assert!(events.try_recv().is_err());
    }
}
