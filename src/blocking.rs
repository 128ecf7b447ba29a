// Blocking pop emulation on top of non-blocking ZPOPMIN
//
// A waiter subscribes to the store's marker channel before its first pop, so
// a ZADD landing between the empty pop and the wait is never missed.

use crate::commands::zset::format_score;
use crate::connection::ConnectionStatus;
use crate::error::{Result, StoreError};
use crate::marshal::Value;
use crate::pubsub::MarkerNotifier;
use bytes::Bytes;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::time::{sleep_until, Instant};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaiterState {
    Idle,
    Waiting,
    Resolved,
    TimedOut,
    Cancelled,
}

/// A popped sorted-set entry together with the key it came from
#[derive(Debug, Clone, PartialEq)]
pub struct BlockingPop {
    pub key: String,
    pub member: Bytes,
    pub score: f64,
}

impl BlockingPop {
    /// `[key, member, score]`, the shape BZPOPMIN replies with
    pub fn into_value(self) -> Value {
        Value::Array(vec![
            Value::from(self.key),
            Value::Str(self.member),
            Value::Str(format_score(self.score)),
        ])
    }
}

/// Parse a BZPOPMIN timeout in seconds; `0` waits forever.
pub fn parse_timeout(timeout_secs: f64) -> Result<Option<Duration>> {
    if timeout_secs == 0.0 {
        return Ok(None);
    }
    if timeout_secs.is_nan() || timeout_secs < 0.0 {
        return Err(StoreError::InvalidTimeout);
    }
    Duration::try_from_secs_f64(timeout_secs)
        .map(Some)
        .map_err(|_| StoreError::InvalidTimeout)
}

enum Wake {
    Notified,
    Elapsed,
    StatusChanged,
    ChannelClosed,
}

/// One in-flight blocking pop. Dropping it unsubscribes from the marker channel.
pub struct BlockingWaiter {
    key: String,
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    state: WaiterState,
    rx: broadcast::Receiver<String>,
    status: watch::Receiver<ConnectionStatus>,
}

impl BlockingWaiter {
    pub fn new(
        key: impl Into<String>,
        timeout_secs: f64,
        notifier: &MarkerNotifier,
        status: watch::Receiver<ConnectionStatus>,
    ) -> Result<Self> {
        let timeout = parse_timeout(timeout_secs)?;
        let deadline = match timeout {
            Some(t) => Some(Instant::now().checked_add(t).ok_or(StoreError::InvalidTimeout)?),
            None => None,
        };
        Ok(Self {
            key: key.into(),
            timeout,
            deadline,
            state: WaiterState::Idle,
            rx: notifier.subscribe(),
            status,
        })
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn state(&self) -> WaiterState {
        self.state
    }

    /// Pop once, then retry on every notification for this key until an
    /// entry arrives, the timeout passes or the connection ends.
    ///
    /// A timeout is `Ok(None)`; teardown is `Err(ConnectionClosed)`.
    pub async fn wait<F>(&mut self, mut try_pop: F) -> Result<Option<BlockingPop>>
    where
        F: FnMut(&str) -> Result<Option<(Bytes, f64)>>,
    {
        if *self.status.borrow() == ConnectionStatus::End {
            self.state = WaiterState::Cancelled;
            return Err(StoreError::ConnectionClosed);
        }

        if let Some(pop) = self.attempt(&mut try_pop)? {
            return Ok(Some(pop));
        }

        self.state = WaiterState::Waiting;
        let deadline = self.deadline;
        debug!("Blocking on {} (timeout {:?})", self.key, self.timeout);

        loop {
            let wake = tokio::select! {
                msg = self.rx.recv() => match msg {
                    Ok(key) if key == self.key => Wake::Notified,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Waiter on {} lagged by {} notifications", self.key, skipped);
                        Wake::Notified
                    }
                    Err(RecvError::Closed) => Wake::ChannelClosed,
                },
                _ = sleep_until_deadline(deadline) => Wake::Elapsed,
                changed = self.status.changed() => match changed {
                    Ok(()) => Wake::StatusChanged,
                    Err(_) => Wake::ChannelClosed,
                },
            };

            match wake {
                Wake::Notified => {
                    if let Some(pop) = self.attempt(&mut try_pop)? {
                        return Ok(Some(pop));
                    }
                }
                Wake::Elapsed => {
                    self.state = WaiterState::TimedOut;
                    debug!("Blocking pop on {} timed out", self.key);
                    return Ok(None);
                }
                Wake::StatusChanged => {
                    if *self.status.borrow() == ConnectionStatus::End {
                        self.state = WaiterState::Cancelled;
                        return Err(StoreError::ConnectionClosed);
                    }
                }
                Wake::ChannelClosed => {
                    self.state = WaiterState::Cancelled;
                    return Err(StoreError::ConnectionClosed);
                }
            }
        }
    }

    fn attempt<F>(&mut self, try_pop: &mut F) -> Result<Option<BlockingPop>>
    where
        F: FnMut(&str) -> Result<Option<(Bytes, f64)>>,
    {
        match try_pop(&self.key)? {
            Some((member, score)) => {
                self.state = WaiterState::Resolved;
                Ok(Some(BlockingPop {
                    key: self.key.clone(),
                    member,
                    score,
                }))
            }
            None => Ok(None),
        }
    }
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::ConnectionShim;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    type Queue = Arc<Mutex<VecDeque<(Bytes, f64)>>>;

    fn popper(queue: &Queue) -> impl FnMut(&str) -> Result<Option<(Bytes, f64)>> {
        let queue = Arc::clone(queue);
        move |_key| Ok(queue.lock().unwrap().pop_front())
    }

    #[test]
    fn test_parse_timeout() {
        assert_eq!(parse_timeout(0.0).unwrap(), None);
        assert_eq!(parse_timeout(1.5).unwrap(), Some(Duration::from_millis(1500)));
        assert!(parse_timeout(-1.0).is_err());
        assert!(parse_timeout(f64::NAN).is_err());
    }

    #[tokio::test]
    async fn test_unreachable_deadline_is_rejected() {
        let notifier = MarkerNotifier::default();
        let conn = ConnectionShim::new();
        let result = BlockingWaiter::new("q:marker", 1e19, &notifier, conn.watch());
        assert!(matches!(result, Err(StoreError::InvalidTimeout)));
        assert_eq!(notifier.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_resolves_immediately() {
        let notifier = MarkerNotifier::default();
        let conn = ConnectionShim::new();
        let queue: Queue = Arc::new(Mutex::new(VecDeque::from([(Bytes::from("0"), 0.0)])));

        let mut waiter = BlockingWaiter::new("q:marker", 1.0, &notifier, conn.watch()).unwrap();
        let pop = waiter.wait(popper(&queue)).await.unwrap().unwrap();
        assert_eq!(pop.key, "q:marker");
        assert_eq!(waiter.state(), WaiterState::Resolved);
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out() {
        let notifier = MarkerNotifier::default();
        let conn = ConnectionShim::new();
        let queue: Queue = Arc::default();

        let mut waiter = BlockingWaiter::new("q:marker", 0.5, &notifier, conn.watch()).unwrap();
        assert_eq!(notifier.listener_count(), 1);
        assert_eq!(waiter.state(), WaiterState::Idle);
        assert_eq!(waiter.wait(popper(&queue)).await.unwrap(), None);
        assert_eq!(waiter.state(), WaiterState::TimedOut);

        drop(waiter);
        assert_eq!(notifier.listener_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ignores_other_keys() {
        let notifier = Arc::new(MarkerNotifier::default());
        let conn = ConnectionShim::new();
        let queue: Queue = Arc::default();
        let polls = Arc::new(Mutex::new(0));

        let mut waiter = BlockingWaiter::new("a:marker", 1.0, &notifier, conn.watch()).unwrap();
        let counter = Arc::clone(&polls);
        let inner = Arc::clone(&queue);
        let task = tokio::spawn(async move {
            waiter
                .wait(move |_| {
                    *counter.lock().unwrap() += 1;
                    Ok(inner.lock().unwrap().pop_front())
                })
                .await
        });

        tokio::task::yield_now().await;
        notifier.publish("b:marker");

        assert_eq!(task.await.unwrap().unwrap(), None);
        assert_eq!(*polls.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_disconnect_cancels() {
        let notifier = MarkerNotifier::default();
        let conn = ConnectionShim::new();
        let queue: Queue = Arc::default();

        let mut waiter = BlockingWaiter::new("q:marker", 0.0, &notifier, conn.watch()).unwrap();
        {
            let wait = waiter.wait(popper(&queue));
            tokio::pin!(wait);

            tokio::select! {
                _ = &mut wait => panic!("waiter should still be blocked"),
                _ = tokio::task::yield_now() => {}
            }
            conn.disconnect();
            assert!(matches!(wait.await, Err(StoreError::ConnectionClosed)));
        }
        assert_eq!(waiter.state(), WaiterState::Cancelled);
    }
}
