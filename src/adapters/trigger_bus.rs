//! In-process trigger feed backed by a tokio broadcast channel.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Runtime;
use tokio::sync::broadcast::{self, error::RecvError};

use crate::domain::models::TriggerNotification;
use crate::domain::ports::{FeedEvent, TriggerFeed, TriggerSubscription};

/// Configuration for the TriggerBus.
#[derive(Debug, Clone)]
pub struct TriggerBusConfig {
    /// Channel capacity; slower subscribers lag beyond this.
    pub channel_capacity: usize,
}

impl Default for TriggerBusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: 1024,
        }
    }
}

/// Publish/subscribe bus for trigger notifications.
pub struct TriggerBus {
    sender: Mutex<Option<broadcast::Sender<Arc<TriggerNotification>>>>,
    published: AtomicU64,
}

impl TriggerBus {
    pub fn new(config: TriggerBusConfig) -> Self {
        let (sender, _) = broadcast::channel(config.channel_capacity.max(1));
        Self {
            sender: Mutex::new(Some(sender)),
            published: AtomicU64::new(0),
        }
    }

    /// Publish to every current subscriber. Returns how many received it;
    /// zero when nobody is listening or the bus is closed.
    pub fn publish(&self, notification: TriggerNotification) -> usize {
        let guard = self.sender.lock();
        let Some(sender) = guard.as_ref() else {
            return 0;
        };
        self.published.fetch_add(1, Ordering::Relaxed);
        // No subscribers is not an error for a broadcast bus.
        sender.send(Arc::new(notification)).unwrap_or(0)
    }

    /// Drop the sending side. Subscribers see `Closed` once drained.
    pub fn close(&self) {
        self.sender.lock().take();
    }

    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}

impl Default for TriggerBus {
    fn default() -> Self {
        Self::new(TriggerBusConfig::default())
    }
}

impl TriggerFeed for TriggerBus {
    fn subscribe(&self) -> Box<dyn TriggerSubscription> {
        let receiver = match self.sender.lock().as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                // Closed bus: hand out a receiver whose sender is already gone.
                let (sender, receiver) = broadcast::channel(1);
                drop(sender);
                receiver
            }
        };
        Box::new(BusSubscription {
            receiver,
            runtime: None,
        })
    }
}

struct BusSubscription {
    receiver: broadcast::Receiver<Arc<TriggerNotification>>,
    /// Timer driver for bounded waits, built on first use by the thread
    /// that owns this subscription.
    runtime: Option<Runtime>,
}

impl TriggerSubscription for BusSubscription {
    fn recv_timeout(&mut self, timeout: Duration) -> FeedEvent {
        match self.receiver.try_recv() {
            Ok(notification) => return FeedEvent::Notification(notification),
            Err(broadcast::error::TryRecvError::Lagged(n)) => return FeedEvent::Lagged(n),
            Err(broadcast::error::TryRecvError::Closed) => return FeedEvent::Closed,
            Err(broadcast::error::TryRecvError::Empty) => {}
        }

        if self.runtime.is_none() {
            match tokio::runtime::Builder::new_current_thread().enable_time().build() {
                Ok(runtime) => self.runtime = Some(runtime),
                Err(e) => {
                    tracing::error!(error = %e, "cannot build trigger subscription runtime");
                    return FeedEvent::Closed;
                }
            }
        }
        let Some(runtime) = self.runtime.as_ref() else {
            return FeedEvent::Closed;
        };

        let receiver = &mut self.receiver;
        match runtime.block_on(async { tokio::time::timeout(timeout, receiver.recv()).await }) {
            Ok(Ok(notification)) => FeedEvent::Notification(notification),
            Ok(Err(RecvError::Lagged(n))) => FeedEvent::Lagged(n),
            Ok(Err(RecvError::Closed)) => FeedEvent::Closed,
            Err(_) => FeedEvent::Idle,
        }
    }
}
