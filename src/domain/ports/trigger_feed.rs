//! Port for the publish/subscribe trigger feed.

use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::TriggerNotification;

/// Outcome of one bounded wait on a subscription.
#[derive(Debug)]
pub enum FeedEvent {
    Notification(Arc<TriggerNotification>),
    /// Nothing arrived within the wait.
    Idle,
    /// The subscriber fell behind and `n` notifications were lost.
    Lagged(u64),
    /// The feed has shut down; no more notifications will arrive.
    Closed,
}

/// A live subscription to the feed.
pub trait TriggerSubscription: Send {
    fn recv_timeout(&mut self, timeout: Duration) -> FeedEvent;
}

/// Source of trigger notifications.
pub trait TriggerFeed: Send + Sync {
    fn subscribe(&self) -> Box<dyn TriggerSubscription>;
}
