//! Trigger listener: matches feed notifications against triggered events.
//!
//! Matching runs against a snapshot of the triggered-event list so the
//! configuration mutex is never held while filters are evaluated or while
//! waiting on the action queue.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::domain::models::{ActionQueueItem, TriggerNotification};
use crate::domain::ports::{FeedEvent, TriggerSubscription};
use crate::services::action_queue::{ActionQueue, QueueError};
use crate::services::registry::EventRegistry;
use crate::services::stats::EngineCounters;

pub struct TriggerListener {
    registry: Arc<EventRegistry>,
    queue: Arc<ActionQueue>,
    counters: Arc<EngineCounters>,
    running: Arc<AtomicBool>,
    poll: Duration,
    backpressure: Duration,
}

impl TriggerListener {
    pub fn new(
        registry: Arc<EventRegistry>,
        queue: Arc<ActionQueue>,
        counters: Arc<EngineCounters>,
        running: Arc<AtomicBool>,
        poll: Duration,
        backpressure: Duration,
    ) -> Self {
        Self {
            registry,
            queue,
            counters,
            running,
            poll,
            backpressure,
        }
    }

    pub fn run(&self, mut subscription: Box<dyn TriggerSubscription>) {
        tracing::info!("trigger listener started");

        while self.running.load(Ordering::SeqCst) {
            match subscription.recv_timeout(self.poll) {
                FeedEvent::Notification(trigger) => {
                    self.fan_out(trigger);
                }
                FeedEvent::Idle => {}
                FeedEvent::Lagged(missed) => {
                    EngineCounters::add(&self.counters.lagged, missed);
                    tracing::warn!(missed, "trigger listener lagged behind the feed");
                }
                FeedEvent::Closed => {
                    tracing::info!("trigger feed closed");
                    break;
                }
            }
        }

        tracing::info!("trigger listener stopped");
    }

    /// Queue one item per triggered event accepting `trigger`. Every item
    /// shares the same notification. Returns how many were queued.
    pub fn fan_out(&self, trigger: Arc<TriggerNotification>) -> usize {
        let events = self.registry.triggered_snapshot();
        let mut queued = 0;

        for event in events.iter().filter(|e| e.accepts(&trigger)) {
            let item = ActionQueueItem::triggered(
                event.path.clone(),
                event.action.clone(),
                trigger.clone(),
                event.serialized,
                event.loggable,
            );
            match self.queue.push_timeout(item, self.backpressure) {
                Ok(()) => {
                    queued += 1;
                    EngineCounters::incr(&self.counters.trigger_matches);
                }
                Err(QueueError::Full { capacity, .. }) => {
                    EngineCounters::incr(&self.counters.dropped);
                    tracing::warn!(
                        path = %event.path,
                        source = %trigger.source,
                        capacity,
                        "action queue full, triggered event dropped"
                    );
                }
                Err(QueueError::Closed) => break,
            }
        }

        tracing::debug!(source = %trigger.source, kind = %trigger.kind, queued, "trigger processed");
        queued
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ActionContent, EventDefinition, TriggerFilter};
    use serde_json::json;

    fn listener(capacity: usize) -> (TriggerListener, Arc<EventRegistry>, Arc<ActionQueue>, Arc<EngineCounters>) {
        let registry = Arc::new(EventRegistry::new());
        let queue = Arc::new(ActionQueue::new(capacity));
        let counters = Arc::new(EngineCounters::default());
        let listener = TriggerListener::new(
            registry.clone(),
            queue.clone(),
            counters.clone(),
            Arc::new(AtomicBool::new(true)),
            Duration::from_millis(10),
            Duration::from_millis(5),
        );
        (listener, registry, queue, counters)
    }

    fn on_source(source: &str) -> EventDefinition {
        EventDefinition::Triggered {
            filter: TriggerFilter::default().source(source),
            action: ActionContent::new(source),
            serialized: false,
            loggable: false,
            paused: false,
        }
    }

    #[test]
    fn test_fan_out_shares_payload() {
        let (listener, registry, queue, _) = listener(8);
        registry.add("/A", on_source("door")).unwrap();
        registry.add("/B", on_source("door")).unwrap();
        registry.add("/C", on_source("window")).unwrap();

        let trigger = Arc::new(TriggerNotification::new("door", "opened", json!({})));
        assert_eq!(listener.fan_out(trigger.clone()), 2);
        assert_eq!(queue.len(), 2);
        assert_eq!(Arc::strong_count(&trigger), 3);

        while queue.pop_timeout(Duration::ZERO).is_some() {}
        assert_eq!(Arc::strong_count(&trigger), 1);
    }

    #[test]
    fn test_full_queue_drops_with_count() {
        let (listener, registry, queue, counters) = listener(1);
        registry.add("/A", on_source("door")).unwrap();
        registry.add("/B", on_source("door")).unwrap();

        let queued = listener.fan_out(Arc::new(TriggerNotification::new("door", "", json!(null))));
        assert_eq!(queued, 1);
        assert_eq!(queue.len(), 1);
        assert_eq!(EngineCounters::get(&counters.dropped), 1);
    }
}
