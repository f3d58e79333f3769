//! Headless, typed, topic-based publish/subscribe event bus.
//!
//! Uses [`tokio::sync::broadcast`] channels under the hood so that every
//! subscriber receives every message without any single subscriber blocking
//! the others.  A subscriber that falls behind loses the oldest events and is
//! told so via `RecvError::Lagged`; backpressure never reaches the fusion
//! node.
//!
//! # Topics
//!
//! | Topic | Typical traffic |
//! |---|---|
//! | [`Topic::InboundOdometry`] | Raw odometry and map corrections, in arrival order |
//! | [`Topic::IntegratedOdometry`] | Fused poses, one per raw sample |
//! | [`Topic::FrameTransforms`] | Fused poses as frame-transform records |
//! | [`Topic::SystemAlerts`] | Rejected samples and other faults |

use odomfuse_types::{Event, FuseError};
use tokio::sync::broadcast;

/// Default channel capacity (number of buffered events before old ones are
/// dropped for slow subscribers).
const DEFAULT_CAPACITY: usize = 256;

/// Enumeration of all routing topics on the event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    /// Raw samples and corrections share one channel so the fusion node
    /// sees them in the order they were published.
    InboundOdometry,
    IntegratedOdometry,
    FrameTransforms,
    SystemAlerts,
}

/// Shared event bus.  Clone it cheaply – all clones share the same
/// underlying broadcast channels.
#[derive(Clone, Debug)]
pub struct EventBus {
    inbound_odometry: broadcast::Sender<Event>,
    integrated_odometry: broadcast::Sender<Event>,
    frame_transforms: broadcast::Sender<Event>,
    system_alerts: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new bus.  `capacity` is applied to every topic channel
    /// independently and must be non-zero.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (inbound_odometry, _) = broadcast::channel(capacity);
        let (integrated_odometry, _) = broadcast::channel(capacity);
        let (frame_transforms, _) = broadcast::channel(capacity);
        let (system_alerts, _) = broadcast::channel(capacity);
        Self {
            inbound_odometry,
            integrated_odometry,
            frame_transforms,
            system_alerts,
        }
    }

    /// Publish `event` to the given [`Topic`] channel.
    ///
    /// Returns the number of receivers that were handed the event, or
    /// [`FuseError::Channel`] when nobody is subscribed to the topic.
    pub fn publish_to(&self, topic: Topic, event: Event) -> Result<usize, FuseError> {
        self.topic_sender(topic)
            .send(event)
            .map_err(|_| FuseError::Channel(format!("No subscribers for topic {topic:?}")))
    }

    /// Subscribe to a specific [`Topic`] channel.
    pub fn subscribe_to(&self, topic: Topic) -> TopicReceiver {
        TopicReceiver {
            topic,
            receiver: self.topic_sender(topic).subscribe(),
        }
    }

    /// Number of live subscribers on `topic`.
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.topic_sender(topic).receiver_count()
    }

    fn topic_sender(&self, topic: Topic) -> &broadcast::Sender<Event> {
        match topic {
            Topic::InboundOdometry => &self.inbound_odometry,
            Topic::IntegratedOdometry => &self.integrated_odometry,
            Topic::FrameTransforms => &self.frame_transforms,
            Topic::SystemAlerts => &self.system_alerts,
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

/// An async receiver bound to a single [`Topic`] channel.
///
/// Obtained via [`EventBus::subscribe_to`].
pub struct TopicReceiver {
    topic: Topic,
    receiver: broadcast::Receiver<Event>,
}

impl TopicReceiver {
    /// Wait for the next event on this topic.
    ///
    /// Returns:
    /// * `Ok(event)` – a successfully received event.
    /// * `Err(RecvError::Lagged(n))` – the subscriber fell behind and `n`
    ///   messages were dropped.
    /// * `Err(RecvError::Closed)` – the bus has shut down.
    pub async fn recv(&mut self) -> Result<Event, broadcast::error::RecvError> {
        self.receiver.recv().await
    }

    /// Non-blocking variant of [`recv`][Self::recv].
    pub fn try_recv(&mut self) -> Result<Event, broadcast::error::TryRecvError> {
        self.receiver.try_recv()
    }

    pub fn topic(&self) -> Topic {
        self.topic
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use odomfuse_types::EventPayload;

    fn make_event(source: &str) -> Event {
        Event::new(
            source,
            EventPayload::SampleRejected {
                origin: source.to_string(),
                reason: "test".to_string(),
            },
        )
    }

    #[test]
    fn publish_without_subscribers_returns_error() {
        let bus = EventBus::default();
        let result = bus.publish_to(Topic::InboundOdometry, make_event("test"));
        assert!(matches!(result, Err(FuseError::Channel(_))));
    }

    #[tokio::test]
    async fn multiple_subscribers_receive_same_event() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut first = bus.subscribe_to(Topic::IntegratedOdometry);
        let mut second = bus.subscribe_to(Topic::IntegratedOdometry);

        let event = make_event("fusion");
        assert_eq!(bus.publish_to(Topic::IntegratedOdometry, event.clone())?, 2);

        assert_eq!(first.recv().await?.id, event.id);
        assert_eq!(second.recv().await?.id, event.id);
        assert_eq!(first.topic(), Topic::IntegratedOdometry);
        Ok(())
    }

    #[tokio::test]
    async fn topics_are_isolated() -> Result<(), Box<dyn std::error::Error>> {
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::SystemAlerts);
        let _raw = bus.subscribe_to(Topic::InboundOdometry);

        bus.publish_to(Topic::InboundOdometry, make_event("odometry"))?;

        let result = tokio::time::timeout(std::time::Duration::from_millis(50), alerts.recv()).await;
        assert!(result.is_err(), "SystemAlerts must not see inbound odometry traffic");
        Ok(())
    }

    #[tokio::test]
    async fn slow_subscriber_reports_lag() {
        let bus = EventBus::new(16);
        let mut slow = bus.subscribe_to(Topic::InboundOdometry);
        for _ in 0..1_000 {
            let _ = bus.publish_to(Topic::InboundOdometry, make_event("flood"));
        }
        let result = slow.recv().await;
        assert!(
            matches!(result, Err(broadcast::error::RecvError::Lagged(_))),
            "expected Lagged error, got: {result:?}"
        );
    }

    #[test]
    fn zero_capacity_is_clamped() {
        let bus = EventBus::new(0);
        let _rx = bus.subscribe_to(Topic::SystemAlerts);
        assert_eq!(bus.subscriber_count(Topic::SystemAlerts), 1);
        assert!(bus.publish_to(Topic::SystemAlerts, make_event("x")).is_ok());
    }
}
