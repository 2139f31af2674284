//! State-change events and user-facing notifications
//!
//! Two channels leave the view-model:
//!
//! - [`EventBus`]: broadcast of state changes, the re-render signal. Any
//!   number of subscribers; events are dropped when nobody listens.
//! - [`NotificationQueue`]: messages meant to be shown to the user exactly
//!   once. Single consumer; taking a message removes it.
//!
//! # Example
//!
//! ```no_run
//! use libpicshare::service::events::{Event, EventBus};
//!
//! # async fn example() {
//! let bus = EventBus::new(100);
//! let mut receiver = bus.subscribe();
//!
//! bus.emit(Event::SignedOut);
//!
//! if let Ok(event) = receiver.recv().await {
//!     println!("Received: {:?}", event);
//! }
//! # }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{broadcast, Notify};

/// Event receiver type alias
pub type EventReceiver = broadcast::Receiver<Event>;

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a bus buffering up to `capacity` events per subscriber
    ///
    /// A lagging subscriber loses the oldest events first.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    /// Emit an event to all subscribers without blocking
    pub fn emit(&self, event: Event) {
        // Err only means nobody is subscribed
        let _ = self.sender.send(event);
    }
}

/// Which query produced the current feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedSource {
    /// Posts by followed users
    Following,
    /// All posts inside the recency window
    Recent,
}

/// State changes emitted by the view-model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    SignedIn { user_id: String },
    SignedOut,
    ProfileLoaded { user_id: String },
    MyPostsUpdated { count: usize },
    FeedUpdated { count: usize, source: FeedSource },
    SearchUpdated { term: String, count: usize },
    CommentsUpdated { post_id: String, count: usize },
    PostPublished { post_id: String },
    LikeToggled { post_id: String, liked: bool },
    FollowToggled { user_id: String, following: bool },
    AvatarPropagated { posts: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationKind {
    Info,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: NotificationKind,
    pub message: String,
}

impl Notification {
    pub fn info(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            kind: NotificationKind::Error,
            message: message.into(),
        }
    }
}

#[derive(Default)]
struct QueueInner {
    pending: Mutex<VecDeque<Notification>>,
    ready: Notify,
}

/// Single-consumer queue of one-shot notifications
#[derive(Clone, Default)]
pub struct NotificationQueue {
    inner: Arc<QueueInner>,
}

impl NotificationQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn pending(&self) -> MutexGuard<'_, VecDeque<Notification>> {
        self.inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, notification: Notification) {
        self.pending().push_back(notification);
        self.inner.ready.notify_one();
    }

    /// Take the oldest pending notification; it will not be delivered again
    pub fn pop(&self) -> Option<Notification> {
        self.pending().pop_front()
    }

    /// Take every pending notification, oldest first
    pub fn drain(&self) -> Vec<Notification> {
        self.pending().drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.pending().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Wait for the next notification
    pub async fn next(&self) -> Notification {
        loop {
            if let Some(notification) = self.pop() {
                return notification;
            }
            self.inner.ready.notified().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_event_emission_and_subscription() {
        let bus = EventBus::new(10);
        let mut receiver = bus.subscribe();

        bus.emit(Event::PostPublished {
            post_id: "p1".to_string(),
        });

        assert_eq!(
            receiver.recv().await.unwrap(),
            Event::PostPublished {
                post_id: "p1".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new(10);
        let mut first = bus.subscribe();
        let mut second = bus.subscribe();

        bus.emit(Event::SignedOut);

        assert_eq!(first.recv().await.unwrap(), Event::SignedOut);
        assert_eq!(second.recv().await.unwrap(), Event::SignedOut);
    }

    #[tokio::test]
    async fn test_emit_without_subscribers_is_dropped() {
        let bus = EventBus::new(10);
        bus.emit(Event::SignedOut);

        // Only events sent after subscribing are delivered
        let mut late = bus.subscribe();
        bus.emit(Event::SignedIn {
            user_id: "u1".to_string(),
        });
        assert_eq!(
            late.recv().await.unwrap(),
            Event::SignedIn {
                user_id: "u1".to_string()
            }
        );
    }

    #[test]
    fn test_event_serialization() {
        let event = Event::FeedUpdated {
            count: 3,
            source: FeedSource::Recent,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"feed_updated\""));
        assert!(json.contains("\"source\":\"recent\""));

        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(back, event);
    }

    #[test]
    fn test_notification_delivered_once() {
        let queue = NotificationQueue::new();
        queue.push(Notification::error("Cannot get feed: offline"));

        let clone = queue.clone();
        assert_eq!(
            clone.pop().unwrap().message,
            "Cannot get feed: offline"
        );
        assert!(queue.pop().is_none());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_drain_keeps_order() {
        let queue = NotificationQueue::new();
        queue.push(Notification::info("one"));
        queue.push(Notification::error("two"));

        let messages: Vec<_> = queue.drain().into_iter().map(|n| n.message).collect();
        assert_eq!(messages, vec!["one", "two"]);
        assert_eq!(queue.len(), 0);
    }

    #[tokio::test]
    async fn test_next_waits_for_push() {
        let queue = NotificationQueue::new();
        let producer = queue.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            producer.push(Notification::info("Logged out"));
        });

        let received = tokio::time::timeout(Duration::from_secs(2), queue.next())
            .await
            .unwrap();
        assert_eq!(received.kind, NotificationKind::Info);
        assert_eq!(received.message, "Logged out");
    }
}
