use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 64;

/// Live-update topic. Each topic carries full snapshots of one collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Topic {
    Tables,
    Reservations,
}

impl Topic {
    pub const ALL: [Topic; 2] = [Topic::Tables, Topic::Reservations];

    pub fn name(self) -> &'static str {
        match self {
            Topic::Tables => "tables",
            Topic::Reservations => "reservations",
        }
    }

    pub fn room(self) -> &'static str {
        match self {
            Topic::Tables => "tables-room",
            Topic::Reservations => "reservations-room",
        }
    }

    /// Accepts either the topic name or its room name.
    pub fn parse(s: &str) -> Option<Topic> {
        Topic::ALL
            .into_iter()
            .find(|t| t.name() == s || t.room() == s)
    }
}

/// Broadcast hub for snapshot publication per topic. Messages are pre-encoded
/// JSON frames shared by every receiver.
pub struct NotifyHub {
    channels: DashMap<Topic, broadcast::Sender<Arc<str>>>,
}

impl Default for NotifyHub {
    fn default() -> Self {
        Self::new()
    }
}

impl NotifyHub {
    pub fn new() -> Self {
        Self {
            channels: DashMap::new(),
        }
    }

    /// Subscribe to a topic. Creates the channel if needed.
    pub fn subscribe(&self, topic: Topic) -> broadcast::Receiver<Arc<str>> {
        let sender = self
            .channels
            .entry(topic)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0);
        sender.subscribe()
    }

    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.channels
            .get(&topic)
            .map_or(0, |s| s.receiver_count())
    }

    pub fn has_subscribers(&self, topic: Topic) -> bool {
        self.subscriber_count(topic) > 0
    }

    /// Publish a frame. No-op if nobody is listening. Returns the number of
    /// receivers the frame was queued for.
    pub fn send(&self, topic: Topic, frame: Arc<str>) -> usize {
        let Some(sender) = self.channels.get(&topic) else {
            return 0;
        };
        match sender.send(frame) {
            Ok(n) => {
                metrics::counter!(crate::observability::BROADCASTS_TOTAL, "topic" => topic.name())
                    .increment(1);
                n
            }
            Err(_) => 0,
        }
    }
}
