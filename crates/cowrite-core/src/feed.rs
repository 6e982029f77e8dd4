//! In-process publish/subscribe channel for content updates.
//!
//! One tokio broadcast channel per change channel name. Every subscriber gets
//! an independent receiver; a receiver that falls more than `capacity`
//! messages behind skips ahead to the newest ones.
//!
//! Changes observed by polling a shared database go through
//! [`ChangeFeed::publish_if_newer`], which drops anything not newer than what
//! the channel already carried.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::broadcast::{self, error::RecvError};

use crate::models::ContentChange;

const DEFAULT_CAPACITY: usize = 64;

struct Channel {
    sender: broadcast::Sender<ContentChange>,
    /// `updated_at` and content of the newest change sent on this channel
    newest: Option<(i64, String)>,
}

impl Channel {
    fn is_stale(&self, change: &ContentChange) -> bool {
        self.newest.as_ref().is_some_and(|(updated_at, content)| {
            change.updated_at < *updated_at
                || (change.updated_at == *updated_at && change.content == *content)
        })
    }

    fn send(&mut self, change: ContentChange) -> usize {
        if self
            .newest
            .as_ref()
            .is_none_or(|(updated_at, _)| change.updated_at >= *updated_at)
        {
            self.newest = Some((change.updated_at, change.content.clone()));
        }
        self.sender.send(change).unwrap_or(0)
    }
}

/// Fan-out of content changes keyed by channel name
#[derive(Clone)]
pub struct ChangeFeed {
    channels: Arc<Mutex<HashMap<String, Channel>>>,
    capacity: usize,
}

impl ChangeFeed {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            channels: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Subscribe to every change published on `channel` from now on
    pub fn subscribe(&self, channel: &str) -> ContentSubscription {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let receiver = channels
            .entry(channel.to_string())
            .or_insert_with(|| Channel {
                sender: broadcast::channel(self.capacity).0,
                newest: None,
            })
            .sender
            .subscribe();
        ContentSubscription {
            channel: channel.to_string(),
            receiver,
        }
    }

    /// Publish a change; returns how many subscribers received it
    pub fn publish(&self, channel: &str, change: ContentChange) -> usize {
        self.deliver(channel, change, false)
    }

    /// Publish unless the channel already carried this change or a newer one
    pub fn publish_if_newer(&self, channel: &str, change: ContentChange) -> usize {
        self.deliver(channel, change, true)
    }

    fn deliver(&self, channel: &str, change: ContentChange, skip_stale: bool) -> usize {
        let mut channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(entry) = channels.get_mut(channel) else {
            return 0;
        };
        if entry.sender.receiver_count() == 0 {
            channels.remove(channel);
            return 0;
        }
        if skip_stale && entry.is_stale(&change) {
            return 0;
        }
        entry.send(change)
    }

    /// Number of live subscribers on `channel`
    pub fn subscriber_count(&self, channel: &str) -> usize {
        let channels = self.channels.lock().unwrap_or_else(PoisonError::into_inner);
        channels
            .get(channel)
            .map_or(0, |entry| entry.sender.receiver_count())
    }
}

impl Default for ChangeFeed {
    fn default() -> Self {
        Self::new()
    }
}

/// Receiving end of a content channel. Dropping it unsubscribes.
pub struct ContentSubscription {
    channel: String,
    receiver: broadcast::Receiver<ContentChange>,
}

impl ContentSubscription {
    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// Next change, or `None` once the feed is gone
    pub async fn recv(&mut self) -> Option<ContentChange> {
        loop {
            match self.receiver.recv().await {
                Ok(change) => return Some(change),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(
                        channel = %self.channel,
                        skipped,
                        "Content subscriber lagged; skipping to newest changes"
                    );
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DocumentId, FileId, UserId};

    fn change(content: &str) -> ContentChange {
        change_at(content, 1)
    }

    fn change_at(content: &str, updated_at: i64) -> ContentChange {
        ContentChange {
            document_id: DocumentId::new(),
            file_id: FileId::from("f1"),
            content: content.to_string(),
            last_edited_by: Some(UserId::from("alice")),
            updated_at,
        }
    }

    #[tokio::test]
    async fn subscribers_receive_published_changes() {
        let feed = ChangeFeed::new();
        let mut first = feed.subscribe("drive:f1");
        let mut second = feed.subscribe("drive:f1");

        assert_eq!(feed.publish("drive:f1", change("hello")), 2);
        assert_eq!(first.recv().await.unwrap().content, "hello");
        assert_eq!(second.recv().await.unwrap().content, "hello");
    }

    #[tokio::test]
    async fn channels_are_isolated() {
        let feed = ChangeFeed::new();
        let _other = feed.subscribe("drive:f2");
        assert_eq!(feed.publish("drive:f1", change("nobody listens")), 0);
    }

    #[test]
    fn dropped_subscriptions_are_pruned() {
        let feed = ChangeFeed::new();
        let subscription = feed.subscribe("drive:f1");
        assert_eq!(feed.subscriber_count("drive:f1"), 1);
        drop(subscription);
        assert_eq!(feed.publish("drive:f1", change("late")), 0);
        assert_eq!(feed.subscriber_count("drive:f1"), 0);
    }

    #[tokio::test]
    async fn lagging_subscriber_skips_ahead() {
        let feed = ChangeFeed::with_capacity(2);
        let mut subscription = feed.subscribe("drive:f1");
        for n in 0..5 {
            feed.publish("drive:f1", change(&format!("v{n}")));
        }
        assert_eq!(subscription.recv().await.unwrap().content, "v3");
        assert_eq!(subscription.recv().await.unwrap().content, "v4");
    }

    #[tokio::test]
    async fn polled_changes_skip_what_was_already_published() {
        let feed = ChangeFeed::new();
        let mut subscription = feed.subscribe("drive:f1");

        assert_eq!(feed.publish("drive:f1", change_at("saved here", 10)), 1);
        assert_eq!(feed.publish_if_newer("drive:f1", change_at("saved here", 10)), 0);
        assert_eq!(feed.publish_if_newer("drive:f1", change_at("older", 5)), 0);
        assert_eq!(feed.publish_if_newer("drive:f1", change_at("same tick", 10)), 1);
        assert_eq!(feed.publish_if_newer("drive:f1", change_at("elsewhere", 20)), 1);

        let received: Vec<String> = [
            subscription.recv().await.unwrap(),
            subscription.recv().await.unwrap(),
            subscription.recv().await.unwrap(),
        ]
        .into_iter()
        .map(|change| change.content)
        .collect();
        assert_eq!(received, vec!["saved here", "same tick", "elsewhere"]);
    }
}
