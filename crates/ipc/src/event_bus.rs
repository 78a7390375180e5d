//! In-process publish/subscribe backing the IPC server's event streaming.
//!
//! One `broadcast` channel per engagement channel name, created lazily on
//! first publish or subscribe. A subscriber that falls behind sees
//! `RecvError::Lagged` rather than blocking the publisher — streaming is
//! best-effort, not a durable log.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use cyberred_collab::EventBus;
use serde_json::Value;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 256;

pub struct ChannelEventBus {
    channels: Mutex<HashMap<String, broadcast::Sender<Value>>>,
}

impl Default for ChannelEventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelEventBus {
    #[must_use]
    pub fn new() -> Self {
        Self { channels: Mutex::new(HashMap::new()) }
    }

    fn sender_for(&self, channel: &str) -> broadcast::Sender<Value> {
        let mut channels = self.channels.lock().unwrap_or_else(|e| e.into_inner());
        channels.entry(channel.to_string()).or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0).clone()
    }

    #[must_use]
    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<Value> {
        self.sender_for(channel).subscribe()
    }
}

#[async_trait]
impl EventBus for ChannelEventBus {
    async fn publish(&self, channel: &str, event: Value) {
        // No receivers is the common case (no subscribers yet); that's not
        // an error, just a no-op delivery.
        let _ = self.sender_for(channel).send(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = ChannelEventBus::new();
        let mut rx = bus.subscribe("engagement:e1:events");
        bus.publish("engagement:e1:events", serde_json::json!({"kind": "finding"})).await;

        let received = rx.recv().await.expect("event delivered");
        assert_eq!(received["kind"], "finding");
    }

    #[tokio::test]
    async fn publish_without_subscribers_does_not_error() {
        let bus = ChannelEventBus::new();
        bus.publish("engagement:e1:events", serde_json::json!({"kind": "finding"})).await;
    }
}
