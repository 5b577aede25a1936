//! Topic broker: maps each topic to its subscribers and fans published
//! payloads out to them.
//!
//! Publishing serializes the payload once, snapshots the subscriber list,
//! releases the lock, then queues one MESSAGE frame per subscriber. A slow
//! subscriber whose queue is full loses that message; nobody else waits.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use geocast_core::ConnectionId;
use metrics::counter;
use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::connection::ClientConnection;
use crate::metrics::TOPIC_PUBLISHES_TOTAL;
use crate::realtime::Publisher;
use crate::stomp::Frame;

#[derive(Clone)]
struct Subscriber {
    connection: Arc<ClientConnection>,
    subscription_id: String,
}

#[derive(Default)]
struct BrokerState {
    connections: HashMap<ConnectionId, Arc<ClientConnection>>,
    topics: HashMap<String, Vec<Subscriber>>,
}

/// Outcome of a SUBSCRIBE request.
#[derive(Debug, PartialEq, Eq)]
pub enum SubscribeResult {
    /// The subscription is now active.
    Subscribed,
    /// The connection already uses this subscription id.
    DuplicateId,
    /// The connection is not attached to the broker.
    UnknownConnection,
}

/// Topic → subscriber fan-out for attached connections.
pub struct TopicBroker {
    state: RwLock<BrokerState>,
    next_message_id: AtomicU64,
}

impl TopicBroker {
    /// Empty broker.
    pub fn new() -> Self {
        Self {
            state: RwLock::new(BrokerState::default()),
            next_message_id: AtomicU64::new(1),
        }
    }

    /// Attach a connection so it can subscribe.
    pub async fn add(&self, connection: Arc<ClientConnection>) {
        let mut state = self.state.write().await;
        let _ = state.connections.insert(connection.id.clone(), connection);
    }

    /// Detach a connection and drop all of its subscriptions.
    pub async fn remove(&self, connection_id: &ConnectionId) {
        let mut state = self.state.write().await;
        let _ = state.connections.remove(connection_id);
        state.topics.retain(|_, subscribers| {
            subscribers.retain(|s| &s.connection.id != connection_id);
            !subscribers.is_empty()
        });
    }

    /// Subscribe `connection_id` to `topic` under the client-chosen
    /// `subscription_id`.
    pub async fn subscribe(
        &self,
        connection_id: &ConnectionId,
        subscription_id: &str,
        topic: &str,
    ) -> SubscribeResult {
        let mut state = self.state.write().await;
        let Some(connection) = state.connections.get(connection_id).cloned() else {
            return SubscribeResult::UnknownConnection;
        };
        let in_use = state.topics.values().flatten().any(|s| {
            &s.connection.id == connection_id && s.subscription_id == subscription_id
        });
        if in_use {
            return SubscribeResult::DuplicateId;
        }
        state
            .topics
            .entry(topic.to_string())
            .or_default()
            .push(Subscriber {
                connection,
                subscription_id: subscription_id.to_string(),
            });
        debug!(conn_id = %connection_id, subscription_id, topic, "subscribed");
        SubscribeResult::Subscribed
    }

    /// Cancel a subscription. Returns `false` if it did not exist.
    pub async fn unsubscribe(&self, connection_id: &ConnectionId, subscription_id: &str) -> bool {
        let mut state = self.state.write().await;
        let mut removed = false;
        state.topics.retain(|_, subscribers| {
            let before = subscribers.len();
            subscribers.retain(|s| {
                !(&s.connection.id == connection_id && s.subscription_id == subscription_id)
            });
            removed |= subscribers.len() != before;
            !subscribers.is_empty()
        });
        removed
    }

    /// Number of attached connections.
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }

    /// Number of subscriptions on `topic`.
    pub async fn subscriber_count(&self, topic: &str) -> usize {
        self.state
            .read()
            .await
            .topics
            .get(topic)
            .map_or(0, Vec::len)
    }

    /// Queue `payload` for every subscriber of `topic`. Returns how many
    /// subscribers it was queued for.
    pub async fn publish_json(&self, topic: &str, payload: &Value) -> usize {
        let body = match serde_json::to_string(payload) {
            Ok(body) => body,
            Err(e) => {
                warn!(topic, error = %e, "failed to serialize payload");
                return 0;
            }
        };
        let subscribers = {
            let state = self.state.read().await;
            state.topics.get(topic).cloned().unwrap_or_default()
        };
        counter!(TOPIC_PUBLISHES_TOTAL, "topic" => topic.to_string()).increment(1);

        let message_id = self.next_message_id.fetch_add(1, Ordering::Relaxed).to_string();
        let mut delivered = 0;
        for subscriber in &subscribers {
            let frame = Frame::message(
                &subscriber.subscription_id,
                &message_id,
                topic,
                body.clone(),
            );
            if subscriber.connection.send_frame(&frame) {
                delivered += 1;
            } else {
                warn!(conn_id = %subscriber.connection.id, topic, "subscriber queue full or closed, message dropped");
            }
        }
        debug!(topic, recipients = subscribers.len(), delivered, "published");
        delivered
    }
}

impl Default for TopicBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Publisher for TopicBroker {
    async fn publish(&self, topic: &str, payload: &Value) -> usize {
        self.publish_json(topic, payload).await
    }
}
