//! Outbound side of the dispatcher.

use async_trait::async_trait;
use serde_json::Value;

/// Delivers a payload to every current subscriber of a topic.
///
/// The dispatcher decides what to publish and when; implementations decide
/// who receives it.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Publish `payload` on `topic`. Returns the number of subscribers the
    /// payload was queued for.
    async fn publish(&self, topic: &str, payload: &Value) -> usize;
}
