//! Publish/subscribe substrate under the coordination channel.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::warn;

use crate::error::ChannelError;

/// Broadcast over one named topic. Delivery is at-most-once and unordered
/// across senders; authentication happens above this layer.
#[async_trait]
pub trait Transport: Send + Sync {
    fn topic(&self) -> &str;

    async fn publish(&self, data: Vec<u8>) -> Result<(), ChannelError>;

    /// Next message on the topic, `None` once the transport is closed.
    async fn recv(&self) -> Option<Vec<u8>>;
}

/// In-process topic hub. Every transport joined to the same topic sees every
/// message, including its own.
#[derive(Debug, Clone)]
pub struct LocalHub {
    topics: Arc<Mutex<HashMap<String, broadcast::Sender<Arc<Vec<u8>>>>>>,
    capacity: usize,
}

impl LocalHub {
    pub fn new(capacity: usize) -> Self {
        LocalHub {
            topics: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    pub fn join(&self, topic: &str) -> LocalTransport {
        let sender = self
            .topics
            .lock()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone();
        let receiver = sender.subscribe();
        LocalTransport {
            topic: topic.to_string(),
            sender,
            receiver: tokio::sync::Mutex::new(receiver),
        }
    }
}

impl Default for LocalHub {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[derive(Debug)]
pub struct LocalTransport {
    topic: String,
    sender: broadcast::Sender<Arc<Vec<u8>>>,
    receiver: tokio::sync::Mutex<broadcast::Receiver<Arc<Vec<u8>>>>,
}

#[async_trait]
impl Transport for LocalTransport {
    fn topic(&self) -> &str {
        &self.topic
    }

    async fn publish(&self, data: Vec<u8>) -> Result<(), ChannelError> {
        // The publisher's own receiver keeps the topic open.
        self.sender
            .send(Arc::new(data))
            .map(|_| ())
            .map_err(|e| ChannelError::Transport(e.to_string()))
    }

    async fn recv(&self) -> Option<Vec<u8>> {
        let mut receiver = self.receiver.lock().await;
        loop {
            match receiver.recv().await {
                Ok(data) => return Some(data.as_ref().clone()),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(topic = %self.topic, skipped, "subscriber lagged, messages dropped");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_all_members_receive() {
        let hub = LocalHub::new(16);
        let a = hub.join("t");
        let b = hub.join("t");
        let other = hub.join("other");

        a.publish(b"hello".to_vec()).await.unwrap();
        assert_eq!(a.recv().await.unwrap(), b"hello");
        assert_eq!(b.recv().await.unwrap(), b"hello");

        other.publish(b"x".to_vec()).await.unwrap();
        assert_eq!(other.recv().await.unwrap(), b"x");
    }

    #[tokio::test]
    async fn test_lagging_subscriber_skips_ahead() {
        let hub = LocalHub::new(2);
        let a = hub.join("t");
        let b = hub.join("t");
        for i in 0u8..5 {
            a.publish(vec![i]).await.unwrap();
        }
        assert_eq!(b.recv().await.unwrap(), vec![3]);
        assert_eq!(b.recv().await.unwrap(), vec![4]);
    }
}
