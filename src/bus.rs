use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};

/// A single inbound or outbound bus message: a partition key and a raw
/// payload. The core never inspects the key; it only sets one on publish.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub key: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus transport error: {0}")]
    Transport(String),
}

/// The consumption side of the event bus boundary. A real implementation
/// wraps a Kafka/NATS client; this crate only depends on this trait plus
/// the in-memory test double below.
#[async_trait]
pub trait EventConsumer: Send {
    /// Polls for the next message, bounded by `timeout`. Returns `None` on
    /// a timeout with no message available (not an error).
    async fn poll(&mut self, timeout: Duration) -> Result<Option<BusMessage>, BusError>;

    /// Commits progress for the most recently returned message.
    async fn commit(&mut self) -> Result<(), BusError>;

    /// Releases any held resources. Called once during shutdown.
    async fn close(&mut self) -> Result<(), BusError> {
        Ok(())
    }
}

/// The publication side of the event bus boundary.
#[async_trait]
pub trait EventProducer: Send {
    async fn produce(&mut self, topic: &str, message: BusMessage) -> Result<(), BusError>;

    /// Drains any buffered sends, bounded by the caller's own timeout
    /// policy. The in-memory implementation has nothing to flush.
    async fn flush(&mut self) -> Result<(), BusError> {
        Ok(())
    }
}

/// An in-memory bus used by tests and local/dev runs. Not a substitute for
/// a real broker client in production — it exists so the full ingest →
/// detect → publish path can be exercised without an external dependency.
pub struct InMemoryBus {
    ingest_tx: mpsc::UnboundedSender<BusMessage>,
    ingest_rx: Arc<Mutex<mpsc::UnboundedReceiver<BusMessage>>>,
    published: Arc<Mutex<Vec<(String, BusMessage)>>>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            ingest_tx: tx,
            ingest_rx: Arc::new(Mutex::new(rx)),
            published: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Enqueues a message as if it had arrived on the ingest topic.
    pub fn send(&self, message: BusMessage) {
        let _ = self.ingest_tx.send(message);
    }

    pub fn consumer(&self) -> InMemoryConsumer {
        InMemoryConsumer {
            rx: self.ingest_rx.clone(),
        }
    }

    pub fn producer(&self) -> InMemoryProducer {
        InMemoryProducer {
            published: self.published.clone(),
        }
    }

    /// Returns everything published so far, in emission order.
    pub async fn published(&self) -> Vec<(String, BusMessage)> {
        self.published.lock().await.clone()
    }
}

impl Default for InMemoryBus {
    fn default() -> Self {
        Self::new()
    }
}

pub struct InMemoryConsumer {
    rx: Arc<Mutex<mpsc::UnboundedReceiver<BusMessage>>>,
}

#[async_trait]
impl EventConsumer for InMemoryConsumer {
    async fn poll(&mut self, timeout: Duration) -> Result<Option<BusMessage>, BusError> {
        let mut rx = self.rx.lock().await;
        match tokio::time::timeout(timeout, rx.recv()).await {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => Ok(None),
            Err(_) => Ok(None), // poll timeout, not an error
        }
    }

    async fn commit(&mut self) -> Result<(), BusError> {
        Ok(())
    }
}

pub struct InMemoryProducer {
    published: Arc<Mutex<Vec<(String, BusMessage)>>>,
}

#[async_trait]
impl EventProducer for InMemoryProducer {
    async fn produce(&mut self, topic: &str, message: BusMessage) -> Result<(), BusError> {
        self.published
            .lock()
            .await
            .push((topic.to_string(), message));
        Ok(())
    }
}

/// A producer that always fails, for exercising the "publish rejected by
/// the bus" path (`AlertPublisher` leaving cooldown state untouched).
#[cfg(test)]
pub(crate) struct FailingProducer;

#[cfg(test)]
#[async_trait]
impl EventProducer for FailingProducer {
    async fn produce(&mut self, _topic: &str, _message: BusMessage) -> Result<(), BusError> {
        Err(BusError::Transport("broker unreachable".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn poll_times_out_with_no_message() {
        let bus = InMemoryBus::new();
        let mut consumer = bus.consumer();
        let result = consumer.poll(Duration::from_millis(10)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn poll_returns_sent_message() {
        let bus = InMemoryBus::new();
        bus.send(BusMessage {
            key: "api".to_string(),
            payload: b"{}".to_vec(),
        });
        let mut consumer = bus.consumer();
        let result = consumer
            .poll(Duration::from_millis(100))
            .await
            .unwrap()
            .expect("message should be present");
        assert_eq!(result.key, "api");
    }

    #[tokio::test]
    async fn produce_records_published_messages_with_topic() {
        let bus = InMemoryBus::new();
        let mut producer = bus.producer();
        producer
            .produce(
                "alerts.fired",
                BusMessage {
                    key: "HighLatencyP99:api".to_string(),
                    payload: b"{}".to_vec(),
                },
            )
            .await
            .unwrap();
        let published = bus.published().await;
        assert_eq!(published.len(), 1);
        assert_eq!(published[0].0, "alerts.fired");
    }
}
