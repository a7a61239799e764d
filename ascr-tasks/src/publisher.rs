//! Progress publishing
//!
//! The tracker hands every transition to a [`ProgressPublisher`] and moves on.
//! Publishing never blocks and never waits for delivery; whatever a
//! publisher reports back is only logged by the caller.

use ascr_common::events::{AscrEvent, EventBus};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

const RELAY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("publish queue full, event dropped")]
    QueueFull,

    #[error("publisher closed")]
    Closed,
}

/// Fire-and-forget sink for task events
pub trait ProgressPublisher: Send + Sync {
    fn publish(&self, event: AscrEvent) -> Result<(), PublishError>;
}

/// In-process broadcast; having no subscribers is not an error
impl ProgressPublisher for EventBus {
    fn publish(&self, event: AscrEvent) -> Result<(), PublishError> {
        if let Err(e) = self.emit(event) {
            debug!(task_id = %e.0.task_id(), "No subscribers for {}", e.0.event_type());
        }
        Ok(())
    }
}

enum Relay {
    Event(AscrEvent),
    Close,
}

/// Forwards events as JSON POSTs to a remote endpoint
///
/// Events are queued on a bounded channel and sent by a background task, so
/// a slow or unreachable endpoint costs the publisher nothing but dropped
/// events once the queue is full.
#[derive(Clone)]
pub struct RelayPublisher {
    tx: mpsc::Sender<Relay>,
    forwarder: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl RelayPublisher {
    /// Start the forwarding task; must be called within a tokio runtime
    pub fn spawn(url: impl Into<String>, capacity: usize) -> Self {
        Self::spawn_with_client(reqwest::Client::new(), url, capacity)
    }

    pub fn spawn_with_client(client: reqwest::Client, url: impl Into<String>, capacity: usize) -> Self {
        let (tx, mut rx) = mpsc::channel::<Relay>(capacity.max(1));
        let url = url.into();

        let forwarder = tokio::spawn(async move {
            while let Some(Relay::Event(event)) = rx.recv().await {
                let response = client
                    .post(&url)
                    .timeout(RELAY_TIMEOUT)
                    .json(&event)
                    .send()
                    .await;
                match response {
                    Ok(response) if response.status().is_success() => {
                        debug!(task_id = %event.task_id(), "Relayed {}", event.event_type());
                    }
                    Ok(response) => {
                        warn!(task_id = %event.task_id(), status = %response.status(), "Relay rejected {}", event.event_type());
                    }
                    Err(e) => {
                        warn!(task_id = %event.task_id(), "Failed to relay {}: {}", event.event_type(), e);
                    }
                }
            }
            debug!("Relay publisher stopped");
        });

        Self {
            tx,
            forwarder: Arc::new(Mutex::new(Some(forwarder))),
        }
    }

    /// Send everything queued so far, then stop the forwarding task
    ///
    /// Events published afterwards are rejected with [`PublishError::Closed`].
    /// Closing again is a no-op.
    pub async fn close(&self) {
        let Some(forwarder) = self.forwarder.lock().await.take() else {
            return;
        };
        if self.tx.send(Relay::Close).await.is_err() {
            debug!("Relay forwarder already gone");
        }
        if let Err(e) = forwarder.await {
            warn!("Relay forwarder ended abnormally: {}", e);
        }
    }
}

impl ProgressPublisher for RelayPublisher {
    fn publish(&self, event: AscrEvent) -> Result<(), PublishError> {
        self.tx.try_send(Relay::Event(event)).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => PublishError::QueueFull,
            mpsc::error::TrySendError::Closed(_) => PublishError::Closed,
        })
    }
}

/// Publishes every event to each member in turn
#[derive(Clone, Default)]
pub struct PublisherSet {
    members: Vec<Arc<dyn ProgressPublisher>>,
}

impl PublisherSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, publisher: Arc<dyn ProgressPublisher>) -> Self {
        self.members.push(publisher);
        self
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }
}

impl ProgressPublisher for PublisherSet {
    /// Every member sees the event; the first failure is reported
    fn publish(&self, event: AscrEvent) -> Result<(), PublishError> {
        let mut first_error = None;
        for member in &self.members {
            if let Err(e) = member.publish(event.clone()) {
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}
