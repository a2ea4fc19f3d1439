//! Typed message bus adapter: JSON publish / subscribe / request-with-deadline
//! on top of a pluggable [`BusTransport`].
//!
//! All cluster subjects derive from a single topic prefix, see [`Subjects`].

mod memory;
mod monitor;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::warn;

pub use memory::{InProcessTransport, RequestEnvelope};
pub use monitor::Monitor;
pub use transport::{BusTransport, RawReceiver, RawSubscription, SubscriptionControl};

#[derive(Error, Debug)]
pub enum BusError {
  #[error("Request timed out")]
  Timeout,
  #[error("No responder on subject: {0}")]
  NoResponder(String),
  #[error("Bus connection closed")]
  Closed,
  #[error("Codec error: {0}")]
  Codec(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BusError>;

/// The cluster subjects, derived from the configured topic prefix.
#[derive(Debug, Clone)]
pub struct Subjects {
  topic: String,
}

impl Subjects {
  pub fn new(topic: impl Into<String>) -> Self {
    Self { topic: topic.into() }
  }

  /// Document batches published by providers, subscribed by the indexer.
  pub fn document_update(&self) -> String {
    format!("{}.document.update", self.topic)
  }

  /// Fire-and-forget document requests published by the indexer.
  pub fn document_request(&self) -> String {
    format!("{}.document.request", self.topic)
  }

  /// Synchronous chunk requests from the indexer to providers.
  pub fn index_request(&self) -> String {
    format!("{}.index.request", self.topic)
  }

  /// Status broadcasts consumed by external monitors.
  pub fn status(&self) -> String {
    format!("{}.status", self.topic)
  }
}

/// Handle on a running typed subscription.
///
/// Shutdown protocol: [`drain`](Self::drain) to stop new deliveries, poll
/// [`pending`](Self::pending) to zero, then [`join`](Self::join) to wait for
/// the handler loop to finish the queued messages.
pub struct Subscription {
  control: SubscriptionControl,
  task: JoinHandle<()>,
}

impl Subscription {
  pub fn drain(&mut self) {
    self.control.drain();
  }

  pub fn pending(&self) -> usize {
    self.control.pending()
  }

  pub async fn join(self) {
    let _ = self.task.await;
  }
}

/// Typed JSON bus.
#[derive(Clone)]
pub struct Bus {
  transport: Arc<dyn BusTransport>,
  subjects: Subjects,
}

impl Bus {
  pub fn new(transport: Arc<dyn BusTransport>, topic: impl Into<String>) -> Self {
    Self {
      transport,
      subjects: Subjects::new(topic),
    }
  }

  pub fn subjects(&self) -> &Subjects {
    &self.subjects
  }

  /// Fire-and-forget JSON publish.
  pub async fn publish<T: Serialize>(&self, subject: &str, value: &T) -> Result<()> {
    let payload = serde_json::to_vec(value)?;
    self.transport.publish(subject, payload).await
  }

  /// Subscribe with a handler invoked per decoded message. Messages that
  /// fail to decode are logged and dropped.
  pub async fn subscribe<T, F, Fut>(&self, subject: &str, handler: F) -> Result<Subscription>
  where
    T: DeserializeOwned + Send + 'static,
    F: Fn(T) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let raw = self.transport.subscribe(subject).await?;
    let (mut receiver, control) = raw.split();
    let subject = subject.to_string();

    let task = tokio::spawn(async move {
      while let Some(payload) = receiver.recv().await {
        match serde_json::from_slice::<T>(&payload) {
          Ok(message) => handler(message).await,
          Err(e) => warn!(subject = %subject, error = %e, "Dropping undecodable message"),
        }
      }
    });

    Ok(Subscription { control, task })
  }

  /// Synchronous JSON request/reply with a deadline.
  pub async fn request<Req, Rep>(&self, subject: &str, request: &Req, timeout: Duration) -> Result<Rep>
  where
    Req: Serialize,
    Rep: DeserializeOwned,
  {
    let payload = serde_json::to_vec(request)?;
    let reply = self.transport.request(subject, payload, timeout).await?;
    Ok(serde_json::from_slice(&reply)?)
  }
}
