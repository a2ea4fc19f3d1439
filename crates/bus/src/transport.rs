//! Transport seam between the typed bus layer and a concrete message bus.
//!
//! The cluster deployment provides its own transport (NATS or similar);
//! [`crate::InProcessTransport`] covers tests and single-process setups.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::BusError;

/// Raw byte-level bus operations.
#[async_trait]
pub trait BusTransport: Send + Sync {
  /// Fire-and-forget publish.
  async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError>;

  /// Subscribe to a subject. Delivery order per subject is preserved.
  async fn subscribe(&self, subject: &str) -> Result<RawSubscription, BusError>;

  /// Synchronous request/reply, failing with [`BusError::Timeout`] when the
  /// deadline elapses.
  async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>, BusError>;
}

/// Receiving half of a subscription plus its drain control.
pub struct RawSubscription {
  rx: mpsc::UnboundedReceiver<Vec<u8>>,
  pending: Arc<AtomicUsize>,
  unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl RawSubscription {
  pub fn new(
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
    pending: Arc<AtomicUsize>,
    unsubscribe: Box<dyn FnOnce() + Send>,
  ) -> Self {
    Self {
      rx,
      pending,
      unsubscribe: Some(unsubscribe),
    }
  }

  /// Next payload, or `None` once the subscription is drained and empty.
  pub async fn recv(&mut self) -> Option<Vec<u8>> {
    let payload = self.rx.recv().await;
    if payload.is_some() {
      self.pending.fetch_sub(1, Ordering::SeqCst);
    }
    payload
  }

  /// Messages delivered by the transport but not yet received.
  pub fn pending(&self) -> usize {
    self.pending.load(Ordering::SeqCst)
  }

  /// Stop new deliveries. Already-queued messages keep flowing until the
  /// queue is empty, after which [`recv`](Self::recv) returns `None`.
  pub fn drain(&mut self) {
    if let Some(unsubscribe) = self.unsubscribe.take() {
      unsubscribe();
    }
  }

  /// Split into the receiver loop half and the control half so a consumer
  /// task can own the receiver while the owner keeps drain control.
  pub fn split(self) -> (RawReceiver, SubscriptionControl) {
    let pending = Arc::clone(&self.pending);
    (
      RawReceiver {
        rx: self.rx,
        pending: self.pending,
      },
      SubscriptionControl {
        pending,
        unsubscribe: self.unsubscribe,
      },
    )
  }
}

/// Receive-only half of a split [`RawSubscription`].
pub struct RawReceiver {
  rx: mpsc::UnboundedReceiver<Vec<u8>>,
  pending: Arc<AtomicUsize>,
}

impl RawReceiver {
  pub async fn recv(&mut self) -> Option<Vec<u8>> {
    let payload = self.rx.recv().await;
    if payload.is_some() {
      self.pending.fetch_sub(1, Ordering::SeqCst);
    }
    payload
  }
}

/// Drain/pending control half of a split [`RawSubscription`].
pub struct SubscriptionControl {
  pending: Arc<AtomicUsize>,
  unsubscribe: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionControl {
  pub fn pending(&self) -> usize {
    self.pending.load(Ordering::SeqCst)
  }

  pub fn drain(&mut self) {
    if let Some(unsubscribe) = self.unsubscribe.take() {
      unsubscribe();
    }
  }
}
