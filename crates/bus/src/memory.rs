//! In-process transport: a broker of per-subject queues with request/reply
//! support. Backs the integration tests, the scripted providers they use,
//! and single-process deployments.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};

use crate::transport::{BusTransport, RawSubscription};
use crate::BusError;

struct SubSlot {
  id: u64,
  tx: mpsc::UnboundedSender<Vec<u8>>,
  pending: Arc<AtomicUsize>,
}

/// One incoming request handed to a responder.
pub struct RequestEnvelope {
  pub payload: Vec<u8>,
  pub reply: oneshot::Sender<Vec<u8>>,
}

#[derive(Default)]
struct Inner {
  subscribers: Mutex<HashMap<String, Vec<SubSlot>>>,
  responders: Mutex<HashMap<String, mpsc::UnboundedSender<RequestEnvelope>>>,
  next_id: AtomicU64,
}

/// Shared-memory message broker. Cloning yields handles to the same broker.
#[derive(Clone, Default)]
pub struct InProcessTransport {
  inner: Arc<Inner>,
}

impl InProcessTransport {
  pub fn new() -> Self {
    Self::default()
  }

  /// Register as the responder for a subject. Incoming requests arrive as
  /// [`RequestEnvelope`]s; dropping the receiver unregisters the responder.
  pub fn serve(&self, subject: &str) -> mpsc::UnboundedReceiver<RequestEnvelope> {
    let (tx, rx) = mpsc::unbounded_channel();
    self
      .inner
      .responders
      .lock()
      .expect("responder registry poisoned")
      .insert(subject.to_string(), tx);
    rx
  }

  fn remove_subscriber(inner: &Inner, subject: &str, id: u64) {
    let mut subscribers = inner.subscribers.lock().expect("subscriber registry poisoned");
    if let Some(slots) = subscribers.get_mut(subject) {
      slots.retain(|slot| slot.id != id);
      if slots.is_empty() {
        subscribers.remove(subject);
      }
    }
  }
}

#[async_trait]
impl BusTransport for InProcessTransport {
  async fn publish(&self, subject: &str, payload: Vec<u8>) -> Result<(), BusError> {
    let mut subscribers = self.inner.subscribers.lock().expect("subscriber registry poisoned");
    if let Some(slots) = subscribers.get_mut(subject) {
      slots.retain(|slot| {
        slot.pending.fetch_add(1, Ordering::SeqCst);
        if slot.tx.send(payload.clone()).is_ok() {
          true
        } else {
          slot.pending.fetch_sub(1, Ordering::SeqCst);
          false
        }
      });
    }
    Ok(())
  }

  async fn subscribe(&self, subject: &str) -> Result<RawSubscription, BusError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let pending = Arc::new(AtomicUsize::new(0));
    let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);

    self
      .inner
      .subscribers
      .lock()
      .expect("subscriber registry poisoned")
      .entry(subject.to_string())
      .or_default()
      .push(SubSlot {
        id,
        tx,
        pending: Arc::clone(&pending),
      });

    let inner = Arc::clone(&self.inner);
    let drain_subject = subject.to_string();
    let unsubscribe = Box::new(move || {
      InProcessTransport::remove_subscriber(&inner, &drain_subject, id);
    });

    Ok(RawSubscription::new(rx, pending, unsubscribe))
  }

  async fn request(&self, subject: &str, payload: Vec<u8>, timeout: Duration) -> Result<Vec<u8>, BusError> {
    let responder = {
      let responders = self.inner.responders.lock().expect("responder registry poisoned");
      responders.get(subject).cloned()
    };
    let responder = responder.ok_or_else(|| BusError::NoResponder(subject.to_string()))?;

    let (reply_tx, reply_rx) = oneshot::channel();
    responder
      .send(RequestEnvelope {
        payload,
        reply: reply_tx,
      })
      .map_err(|_| BusError::NoResponder(subject.to_string()))?;

    match tokio::time::timeout(timeout, reply_rx).await {
      Ok(Ok(reply)) => Ok(reply),
      Ok(Err(_)) => Err(BusError::Closed),
      Err(_) => Err(BusError::Timeout),
    }
  }
}
