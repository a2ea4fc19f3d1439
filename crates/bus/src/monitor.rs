//! Client for index status broadcasts.

use letarette_core::IndexStatus;

use crate::{Bus, Result, Subscription};

/// Listens to status broadcasts from a letarette cluster and hands each one
/// to a listener callback.
pub struct Monitor {
  subscription: Subscription,
}

impl Monitor {
  pub async fn start<F, Fut>(bus: &Bus, listener: F) -> Result<Self>
  where
    F: Fn(IndexStatus) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let subject = bus.subjects().status();
    let subscription = bus.subscribe(&subject, listener).await?;
    Ok(Self { subscription })
  }

  pub async fn close(mut self) {
    self.subscription.drain();
    self.subscription.join().await;
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::InProcessTransport;
  use std::sync::Arc;
  use tokio::sync::mpsc;

  #[tokio::test]
  async fn test_monitor_receives_status_broadcasts() {
    let transport = InProcessTransport::new();
    let bus = Bus::new(Arc::new(transport), "leta");

    let (tx, mut rx) = mpsc::channel::<IndexStatus>(4);
    let monitor = Monitor::start(&bus, move |status: IndexStatus| {
      let tx = tx.clone();
      async move {
        let _ = tx.send(status).await;
      }
    })
    .await
    .unwrap();

    let status = IndexStatus {
      doc_count: 42,
      spaces: vec![],
    };
    bus.publish(&bus.subjects().status(), &status).await.unwrap();

    let received = rx.recv().await.unwrap();
    assert_eq!(received.doc_count, 42);

    monitor.close().await;
  }
}
