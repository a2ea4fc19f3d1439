//! Document sink: the single writer draining the bounded update queue.
//!
//! The subscription handler enqueues incoming batches; awaiting the bounded
//! send is what backpressures the bus. A failed write drops the batch - the
//! stall timeout makes the cycle re-request those documents later.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, error};

use letarette_core::DocumentUpdate;
use letarette_store::IndexStore;

/// Capacity of the in-memory update queue between the subscription and the
/// sink worker.
pub(crate) const UPDATE_QUEUE_DEPTH: usize = 10;

pub(crate) async fn run_sink(store: Arc<dyn IndexStore>, mut updates: mpsc::Receiver<DocumentUpdate>) {
  while let Some(update) = updates.recv().await {
    debug!(space = %update.space, docs = update.documents.len(), "Writing document batch");
    if let Err(e) = store.add_document_updates(&update.space, &update.documents).await {
      error!(space = %update.space, error = %e, "Failed to add document update");
    }
  }
  debug!("Document sink drained");
}
