//! Per-space update cycle.
//!
//! One invocation per space per tick: request pending documents up to the
//! outstanding cap, commit and pull the next chunk when the current one is
//! fully served, or reset stalled requests. There is no per-request
//! correlation - the interest table is the correlation mechanism.

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, warn};

use letarette_bus::Bus;
use letarette_core::config::IndexConfig;
use letarette_core::{DocumentId, DocumentRequest, IndexUpdate, IndexUpdateRequest};
use letarette_store::{IndexStore, InterestState};

use crate::Result;

pub(crate) struct UpdateCycle {
  space: String,
  store: Arc<dyn IndexStore>,
  bus: Bus,
  config: IndexConfig,
  /// When this space last asked providers for documents. Kept per space so
  /// one busy space cannot mask another space's stall.
  last_document_request: Option<Instant>,
}

impl UpdateCycle {
  pub(crate) fn new(space: String, store: Arc<dyn IndexStore>, bus: Bus, config: IndexConfig) -> Self {
    Self {
      space,
      store,
      bus,
      config,
      last_document_request: None,
    }
  }

  /// Run one tick for this space. Returns the number of active interests;
  /// errors are logged and retried on the next tick.
  pub(crate) async fn run(&mut self) -> usize {
    let interests = match self.store.get_interest_list(&self.space).await {
      Ok(interests) => interests,
      Err(e) => {
        error!(space = %self.space, error = %e, "Failed to fetch current interest list");
        return 0;
      }
    };

    let total = interests.len();
    let mut num_pending = 0;
    let mut num_requested = 0;
    let mut pending_ids: Vec<DocumentId> = Vec::new();

    for interest in interests {
      match interest.state {
        InterestState::Pending => {
          num_pending += 1;
          pending_ids.push(interest.doc_id);
        }
        InterestState::Requested => num_requested += 1,
        InterestState::Served => {}
      }
    }

    let max_outstanding = self.config.max_outstanding as usize;
    let to_request = num_pending.min(max_outstanding.saturating_sub(num_requested));
    if to_request > 0 {
      info!(space = %self.space, docs = to_request, "Requesting documents");
      match self.request_documents(&pending_ids[..to_request]).await {
        Ok(()) => {
          self.last_document_request = Some(Instant::now());
          num_requested += to_request;
          num_pending -= to_request;
        }
        Err(e) => error!(space = %self.space, error = %e, "Failed to request documents"),
      }
    }

    if num_pending == 0 && num_requested == 0 {
      if let Err(e) = self.store.commit_interest_list(&self.space).await {
        error!(space = %self.space, error = %e, "Failed to commit documents");
        return total;
      }
      if let Err(e) = self.request_next_chunk().await {
        error!(space = %self.space, error = %e, "Failed to request next chunk");
      }
    } else if let Some(timeout) = self.config.max_document_wait() {
      // A missing request timestamp means the last publish failed - treat
      // that as stalled so the chunk is re-requested right away.
      let stalled = self.last_document_request.is_none_or(|at| at.elapsed() > timeout);
      if stalled {
        warn!(space = %self.space, "Timeout waiting for documents, re-requesting");
        if let Err(e) = self.store.reset_requested(&self.space).await {
          error!(space = %self.space, error = %e, "Failed to reset interest list state");
        }
      }
    }

    total
  }

  /// Flip each row to `requested` before publishing, so a failed publish
  /// can never lead to double-requesting - the stall timeout recovers it.
  async fn request_documents(&self, wanted: &[DocumentId]) -> Result<()> {
    for doc_id in wanted {
      self
        .store
        .set_interest_state(&self.space, doc_id, InterestState::Requested)
        .await?;
    }

    let request = DocumentRequest {
      space: self.space.clone(),
      wanted: wanted.to_vec(),
    };
    self
      .bus
      .publish(&self.bus.subjects().document_request(), &request)
      .await?;
    Ok(())
  }

  async fn request_next_chunk(&self) -> Result<()> {
    let state = self.store.get_interest_list_state(&self.space).await?;
    let request = IndexUpdateRequest {
      space: self.space.clone(),
      from_time: state.last_updated_time(),
      after_document: state.last_updated_doc_id.clone(),
      limit: self.config.chunk_size,
    };

    let update: IndexUpdate = self
      .bus
      .request(
        &self.bus.subjects().index_request(),
        &request,
        self.config.max_interest_wait(),
      )
      .await?;

    if !update.updates.is_empty() {
      info!(space = %update.space, docs = update.updates.len(), "Received interest list");
    }
    self.store.set_interest_list(&update.space, &update.updates).await?;
    Ok(())
  }
}
