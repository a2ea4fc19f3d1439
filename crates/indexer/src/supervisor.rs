//! Indexer supervisor: owns the cycle loop, the document subscription and
//! the sink worker, and coordinates graceful shutdown.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use letarette_bus::{Bus, Subscription};
use letarette_core::config::IndexConfig;
use letarette_core::{Config, DocumentUpdate, IndexStatus, SpaceStatus};
use letarette_store::IndexStore;

use crate::cycle::UpdateCycle;
use crate::sink::{UPDATE_QUEUE_DEPTH, run_sink};
use crate::Result;

const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A running indexer. At most one instance per (database file, space set).
///
/// Dropping the handle without calling [`close`](Self::close) leaves the
/// background tasks running; shutdown always goes through `close` so
/// in-flight document writes can complete.
pub struct Indexer {
  cancel: CancellationToken,
  main_task: JoinHandle<()>,
}

impl Indexer {
  /// Clear stale per-space work, subscribe to document updates and start
  /// the cycle loop.
  pub async fn start(config: &Config, store: Arc<dyn IndexStore>, bus: Bus) -> Result<Self> {
    config.validate()?;

    // Drop any chunk a prior crash left behind
    for space in &config.index.spaces {
      store.clear_interest_list(space).await?;
    }

    let (update_tx, update_rx) = mpsc::channel::<DocumentUpdate>(UPDATE_QUEUE_DEPTH);
    let subscription = bus
      .subscribe(&bus.subjects().document_update(), move |update: DocumentUpdate| {
        // Blocking on the bounded queue is the backpressure to the bus
        let update_tx = update_tx.clone();
        async move {
          let _ = update_tx.send(update).await;
        }
      })
      .await?;

    let sink_task = tokio::spawn(run_sink(Arc::clone(&store), update_rx));

    let cycles: Vec<UpdateCycle> = config
      .index
      .spaces
      .iter()
      .map(|space| UpdateCycle::new(space.clone(), Arc::clone(&store), bus.clone(), config.index.clone()))
      .collect();

    let cancel = CancellationToken::new();
    let main_task = tokio::spawn(run_main(
      cycles,
      store,
      bus,
      config.index.clone(),
      cancel.clone(),
      subscription,
      sink_task,
    ));

    Ok(Self { cancel, main_task })
  }

  /// Stop the loop and wait for the shutdown sequence to finish. Every
  /// update enqueued before this returns has reached the store.
  pub async fn close(self) {
    self.cancel.cancel();
    let _ = self.main_task.await;
  }
}

async fn run_main(
  mut cycles: Vec<UpdateCycle>,
  store: Arc<dyn IndexStore>,
  bus: Bus,
  config: IndexConfig,
  cancel: CancellationToken,
  subscription: Subscription,
  sink_task: JoinHandle<()>,
) {
  info!(spaces = cycles.len(), "Indexer starting");

  loop {
    let mut wait = config.cycle_wait();
    let mut total = 0;

    for cycle in &mut cycles {
      total += cycle.run().await;
    }

    publish_status(&bus, &store).await;

    if total == 0 {
      wait = config.empty_cycle_wait();
    }

    tokio::select! {
      biased;
      _ = cancel.cancelled() => {
        at_exit(subscription, sink_task).await;
        return;
      }
      // The loop is never faster than cycle_wait
      _ = tokio::time::sleep(wait) => {}
    }
  }
}

/// Shutdown sequence, in strict order: stop new deliveries, wait for every
/// enqueued update to reach the sink, close the queue, join the workers.
async fn at_exit(mut subscription: Subscription, sink_task: JoinHandle<()>) {
  info!("Indexer exiting");

  subscription.drain();
  while subscription.pending() > 0 {
    tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
  }

  // Joining the subscription drops the handler and with it the queue
  // sender, which lets the sink run dry and exit.
  subscription.join().await;
  let _ = sink_task.await;

  info!("Indexer stopped");
}

async fn publish_status(bus: &Bus, store: &Arc<dyn IndexStore>) {
  let stats = match store.index_stats().await {
    Ok(stats) => stats,
    Err(e) => {
      debug!(error = %e, "Failed to gather index stats");
      return;
    }
  };

  let status = IndexStatus {
    doc_count: stats.docs,
    spaces: stats
      .spaces
      .into_iter()
      .map(|space| SpaceStatus {
        name: space.name,
        last_update: space.state.last_updated_time(),
        last_document: space.state.last_updated_doc_id,
      })
      .collect(),
  };

  if let Err(e) = bus.publish(&bus.subjects().status(), &status).await {
    debug!(error = %e, "Failed to publish index status");
  }
}
