//! Command implementations for the letarette binary.

use std::sync::Arc;

use anyhow::Result;
use tokio::signal;
use tracing::info;

use letarette_bus::{Bus, InProcessTransport};
use letarette_core::Config;
use letarette_indexer::Indexer;
use letarette_store::{SqliteStore, StoreError};

async fn open_store(config: &Config) -> Result<SqliteStore> {
  Ok(SqliteStore::open(&config.db.path, &config.index.spaces, &config.stemmer).await?)
}

/// Run the indexer until interrupted.
///
/// The bus transport is an integration seam; this wiring uses the in-process
/// transport, so providers are expected to join through the library. Cluster
/// deployments plug a network transport into the same [`Bus`].
pub async fn cmd_serve(config: Config) -> Result<()> {
  let store = Arc::new(open_store(&config).await?);
  let transport = InProcessTransport::new();
  let bus = Bus::new(Arc::new(transport), config.bus.topic.clone());

  let indexer = Indexer::start(&config, store.clone(), bus).await?;
  info!("Indexer running - ctrl-c to stop");

  signal::ctrl_c().await?;
  indexer.close().await;

  if let Ok(store) = Arc::try_unwrap(store) {
    store.close().await?;
  }
  Ok(())
}

pub async fn cmd_search(config: Config, space: String, phrase: Vec<String>, limit: u16, offset: u16) -> Result<()> {
  let store = open_store(&config).await?;
  let hits = store.search(&phrase.join(" "), &[space], limit, offset).await?;

  if hits.is_empty() {
    println!("No hits");
  }
  for hit in hits {
    println!("{}\t{}", hit.doc_id, hit.snippet);
  }

  store.close().await?;
  Ok(())
}

pub async fn cmd_index_stats(config: Config) -> Result<()> {
  let store = open_store(&config).await?;
  let stats = store.index_stats().await?;

  println!(
    "Index contains {} documents and {} unique terms.\n",
    stats.docs, stats.terms
  );
  println!("Spaces:");
  for space in &stats.spaces {
    println!(
      "  {} - last updated @ {} ({})",
      space.name,
      space.state.last_updated_time().to_rfc2822(),
      space.state.last_updated_doc_id
    );
  }

  store.close().await?;
  Ok(())
}

pub async fn cmd_index_check(config: Config) -> Result<()> {
  let store = open_store(&config).await?;

  match store.check_stemmer_settings(&config.stemmer).await {
    Ok(()) => println!("OK"),
    Err(StoreError::StemmerMismatch) => {
      println!("Index and config stemmer settings mismatch. Re-build index or force changes.");
    }
    Err(e) => return Err(e.into()),
  }

  store.close().await?;
  Ok(())
}

pub async fn cmd_index_force_stemmer(config: Config) -> Result<()> {
  let store = open_store(&config).await?;

  println!("Forcing stemmer state change...");
  store.set_stemmer_state(&config.stemmer).await?;
  println!("OK");

  store.close().await?;
  Ok(())
}
