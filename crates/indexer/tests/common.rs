//! Common test utilities for indexer integration tests: an isolated store,
//! an in-process bus and a scripted document provider.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{TimeZone, Utc};
use tempfile::TempDir;

use letarette_bus::{Bus, InProcessTransport};
use letarette_core::config::IndexConfig;
use letarette_core::{
  Config, Document, DocumentId, DocumentRequest, DocumentUpdate, IndexUpdate, IndexUpdateRequest, StemmerSettings,
};
use letarette_store::SqliteStore;

pub struct TestCluster {
  pub temp: TempDir,
  pub store: Arc<SqliteStore>,
  pub transport: InProcessTransport,
  pub bus: Bus,
  pub config: Config,
}

/// Spin up a store and bus with fast pacing for tests.
pub async fn cluster(spaces: &[&str]) -> TestCluster {
  let temp = TempDir::new().expect("Failed to create temp dir");
  let spaces: Vec<String> = spaces.iter().map(|s| s.to_string()).collect();
  let store = SqliteStore::open(&temp.path().join("letarette.db"), &spaces, &StemmerSettings::default())
    .await
    .expect("Failed to open store");

  let transport = InProcessTransport::new();
  let bus = Bus::new(Arc::new(transport.clone()), "leta");

  let config = Config {
    index: IndexConfig {
      spaces,
      chunk_size: 3,
      max_outstanding: 2,
      cycle_wait_ms: 10,
      empty_cycle_wait_ms: 20,
      max_interest_wait_ms: 200,
      max_document_wait_ms: 0,
      ..Default::default()
    },
    ..Default::default()
  };

  TestCluster {
    temp,
    store: Arc::new(store),
    transport,
    bus,
    config,
  }
}

/// Scripted provider: answers index requests from a fixed list of chunks
/// (empty replies once exhausted) and records everything the indexer asks.
pub struct Provider {
  pub index_requests: Arc<Mutex<Vec<IndexUpdateRequest>>>,
  pub document_requests: Arc<Mutex<Vec<DocumentRequest>>>,
}

impl Provider {
  pub async fn start(cluster: &TestCluster, chunks: Vec<Vec<&'static str>>) -> Self {
    let index_requests = Arc::new(Mutex::new(Vec::new()));
    let document_requests = Arc::new(Mutex::new(Vec::new()));

    let mut script: VecDeque<Vec<&'static str>> = chunks.into_iter().collect();
    let seen = Arc::clone(&index_requests);
    let mut requests = cluster.transport.serve(&cluster.bus.subjects().index_request());
    tokio::spawn(async move {
      while let Some(envelope) = requests.recv().await {
        let request: IndexUpdateRequest = serde_json::from_slice(&envelope.payload).expect("bad index request");
        let updates = script
          .pop_front()
          .unwrap_or_default()
          .into_iter()
          .map(DocumentId::from)
          .collect();
        let reply = IndexUpdate {
          space: request.space.clone(),
          updates,
        };
        seen.lock().unwrap().push(request);
        let _ = envelope.reply.send(serde_json::to_vec(&reply).expect("bad index reply"));
      }
    });

    let wanted = Arc::clone(&document_requests);
    cluster
      .bus
      .subscribe(
        &cluster.bus.subjects().document_request(),
        move |request: DocumentRequest| {
          let wanted = Arc::clone(&wanted);
          async move {
            wanted.lock().unwrap().push(request);
          }
        },
      )
      .await
      .expect("Failed to subscribe to document requests");

    Self {
      index_requests,
      document_requests,
    }
  }

  /// Publish a batch of documents, the way a real provider would.
  pub async fn publish(&self, cluster: &TestCluster, space: &str, documents: Vec<Document>) {
    let update = DocumentUpdate {
      space: space.to_string(),
      documents,
    };
    cluster
      .bus
      .publish(&cluster.bus.subjects().document_update(), &update)
      .await
      .expect("Failed to publish document update");
  }

  pub fn index_request_count(&self) -> usize {
    self.index_requests.lock().unwrap().len()
  }

  pub fn document_request_count(&self) -> usize {
    self.document_requests.lock().unwrap().len()
  }

  pub fn nth_document_request(&self, n: usize) -> Option<DocumentRequest> {
    self.document_requests.lock().unwrap().get(n).cloned()
  }

  pub fn nth_index_request(&self, n: usize) -> Option<IndexUpdateRequest> {
    self.index_requests.lock().unwrap().get(n).cloned()
  }
}

pub fn doc(id: &str, nanos: i64, alive: bool, text: &str) -> Document {
  Document {
    id: DocumentId::from(id),
    updated: Utc.timestamp_nanos(nanos),
    alive,
    text: text.to_string(),
  }
}

pub fn ids(raw: &[&str]) -> Vec<DocumentId> {
  raw.iter().map(|id| DocumentId::from(*id)).collect()
}

/// Poll a condition until it holds, panicking after two seconds.
pub async fn wait_until<F, Fut>(what: &str, mut cond: F)
where
  F: FnMut() -> Fut,
  Fut: Future<Output = bool>,
{
  let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
  loop {
    if cond().await {
      return;
    }
    if tokio::time::Instant::now() > deadline {
      panic!("Timed out waiting for {what}");
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
}
