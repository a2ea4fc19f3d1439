//! Durable state for the letarette indexer: spaces, the interest list,
//! document rows and the FTS index, all in one SQLite file.
//!
//! The store is split over one write-serialized connection and a read pool;
//! every mutating operation runs as a single serialized transaction. The
//! indexer consumes the store through the narrow [`IndexStore`] trait so
//! tests can substitute their own implementation.

mod connection;
mod documents;
mod interest;
mod search;
mod stats;
mod stemmer;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

use letarette_core::{Document, DocumentId};

pub use connection::SqliteStore;
pub use search::SearchResult;
pub use stats::{IndexStats, SpaceStat};

#[derive(Error, Debug)]
pub enum StoreError {
  #[error("Database error: {0}")]
  Sqlx(#[from] sqlx::Error),
  #[error("IO error: {0}")]
  Io(#[from] std::io::Error),
  #[error("No spaces defined")]
  NoSpaces,
  #[error("Unknown space: {0}")]
  UnknownSpace(String),
  #[error("Cannot overwrite interest list with active entries")]
  ActiveListExists,
  #[error("Document update for {doc_id} did not apply to exactly one row")]
  DocWriteFailed { doc_id: DocumentId },
  #[error("Index and config stemmer settings mismatch")]
  StemmerMismatch,
  #[error("State encoding error: {0}")]
  Encoding(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// State of one interest row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterestState {
  Pending,
  Requested,
  Served,
}

impl InterestState {
  pub(crate) fn as_i64(self) -> i64 {
    match self {
      InterestState::Pending => 0,
      InterestState::Requested => 1,
      InterestState::Served => 2,
    }
  }

  pub(crate) fn from_i64(value: i64) -> Self {
    match value {
      1 => InterestState::Requested,
      2 => InterestState::Served,
      _ => InterestState::Pending,
    }
  }
}

/// One row in the interest list: a document that needs fetching.
#[derive(Debug, Clone)]
pub struct Interest {
  pub doc_id: DocumentId,
  pub state: InterestState,
}

/// Where the index process stands for one space.
#[derive(Debug, Clone, Default)]
pub struct InterestListState {
  /// When the current interest list was created, nanoseconds since epoch.
  pub created_at_nanos: i64,
  /// Version stamp of the last fully indexed document.
  pub last_updated_nanos: i64,
  pub last_updated_doc_id: DocumentId,
}

impl InterestListState {
  pub fn last_updated_time(&self) -> DateTime<Utc> {
    nanos_to_time(self.last_updated_nanos)
  }

  pub fn created_at_time(&self) -> DateTime<Utc> {
    nanos_to_time(self.created_at_nanos)
  }
}

/// Narrow storage interface the indexer runs against.
#[async_trait]
pub trait IndexStore: Send + Sync {
  /// Drop all interest rows for a space. Called at startup to recover from
  /// a crash mid-chunk.
  async fn clear_interest_list(&self, space: &str) -> Result<()>;

  /// Replace the interest list with a fresh pending chunk and stamp its
  /// creation time. Fails with [`StoreError::ActiveListExists`] while any
  /// current row is not yet served.
  async fn set_interest_list(&self, space: &str, doc_ids: &[DocumentId]) -> Result<()>;

  async fn get_interest_list(&self, space: &str) -> Result<Vec<Interest>>;

  async fn get_interest_list_state(&self, space: &str) -> Result<InterestListState>;

  async fn set_interest_state(&self, space: &str, doc_id: &DocumentId, state: InterestState) -> Result<()>;

  /// Flip all `requested` rows back to `pending` after a stall.
  async fn reset_requested(&self, space: &str) -> Result<()>;

  /// Apply a batch of document versions in one transaction: upsert each
  /// document, maintain the FTS shadow rows and mark matching interests
  /// served. Any upsert that does not hit exactly one row aborts the batch
  /// with [`StoreError::DocWriteFailed`].
  async fn add_document_updates(&self, space: &str, docs: &[Document]) -> Result<()>;

  /// Advance the index position to the latest served document whose version
  /// stamp predates the current list. Succeeds without advancing when no
  /// such document exists.
  async fn commit_interest_list(&self, space: &str) -> Result<()>;

  async fn get_last_update_time(&self, space: &str) -> Result<DateTime<Utc>>;

  /// Document count and per-space cursor summary, used by the status
  /// broadcast and the CLI.
  async fn index_stats(&self) -> Result<IndexStats>;
}

pub(crate) fn now_nanos() -> i64 {
  Utc::now().timestamp_nanos_opt().unwrap_or(i64::MAX)
}

pub(crate) fn time_to_nanos(time: DateTime<Utc>) -> i64 {
  time.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

pub(crate) fn nanos_to_time(nanos: i64) -> DateTime<Utc> {
  Utc.timestamp_nanos(nanos)
}

#[async_trait]
impl IndexStore for SqliteStore {
  async fn clear_interest_list(&self, space: &str) -> Result<()> {
    SqliteStore::clear_interest_list(self, space).await
  }

  async fn set_interest_list(&self, space: &str, doc_ids: &[DocumentId]) -> Result<()> {
    SqliteStore::set_interest_list(self, space, doc_ids).await
  }

  async fn get_interest_list(&self, space: &str) -> Result<Vec<Interest>> {
    SqliteStore::get_interest_list(self, space).await
  }

  async fn get_interest_list_state(&self, space: &str) -> Result<InterestListState> {
    SqliteStore::get_interest_list_state(self, space).await
  }

  async fn set_interest_state(&self, space: &str, doc_id: &DocumentId, state: InterestState) -> Result<()> {
    SqliteStore::set_interest_state(self, space, doc_id, state).await
  }

  async fn reset_requested(&self, space: &str) -> Result<()> {
    SqliteStore::reset_requested(self, space).await
  }

  async fn add_document_updates(&self, space: &str, docs: &[Document]) -> Result<()> {
    SqliteStore::add_document_updates(self, space, docs).await
  }

  async fn commit_interest_list(&self, space: &str) -> Result<()> {
    SqliteStore::commit_interest_list(self, space).await
  }

  async fn get_last_update_time(&self, space: &str) -> Result<DateTime<Utc>> {
    SqliteStore::get_last_update_time(self, space).await
  }

  async fn index_stats(&self) -> Result<IndexStats> {
    SqliteStore::index_stats(self).await
  }
}
