//! Message types exchanged between indexers, document providers and monitors.
//!
//! All messages travel as JSON. Field casing follows the original cluster
//! protocol: message envelopes use lowerCamelCase, `Document` uses the
//! capitalized field names providers already emit.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Opaque, printable document identifier. Unique per space, totally ordered
/// by byte comparison - the ordering is load-bearing for the index cursor.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DocumentId(String);

impl DocumentId {
  pub fn new(id: impl Into<String>) -> Self {
    Self(id.into())
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }

  pub fn is_empty(&self) -> bool {
    self.0.is_empty()
  }
}

impl std::fmt::Display for DocumentId {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(&self.0)
  }
}

impl From<&str> for DocumentId {
  fn from(id: &str) -> Self {
    Self(id.to_string())
  }
}

impl From<String> for DocumentId {
  fn from(id: String) -> Self {
    Self(id)
  }
}

/// One document version as published by a provider.
///
/// `updated` is the provider's monotonic version stamp. A document with
/// `alive = false` is a tombstone; its text is ignored and the indexed text
/// is emptied.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
  #[serde(rename = "ID")]
  pub id: DocumentId,
  #[serde(rename = "Updated")]
  pub updated: DateTime<Utc>,
  #[serde(rename = "Alive")]
  pub alive: bool,
  #[serde(rename = "Text")]
  pub text: String,
}

/// Batch of document versions, published by providers on
/// `<topic>.document.update`. Uncorrelated - the indexer matches documents
/// against its interest list by (space, ID).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentUpdate {
  pub space: String,
  pub documents: Vec<Document>,
}

/// Fire-and-forget request for document contents, published by the indexer
/// on `<topic>.document.request`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRequest {
  pub space: String,
  pub wanted: Vec<DocumentId>,
}

/// Request for the next chunk of out-of-date document ids, sent as a
/// synchronous request on `<topic>.index.request`. The (`from_time`,
/// `after_document`) pair is the index cursor; providers reply with ids
/// strictly after it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexUpdateRequest {
  pub space: String,
  pub from_time: DateTime<Utc>,
  pub after_document: DocumentId,
  pub limit: u16,
}

/// Provider reply to an [`IndexUpdateRequest`]. An empty `updates` list means
/// the space is fully caught up.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexUpdate {
  pub space: String,
  pub updates: Vec<DocumentId>,
}

/// Per-space progress, part of the status broadcast.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpaceStatus {
  pub name: String,
  pub last_update: DateTime<Utc>,
  pub last_document: DocumentId,
}

/// Index health broadcast on `<topic>.status`, consumed by external
/// monitors only.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexStatus {
  pub doc_count: u64,
  pub spaces: Vec<SpaceStatus>,
}
