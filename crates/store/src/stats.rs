//! Index statistics for the CLI and the status broadcast.

use sqlx::Row;

use letarette_core::DocumentId;

use crate::{InterestListState, Result, SqliteStore};

#[derive(Debug, Clone)]
pub struct SpaceStat {
  pub name: String,
  pub state: InterestListState,
}

#[derive(Debug, Clone)]
pub struct IndexStats {
  /// Live (non-tombstoned) documents across all spaces.
  pub docs: u64,
  /// Unique terms in the FTS index.
  pub terms: u64,
  pub spaces: Vec<SpaceStat>,
}

impl SqliteStore {
  pub async fn index_stats(&self) -> Result<IndexStats> {
    let docs: i64 = sqlx::query("SELECT count(*) FROM docs WHERE alive")
      .fetch_one(&self.read)
      .await?
      .get(0);

    let terms: i64 = sqlx::query("SELECT count(*) FROM docs_fts_terms")
      .fetch_one(&self.read)
      .await?
      .get(0);

    let rows = sqlx::query(
      "SELECT space, listCreatedAtNanos, lastUpdatedAtNanos, lastUpdatedDocID FROM spaces ORDER BY space",
    )
    .fetch_all(&self.read)
    .await?;

    let spaces = rows
      .into_iter()
      .map(|row| SpaceStat {
        name: row.get(0),
        state: InterestListState {
          created_at_nanos: row.get(1),
          last_updated_nanos: row.get(2),
          last_updated_doc_id: DocumentId::from(row.get::<String, _>(3)),
        },
      })
      .collect();

    Ok(IndexStats {
      docs: docs as u64,
      terms: terms as u64,
      spaces,
    })
  }
}
