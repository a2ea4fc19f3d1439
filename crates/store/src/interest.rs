//! Interest list operations.
//!
//! The interest table holds the chunk currently under work and doubles as
//! the correlation table for uncorrelated document updates: incoming
//! documents mark rows served by (space, docID).

use sqlx::Row;
use tracing::debug;

use letarette_core::DocumentId;

use crate::{Interest, InterestListState, InterestState, Result, SqliteStore, StoreError, now_nanos};

impl SqliteStore {
  pub async fn clear_interest_list(&self, space: &str) -> Result<()> {
    let space_id = self.space_id(space).await?;
    sqlx::query("DELETE FROM interest WHERE spaceID = ?")
      .bind(space_id)
      .execute(&self.write)
      .await?;
    Ok(())
  }

  pub async fn set_interest_list(&self, space: &str, doc_ids: &[DocumentId]) -> Result<()> {
    let space_id = self.space_id(space).await?;
    let mut tx = self.write.begin().await?;

    let active: i64 = sqlx::query("SELECT count(*) FROM interest WHERE spaceID = ? AND state != ?")
      .bind(space_id)
      .bind(InterestState::Served.as_i64())
      .fetch_one(&mut *tx)
      .await?
      .get(0);
    if active > 0 {
      return Err(StoreError::ActiveListExists);
    }

    sqlx::query("DELETE FROM interest WHERE spaceID = ?")
      .bind(space_id)
      .execute(&mut *tx)
      .await?;

    for doc_id in doc_ids {
      sqlx::query("INSERT INTO interest (spaceID, docID, state) VALUES (?, ?, ?) ON CONFLICT DO NOTHING")
        .bind(space_id)
        .bind(doc_id.as_str())
        .bind(InterestState::Pending.as_i64())
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("UPDATE spaces SET listCreatedAtNanos = ? WHERE spaceID = ?")
      .bind(now_nanos())
      .bind(space_id)
      .execute(&mut *tx)
      .await?;

    tx.commit().await?;
    debug!(space, docs = doc_ids.len(), "Set interest list");
    Ok(())
  }

  pub async fn get_interest_list(&self, space: &str) -> Result<Vec<Interest>> {
    let space_id = self.space_id(space).await?;
    let rows = sqlx::query("SELECT docID, state FROM interest WHERE spaceID = ?")
      .bind(space_id)
      .fetch_all(&self.read)
      .await?;

    Ok(
      rows
        .into_iter()
        .map(|row| Interest {
          doc_id: DocumentId::from(row.get::<String, _>(0)),
          state: InterestState::from_i64(row.get(1)),
        })
        .collect(),
    )
  }

  pub async fn get_interest_list_state(&self, space: &str) -> Result<InterestListState> {
    let row = sqlx::query("SELECT listCreatedAtNanos, lastUpdatedAtNanos, lastUpdatedDocID FROM spaces WHERE space = ?")
      .bind(space)
      .fetch_optional(&self.read)
      .await?
      .ok_or_else(|| StoreError::UnknownSpace(space.to_string()))?;

    Ok(InterestListState {
      created_at_nanos: row.get(0),
      last_updated_nanos: row.get(1),
      last_updated_doc_id: DocumentId::from(row.get::<String, _>(2)),
    })
  }

  /// Idempotent single-row state update.
  pub async fn set_interest_state(&self, space: &str, doc_id: &DocumentId, state: InterestState) -> Result<()> {
    let space_id = self.space_id(space).await?;
    sqlx::query("UPDATE interest SET state = ? WHERE spaceID = ? AND docID = ?")
      .bind(state.as_i64())
      .bind(space_id)
      .bind(doc_id.as_str())
      .execute(&self.write)
      .await?;
    Ok(())
  }

  pub async fn reset_requested(&self, space: &str) -> Result<()> {
    let space_id = self.space_id(space).await?;
    let result = sqlx::query("UPDATE interest SET state = ? WHERE spaceID = ? AND state = ?")
      .bind(InterestState::Pending.as_i64())
      .bind(space_id)
      .bind(InterestState::Requested.as_i64())
      .execute(&self.write)
      .await?;
    debug!(space, reset = result.rows_affected(), "Reset requested interests");
    Ok(())
  }
}
