//! Document writes and index position commits.

use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::debug;

use letarette_core::{Document, DocumentId};

use crate::{InterestState, Result, SqliteStore, StoreError, nanos_to_time, time_to_nanos};

impl SqliteStore {
  /// Apply a batch of document versions in one transaction.
  ///
  /// Each document row is replaced by (space, docID), the FTS shadow row is
  /// rewritten (or removed for tombstones) and the matching interest row is
  /// marked served. The whole batch aborts when any upsert fails to hit
  /// exactly one row.
  pub async fn add_document_updates(&self, space: &str, docs: &[Document]) -> Result<()> {
    let space_id = self.space_id(space).await?;
    let mut tx = self.write.begin().await?;

    for doc in docs {
      let txt = if doc.alive { doc.text.as_str() } else { "" };
      let result = sqlx::query(
        r#"
        INSERT INTO docs (spaceID, docID, updatedNanos, txt, alive) VALUES (?, ?, ?, ?, ?)
        ON CONFLICT (spaceID, docID) DO UPDATE SET
          updatedNanos = excluded.updatedNanos,
          txt = excluded.txt,
          alive = excluded.alive
        "#,
      )
      .bind(space_id)
      .bind(doc.id.as_str())
      .bind(time_to_nanos(doc.updated))
      .bind(txt)
      .bind(doc.alive)
      .execute(&mut *tx)
      .await?;

      if result.rows_affected() != 1 {
        return Err(StoreError::DocWriteFailed { doc_id: doc.id.clone() });
      }

      sqlx::query("DELETE FROM docs_fts WHERE spaceID = ? AND docID = ?")
        .bind(space_id)
        .bind(doc.id.as_str())
        .execute(&mut *tx)
        .await?;
      if doc.alive {
        sqlx::query("INSERT INTO docs_fts (spaceID, docID, txt) VALUES (?, ?, ?)")
          .bind(space_id)
          .bind(doc.id.as_str())
          .bind(txt)
          .execute(&mut *tx)
          .await?;
      }

      sqlx::query("UPDATE interest SET state = ? WHERE spaceID = ? AND docID = ?")
        .bind(InterestState::Served.as_i64())
        .bind(space_id)
        .bind(doc.id.as_str())
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    debug!(space, docs = docs.len(), "Applied document updates");
    Ok(())
  }

  /// Advance the index position to the latest served document whose version
  /// stamp is strictly before the current list's creation time. Documents
  /// stamped after list creation belong to a future chunk and are ignored.
  pub async fn commit_interest_list(&self, space: &str) -> Result<()> {
    let space_id = self.space_id(space).await?;
    let mut tx = self.write.begin().await?;

    let list_created: i64 = sqlx::query("SELECT listCreatedAtNanos FROM spaces WHERE spaceID = ?")
      .bind(space_id)
      .fetch_one(&mut *tx)
      .await?
      .get(0);

    let newest = sqlx::query(
      r#"
      SELECT d.updatedNanos, d.docID
      FROM interest i
      JOIN docs d ON d.spaceID = i.spaceID AND d.docID = i.docID
      WHERE i.spaceID = ? AND i.state = ? AND d.updatedNanos < ?
      ORDER BY d.updatedNanos DESC, d.docID DESC
      LIMIT 1
      "#,
    )
    .bind(space_id)
    .bind(InterestState::Served.as_i64())
    .bind(list_created)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(row) = newest {
      let updated_nanos: i64 = row.get(0);
      let doc_id: String = row.get(1);

      // Progress is monotonic in (updatedNanos, docID)
      sqlx::query(
        r#"
        UPDATE spaces SET lastUpdatedAtNanos = ?, lastUpdatedDocID = ?
        WHERE spaceID = ?
          AND (lastUpdatedAtNanos < ? OR (lastUpdatedAtNanos = ? AND lastUpdatedDocID < ?))
        "#,
      )
      .bind(updated_nanos)
      .bind(&doc_id)
      .bind(space_id)
      .bind(updated_nanos)
      .bind(updated_nanos)
      .bind(&doc_id)
      .execute(&mut *tx)
      .await?;

      debug!(space, updated_nanos, doc_id = %doc_id, "Committed interest list");
    }

    tx.commit().await?;
    Ok(())
  }

  pub async fn get_last_update_time(&self, space: &str) -> Result<DateTime<Utc>> {
    let row = sqlx::query("SELECT lastUpdatedAtNanos FROM spaces WHERE space = ?")
      .bind(space)
      .fetch_optional(&self.read)
      .await?
      .ok_or_else(|| StoreError::UnknownSpace(space.to_string()))?;
    Ok(nanos_to_time(row.get(0)))
  }
}
