//! Read-side full-text search against the FTS index.

use std::collections::HashMap;

use sqlx::Row;

use letarette_core::DocumentId;

use crate::{Result, SqliteStore};

/// One search hit. Rank is the raw BM25 score; lower is better.
#[derive(Debug, Clone)]
pub struct SearchResult {
  pub space: String,
  pub doc_id: DocumentId,
  pub snippet: String,
  pub rank: f64,
}

impl SqliteStore {
  /// Match a phrase against the given spaces, best hits first.
  ///
  /// Tombstoned documents have no FTS rows and never show up here.
  pub async fn search(&self, phrase: &str, spaces: &[String], limit: u16, offset: u16) -> Result<Vec<SearchResult>> {
    let mut names_by_id: HashMap<i64, String> = HashMap::new();
    for space in spaces {
      names_by_id.insert(self.space_id(space).await?, space.clone());
    }
    if names_by_id.is_empty() {
      return Ok(Vec::new());
    }

    let placeholders = vec!["?"; names_by_id.len()].join(", ");
    let sql = format!(
      r#"
      SELECT spaceID, docID, snippet(docs_fts, 2, '[', ']', '…', 8) AS snippet, bm25(docs_fts) AS rank
      FROM docs_fts
      WHERE docs_fts MATCH ? AND spaceID IN ({placeholders})
      ORDER BY rank
      LIMIT ? OFFSET ?
      "#
    );

    let mut query = sqlx::query(&sql).bind(phrase);
    for space_id in names_by_id.keys() {
      query = query.bind(space_id);
    }
    let rows = query.bind(limit).bind(offset).fetch_all(&self.read).await?;

    Ok(
      rows
        .into_iter()
        .map(|row| {
          let space_id: i64 = row.get(0);
          SearchResult {
            space: names_by_id.get(&space_id).cloned().unwrap_or_default(),
            doc_id: DocumentId::from(row.get::<String, _>(1)),
            snippet: row.get(2),
            rank: row.get(3),
          }
        })
        .collect(),
    )
  }
}
