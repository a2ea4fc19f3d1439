use std::path::Path;
use std::time::Duration;

use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use tracing::{debug, info};

use letarette_core::StemmerSettings;

use crate::{Result, StoreError};

const BUSY_TIMEOUT: Duration = Duration::from_millis(500);

/// SQLite-backed index store.
///
/// Two pools over the same file: `write` is capped at a single connection so
/// all mutations are totally ordered, `read` serves snapshot reads.
pub struct SqliteStore {
  pub(crate) write: SqlitePool,
  pub(crate) read: SqlitePool,
}

impl SqliteStore {
  /// Open or create the database, apply the schema and register the
  /// configured spaces. Refuses to open without at least one space.
  pub async fn open(db_path: &Path, spaces: &[String], stemmer: &StemmerSettings) -> Result<Self> {
    if spaces.is_empty() {
      return Err(StoreError::NoSpaces);
    }

    if let Some(parent) = db_path.parent()
      && !parent.as_os_str().is_empty()
    {
      std::fs::create_dir_all(parent)?;
    }

    info!(path = %db_path.display(), spaces = spaces.len(), "Opening index store");

    let write_options = SqliteConnectOptions::new()
      .filename(db_path)
      .create_if_missing(true)
      .journal_mode(SqliteJournalMode::Wal)
      .synchronous(SqliteSynchronous::Normal)
      .foreign_keys(true)
      .busy_timeout(BUSY_TIMEOUT);

    // Only one writer
    let write = SqlitePoolOptions::new()
      .max_connections(1)
      .connect_with(write_options)
      .await?;

    init_schema(&write, stemmer).await?;

    for space in spaces {
      sqlx::query("INSERT INTO spaces (space, lastUpdatedAtNanos) VALUES (?, 0) ON CONFLICT DO NOTHING")
        .bind(space)
        .execute(&write)
        .await?;
    }

    // Multiple readers
    let read_options = SqliteConnectOptions::new()
      .filename(db_path)
      .read_only(true)
      .journal_mode(SqliteJournalMode::Wal)
      .busy_timeout(BUSY_TIMEOUT);

    let read = SqlitePoolOptions::new()
      .max_connections(4)
      .connect_with(read_options)
      .await?;

    let store = Self { write, read };
    store.init_stemmer_state(stemmer).await?;

    Ok(store)
  }

  /// Checkpoint the WAL and close both pools.
  pub async fn close(self) -> Result<()> {
    debug!("Closing index store");
    sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)").execute(&self.write).await?;
    self.read.close().await;
    self.write.close().await;
    Ok(())
  }

  pub(crate) async fn space_id(&self, space: &str) -> Result<i64> {
    let row = sqlx::query("SELECT spaceID FROM spaces WHERE space = ?")
      .bind(space)
      .fetch_optional(&self.read)
      .await?;

    match row {
      Some(row) => Ok(row.get(0)),
      None => Err(StoreError::UnknownSpace(space.to_string())),
    }
  }
}

async fn init_schema(pool: &SqlitePool, stemmer: &StemmerSettings) -> Result<()> {
  debug!("Initializing index store schema");

  sqlx::query(
    r#"
    CREATE TABLE IF NOT EXISTS spaces (
      spaceID INTEGER PRIMARY KEY,
      space TEXT NOT NULL UNIQUE,
      listCreatedAtNanos INTEGER NOT NULL DEFAULT 0,
      lastUpdatedAtNanos INTEGER NOT NULL DEFAULT 0,
      lastUpdatedDocID TEXT NOT NULL DEFAULT ''
    )
    "#,
  )
  .execute(pool)
  .await?;

  sqlx::query(
    r#"
    CREATE TABLE IF NOT EXISTS interest (
      spaceID INTEGER NOT NULL REFERENCES spaces(spaceID),
      docID TEXT NOT NULL,
      state INTEGER NOT NULL,
      PRIMARY KEY (spaceID, docID)
    )
    "#,
  )
  .execute(pool)
  .await?;

  sqlx::query(
    r#"
    CREATE TABLE IF NOT EXISTS docs (
      spaceID INTEGER NOT NULL REFERENCES spaces(spaceID),
      docID TEXT NOT NULL,
      updatedNanos INTEGER NOT NULL,
      txt TEXT NOT NULL,
      alive INTEGER NOT NULL,
      PRIMARY KEY (spaceID, docID)
    )
    "#,
  )
  .execute(pool)
  .await?;

  sqlx::query(
    r#"
    CREATE TABLE IF NOT EXISTS stemmerstate (
      languages TEXT NOT NULL,
      removeDiacritics INTEGER NOT NULL,
      tokenCharacters TEXT NOT NULL,
      separators TEXT NOT NULL,
      updatedNanos INTEGER NOT NULL
    )
    "#,
  )
  .execute(pool)
  .await?;

  let create_fts = format!(
    r#"CREATE VIRTUAL TABLE IF NOT EXISTS docs_fts USING fts5(
      spaceID UNINDEXED, docID UNINDEXED, txt, tokenize="{}"
    )"#,
    fts_tokenizer(stemmer)
  );
  sqlx::query(&create_fts).execute(pool).await?;

  sqlx::query("CREATE VIRTUAL TABLE IF NOT EXISTS docs_fts_terms USING fts5vocab('docs_fts', 'row')")
    .execute(pool)
    .await?;

  Ok(())
}

/// Build the FTS5 tokenizer string from the configured stemmer settings.
fn fts_tokenizer(settings: &StemmerSettings) -> String {
  let mut tokenize = format!(
    "unicode61 remove_diacritics {}",
    if settings.remove_diacritics { 2 } else { 0 }
  );
  if !settings.token_characters.is_empty() {
    tokenize.push_str(&format!(" tokenchars '{}'", settings.token_characters.replace('\'', "''")));
  }
  if !settings.separators.is_empty() {
    tokenize.push_str(&format!(" separators '{}'", settings.separators.replace('\'', "''")));
  }
  tokenize
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_util::open_test_store;
  use tempfile::TempDir;

  #[tokio::test]
  async fn test_open_creates_schema_and_spaces() {
    let (_temp, store) = open_test_store(&["wp", "docs"]).await;

    let wp = store.space_id("wp").await.unwrap();
    let docs = store.space_id("docs").await.unwrap();
    assert_ne!(wp, docs);

    assert!(matches!(
      store.space_id("missing").await,
      Err(StoreError::UnknownSpace(_))
    ));
  }

  #[tokio::test]
  async fn test_open_is_idempotent() {
    let temp = TempDir::new().unwrap();
    let path = temp.path().join("test.db");
    let spaces = vec!["wp".to_string()];
    let stemmer = StemmerSettings::default();

    let store = SqliteStore::open(&path, &spaces, &stemmer).await.unwrap();
    let first_id = store.space_id("wp").await.unwrap();
    store.close().await.unwrap();

    let store = SqliteStore::open(&path, &spaces, &stemmer).await.unwrap();
    assert_eq!(store.space_id("wp").await.unwrap(), first_id);
    store.close().await.unwrap();
  }

  #[tokio::test]
  async fn test_open_requires_spaces() {
    let temp = TempDir::new().unwrap();
    let result = SqliteStore::open(&temp.path().join("test.db"), &[], &StemmerSettings::default()).await;
    assert!(matches!(result, Err(StoreError::NoSpaces)));
  }

  #[test]
  fn test_fts_tokenizer_string() {
    let settings = StemmerSettings {
      languages: vec!["english".to_string()],
      remove_diacritics: true,
      token_characters: "-_".to_string(),
      separators: String::new(),
    };
    assert_eq!(fts_tokenizer(&settings), "unicode61 remove_diacritics 2 tokenchars '-_'");

    let plain = StemmerSettings {
      remove_diacritics: false,
      token_characters: String::new(),
      ..settings
    };
    assert_eq!(fts_tokenizer(&plain), "unicode61 remove_diacritics 0");
  }
}
