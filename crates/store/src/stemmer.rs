//! Persisted tokenizer settings.
//!
//! The FTS tokenizer is fixed when the index is first created. The settings
//! used at creation are stored alongside the index so later runs can detect
//! a config drift that would require a rebuild.

use chrono::{DateTime, Utc};
use sqlx::Row;
use tracing::warn;

use letarette_core::StemmerSettings;

use crate::{Result, SqliteStore, StoreError, nanos_to_time, now_nanos};

impl SqliteStore {
  /// Record the configured settings on first open; warn when a previously
  /// created index used different ones.
  pub(crate) async fn init_stemmer_state(&self, settings: &StemmerSettings) -> Result<()> {
    match self.get_stemmer_state().await? {
      None => self.set_stemmer_state(settings).await,
      Some((stored, _)) => {
        if stored != *settings {
          warn!("Index and config stemmer settings mismatch - re-build the index or force the change");
        }
        Ok(())
      }
    }
  }

  pub async fn get_stemmer_state(&self) -> Result<Option<(StemmerSettings, DateTime<Utc>)>> {
    let row = sqlx::query(
      "SELECT languages, removeDiacritics, tokenCharacters, separators, updatedNanos FROM stemmerstate",
    )
    .fetch_optional(&self.read)
    .await?;

    let Some(row) = row else {
      return Ok(None);
    };

    let languages: Vec<String> = serde_json::from_str(&row.get::<String, _>(0))?;
    let settings = StemmerSettings {
      languages,
      remove_diacritics: row.get::<bool, _>(1),
      token_characters: row.get::<String, _>(2),
      separators: row.get::<String, _>(3),
    };
    Ok(Some((settings, nanos_to_time(row.get::<i64, _>(4)))))
  }

  pub async fn set_stemmer_state(&self, settings: &StemmerSettings) -> Result<()> {
    let languages = serde_json::to_string(&settings.languages)?;
    let mut tx = self.write.begin().await?;
    sqlx::query("DELETE FROM stemmerstate").execute(&mut *tx).await?;
    sqlx::query(
      "INSERT INTO stemmerstate (languages, removeDiacritics, tokenCharacters, separators, updatedNanos) VALUES (?, ?, ?, ?, ?)",
    )
    .bind(&languages)
    .bind(settings.remove_diacritics)
    .bind(&settings.token_characters)
    .bind(&settings.separators)
    .bind(now_nanos())
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;
    Ok(())
  }

  /// Compare the stored settings against the config.
  pub async fn check_stemmer_settings(&self, settings: &StemmerSettings) -> Result<()> {
    match self.get_stemmer_state().await? {
      Some((stored, _)) if stored != *settings => Err(StoreError::StemmerMismatch),
      _ => Ok(()),
    }
  }
}
