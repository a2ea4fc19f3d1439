//! The letarette indexing loop.
//!
//! A pull-based control loop that discovers out-of-date documents per space,
//! requests their contents from providers over the bus, writes them to the
//! index store and advances a durable index position. See [`Indexer`].

mod cycle;
mod sink;
mod supervisor;

use thiserror::Error;

pub use supervisor::Indexer;

#[derive(Error, Debug)]
pub enum IndexerError {
  #[error("Config error: {0}")]
  Config(#[from] letarette_core::ConfigError),
  #[error("Store error: {0}")]
  Store(#[from] letarette_store::StoreError),
  #[error("Bus error: {0}")]
  Bus(#[from] letarette_bus::BusError),
}

pub type Result<T> = std::result::Result<T, IndexerError>;
