//! Shared foundation for the letarette cluster: wire protocol types and
//! configuration. Everything here is plain data - no I/O.

pub mod config;
pub mod protocol;

pub use config::{Config, ConfigError, StemmerSettings};
pub use protocol::{
  Document, DocumentId, DocumentRequest, DocumentUpdate, IndexStatus, IndexUpdate, IndexUpdateRequest, SpaceStatus,
};
