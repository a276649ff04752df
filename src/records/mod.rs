//! Record Store Module
//!
//! Holds the domain name → IPv4 address mapping that authoritative answers
//! come from. The mapping lives in memory and is rewritten to a JSON file
//! after every administrative mutation.

mod storage;

pub use storage::RecordStore;

use std::path::PathBuf;

/// Errors returned by mutating store operations
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The in-memory mutation was applied but the file could not be written
    #[error("failed to persist records to {path:?}: {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize records: {0}")]
    Serialize(#[from] serde_json::Error),
}
