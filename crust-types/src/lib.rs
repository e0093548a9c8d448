//! Identity types for the crust entity cache.
//!
//! Every cached record is keyed by a [`RecordId`]: either a positive integer
//! (the common database surrogate key) or a GUID. A model declares which of
//! the two it uses through its [`KeyType`], and every layer above validates
//! incoming identities against it before touching a table.

mod ids;

pub use ids::{KeyType, RecordId};

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while parsing identities.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid record id: {0}")]
    InvalidId(String),
}
