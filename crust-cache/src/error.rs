//! Error types for the cache layer.

use crust_model::SchemaError;
use std::fmt;
use thiserror::Error;

/// Result type for transport calls.
pub type TransportResult<T> = Result<T, TransportError>;

/// Result type for explicit cache intents (save, delete, refresh, ...).
pub type CacheResult<T> = Result<T, CacheError>;

/// Broad classification of a transport failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// Connection, DNS or timeout failure.
    Network,
    /// The server answered with a non-success status.
    Status,
    /// The response body could not be decoded.
    Decode,
    /// The resource does not exist on the server.
    NotFound,
    /// No transport is able to serve the request right now.
    Unavailable,
}

/// A failed remote call.
///
/// Cloneable so one failure can be attached to every entity of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Network, message)
    }

    pub fn status(code: u16, message: impl Into<String>) -> Self {
        let kind = if code == 404 {
            TransportErrorKind::NotFound
        } else {
            TransportErrorKind::Status
        };
        Self {
            kind,
            status: Some(code),
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Decode, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::NotFound, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(TransportErrorKind::Unavailable, message)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            TransportErrorKind::Network => "network error",
            TransportErrorKind::Status => "server error",
            TransportErrorKind::Decode => "decode error",
            TransportErrorKind::NotFound => "not found",
            TransportErrorKind::Unavailable => "transport unavailable",
        };
        match self.status {
            Some(code) => write!(f, "{kind} ({code}): {}", self.message),
            None => write!(f, "{kind}: {}", self.message),
        }
    }
}

/// Why an entity failed to load.
///
/// Stored on the entity; while present the entity is never re-queued for a
/// batched fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    /// The whole batch request failed.
    #[error("could not retrieve: {0}")]
    Transport(TransportError),

    /// The server answered the batch but left this record out.
    #[error("could not retrieve: omitted from response")]
    Missing,
}

/// Errors returned from explicit cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The remote call failed.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// No model with this name is registered.
    #[error("unknown model: {0}")]
    UnknownModel(String),

    /// The operation needs an identity the entity does not have yet.
    #[error("{model} record has no identity")]
    Unsaved { model: String },

    /// The identity does not match the model's key type.
    #[error("mistyped {model} id: {id}")]
    MistypedId { model: String, id: String },

    /// The identity is not held by the table.
    #[error("{model} {id} is not cached")]
    NotCached { model: String, id: String },

    /// The entity is not attached to a live database.
    #[error("{model} record is not attached to a database")]
    Detached { model: String },

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid model definition.
    #[error("schema error: {0}")]
    Schema(#[from] SchemaError),
}
