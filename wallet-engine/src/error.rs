//! Error types for the wallet engine

use thiserror::Error;

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Engine errors
///
/// Domain failures (`Ledger`) carry the full taxonomy from
/// `wallet_core`; everything else is infrastructure.
#[derive(Error, Debug)]
pub enum Error {
    /// Domain error from the wallet ledger core
    #[error("{0}")]
    Ledger(#[from] wallet_core::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Metadata serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unexpected internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// The domain error inside, if this is one
    pub fn as_ledger(&self) -> Option<&wallet_core::Error> {
        match self {
            Error::Ledger(err) => Some(err),
            _ => None,
        }
    }
}
