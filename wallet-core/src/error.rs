//! Error types for the wallet ledger domain

use rust_decimal::Decimal;
use thiserror::Error;

/// Result type for wallet ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Wallet ledger errors
///
/// Every variant is recoverable at the caller; none of them may leave
/// a wallet, payout, or dispute partially mutated.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or out-of-range input (negative amount, custom refund
    /// outside bounds, missing bank details)
    #[error("Validation error: {0}")]
    Validation(String),

    /// Wallet, payout, order, or dispute missing
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind (wallet, payout, order, dispute)
        entity: &'static str,
        /// Identifier that failed to resolve
        id: String,
    },

    /// Duplicate pending payout for the same wallet
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Requested amount exceeds available funds
    #[error("Insufficient balance: requested {requested}, available {available}")]
    InsufficientBalance {
        /// Amount the operation tried to move
        requested: Decimal,
        /// Balance at the time of the check
        available: Decimal,
    },

    /// Operation attempted from a state that does not permit it
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

impl Error {
    /// Shorthand for a `NotFound` with a displayable id
    pub fn not_found(entity: &'static str, id: impl ToString) -> Self {
        Error::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}
