//! Error types for the store.

use thiserror::Error;

use cadence_scheduler::StoreError;

/// Errors that can occur in database operations.
#[derive(Debug, Error)]
pub enum DbError {
    /// SQLite error.
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection mutex was poisoned by a panicking holder.
    #[error("database connection poisoned")]
    Poisoned,

    /// A stored row could not be turned into a record.
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        StoreError::with_source("subscription store failed", err)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn test_store_error_chain_names_cause_once() {
        let err: StoreError = DbError::InvalidRecord("chat 1: bad period -5".into()).into();

        let mut chain = vec![err.to_string()];
        let mut next = err.source();
        while let Some(cause) = next {
            chain.push(cause.to_string());
            next = cause.source();
        }

        assert_eq!(
            chain,
            vec![
                "subscription store failed".to_string(),
                "invalid record: chat 1: bad period -5".to_string(),
            ]
        );
    }
}
