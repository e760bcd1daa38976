//! Error types for the wallet ledger

use thiserror::Error;

/// Result type for ledger operations
pub type Result<T> = std::result::Result<T, Error>;

/// Ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Storage error (RocksDB or the in-memory substrate)
    #[error("Storage error: {0}")]
    Storage(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Credit amount was zero
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    /// Code already present in the used-code set
    #[error("Code already used: {0}")]
    CodeAlreadyUsed(String),

    /// Concurrency error (actor mailbox closed, etc.)
    #[error("Concurrency error: {0}")]
    Concurrency(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<rocksdb::Error> for Error {
    fn from(err: rocksdb::Error) -> Self {
        Error::Storage(err.to_string())
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Other(format!("Metrics error: {}", err))
    }
}

impl From<String> for Error {
    fn from(msg: String) -> Self {
        Error::Other(msg)
    }
}

impl From<&str> for Error {
    fn from(msg: &str) -> Self {
        Error::Other(msg.to_string())
    }
}

/// Outcome of a failed redemption.
///
/// The first three variants are ordinary user-facing outcomes. `PersistenceFailure`
/// means the credit could not be durably recorded and the balance was not advanced.
#[derive(Error, Debug)]
pub enum RedemptionError {
    /// Nothing was entered
    #[error("no code submitted")]
    EmptyCode,

    /// Code was consumed by an earlier redemption
    #[error("code {0} has already been redeemed")]
    AlreadyRedeemed(String),

    /// Code is not in the registry
    #[error("code {0} is not a valid code")]
    UnknownCode(String),

    /// The store failed to read or write
    #[error("persistence failure: {0}")]
    PersistenceFailure(#[source] Error),
}

impl RedemptionError {
    /// Label used for the outcome metric
    pub fn outcome(&self) -> &'static str {
        match self {
            RedemptionError::EmptyCode => "empty_code",
            RedemptionError::AlreadyRedeemed(_) => "already_redeemed",
            RedemptionError::UnknownCode(_) => "unknown_code",
            RedemptionError::PersistenceFailure(_) => "persistence_failure",
        }
    }
}

impl From<Error> for RedemptionError {
    fn from(err: Error) -> Self {
        match err {
            Error::CodeAlreadyUsed(code) => RedemptionError::AlreadyRedeemed(code),
            other => RedemptionError::PersistenceFailure(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_code_already_used_maps_to_already_redeemed() {
        let err: RedemptionError = Error::CodeAlreadyUsed("CLEAN10".to_string()).into();
        assert!(matches!(err, RedemptionError::AlreadyRedeemed(ref c) if c == "CLEAN10"));
    }

    #[test]
    fn test_storage_error_maps_to_persistence_failure() {
        let err: RedemptionError = Error::Storage("disk full".to_string()).into();
        assert_eq!(err.outcome(), "persistence_failure");
        assert!(err.to_string().contains("disk full"));
    }
}
