//! Error types for grantvault operations

use thiserror::Error;

/// Storage layer errors.
///
/// Everything that goes wrong while talking to the underlying key-value store
/// ends up here. "Not found" is deliberately absent: lookups return `Option`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("Store unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[error("Operation against a key holding the wrong kind of value: {key}")]
    WrongType { key: String },

    #[error("Serialization failed for {key}: {reason}")]
    Serialization { key: String, reason: String },

    #[error("Storage lock poisoned")]
    LockPoisoned,
}

/// Validation errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Invalid argument {argument}: {reason}")]
    InvalidArgument { argument: String, reason: String },

    #[error("Required field missing: {field}")]
    RequiredFieldMissing { field: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all grantvault errors.
#[derive(Debug, Clone, Error)]
pub enum VaultError {
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl VaultError {
    /// Shorthand for a [`ValidationError::InvalidArgument`].
    pub fn invalid_argument(argument: impl Into<String>, reason: impl Into<String>) -> Self {
        VaultError::Validation(ValidationError::InvalidArgument {
            argument: argument.into(),
            reason: reason.into(),
        })
    }

    /// Whether this error was caused by a bad caller-supplied argument.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            VaultError::Validation(ValidationError::InvalidArgument { .. })
                | VaultError::Validation(ValidationError::RequiredFieldMissing { .. })
        )
    }

    /// Whether this error came from the underlying store.
    pub fn is_storage(&self) -> bool {
        matches!(self, VaultError::Storage(_))
    }
}

/// Result type alias for grantvault operations.
pub type VaultResult<T> = Result<T, VaultError>;

// =============================================================================
// TESTS
// =============================================================================
