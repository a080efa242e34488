//! Configuration types

use crate::{ConfigError, VaultResult};
use serde::{Deserialize, Serialize};

/// Default logical database index, meaning "whatever the connection selects".
pub const DEFAULT_DB: i32 = -1;

/// Connection and key-space options for a store handle.
///
/// Immutable once handed to a `SharedConnection`; cloning is cheap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreOptions {
    /// Connection string for the key-value server. `None` when a handle is
    /// supplied directly instead of being connected lazily.
    #[serde(default)]
    pub connection_string: Option<String>,
    /// Logical database index.
    #[serde(default = "default_db")]
    pub db: i32,
    /// Raw key prefix as configured; use [`StoreOptions::key_prefix`] for the
    /// normalized form.
    #[serde(default)]
    pub key_prefix: String,
}

fn default_db() -> i32 {
    DEFAULT_DB
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            connection_string: None,
            db: DEFAULT_DB,
            key_prefix: String::new(),
        }
    }
}

impl StoreOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create StoreOptions from environment variables.
    ///
    /// # Environment Variables
    /// - `GRANTVAULT_CONNECTION_STRING`: connection string (default: unset)
    /// - `GRANTVAULT_DB`: logical database index (default: -1)
    /// - `GRANTVAULT_KEY_PREFIX`: key prefix (default: empty)
    pub fn from_env() -> VaultResult<Self> {
        let db = match std::env::var("GRANTVAULT_DB") {
            Ok(raw) => raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                field: "GRANTVAULT_DB".to_string(),
                value: raw.clone(),
                reason: "must be an integer".to_string(),
            })?,
            Err(_) => DEFAULT_DB,
        };

        let options = Self {
            connection_string: std::env::var("GRANTVAULT_CONNECTION_STRING")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            db,
            key_prefix: std::env::var("GRANTVAULT_KEY_PREFIX").unwrap_or_default(),
        };
        options.validate()?;
        Ok(options)
    }

    pub fn with_connection_string(mut self, connection_string: impl Into<String>) -> Self {
        self.connection_string = Some(connection_string.into());
        self
    }

    pub fn with_db(mut self, db: i32) -> Self {
        self.db = db;
        self
    }

    pub fn with_key_prefix(mut self, key_prefix: impl Into<String>) -> Self {
        self.key_prefix = key_prefix.into();
        self
    }

    /// Normalized key prefix: empty, or ending with `:`.
    pub fn key_prefix(&self) -> String {
        normalize_prefix(&self.key_prefix)
    }

    /// Check the options for values no store accepts.
    pub fn validate(&self) -> VaultResult<()> {
        if self.db < DEFAULT_DB {
            return Err(ConfigError::InvalidValue {
                field: "db".to_string(),
                value: self.db.to_string(),
                reason: "must be -1 or a non-negative database index".to_string(),
            }
            .into());
        }
        if let Some(conn) = &self.connection_string {
            if conn.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    field: "connection_string".to_string(),
                    value: conn.clone(),
                    reason: "must not be blank when set".to_string(),
                }
                .into());
            }
        }
        Ok(())
    }

    /// Connection string, or an error if none was configured.
    pub fn require_connection_string(&self) -> VaultResult<&str> {
        self.connection_string.as_deref().ok_or_else(|| {
            ConfigError::MissingRequired {
                field: "connection_string".to_string(),
            }
            .into()
        })
    }
}

/// Append the `:` separator to a non-empty prefix that lacks it.
pub fn normalize_prefix(prefix: &str) -> String {
    if prefix.is_empty() || prefix.ends_with(':') {
        prefix.to_string()
    } else {
        format!("{}:", prefix)
    }
}
