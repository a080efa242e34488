//! grantvault core - shared types
//!
//! Grants, filters, claims, options, clocks and errors. Every other crate in
//! the workspace depends on this one; it performs no I/O of its own.

use chrono::{DateTime, Utc};

pub mod claims;
pub mod clock;
pub mod config;
pub mod error;
pub mod grant;
pub mod telemetry;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

pub use claims::{Claim, ClaimsPrincipal, DEFAULT_ISSUER, STRING_VALUE_TYPE, SUBJECT_CLAIM};
pub use clock::{remaining, Clock, ManualClock, SystemClock};
pub use config::{normalize_prefix, StoreOptions, DEFAULT_DB};
pub use error::{ConfigError, StorageError, ValidationError, VaultError, VaultResult};
pub use grant::{Grant, GrantFilter};
pub use telemetry::{init_tracing, TelemetryConfig};
