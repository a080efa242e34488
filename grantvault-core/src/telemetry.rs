//! Tracing subscriber setup
//!
//! Library code only emits `tracing` events; binaries and test harnesses call
//! [`init_tracing`] once to decide where they go.

use crate::{ConfigError, VaultResult};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither the config nor `RUST_LOG` provides one.
pub const DEFAULT_FILTER: &str = "grantvault_storage=info,grantvault_core=info,warn";

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// `EnvFilter` directive string.
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_FILTER.to_string(),
            json: false,
        }
    }
}

impl TelemetryConfig {
    /// Create TelemetryConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `GRANTVAULT_LOG`: filter directives (default: [`DEFAULT_FILTER`])
    /// - `GRANTVAULT_LOG_JSON`: `true`/`1` for JSON output (default: false)
    pub fn from_env() -> Self {
        Self {
            filter: std::env::var("GRANTVAULT_LOG").unwrap_or_else(|_| DEFAULT_FILTER.to_string()),
            json: std::env::var("GRANTVAULT_LOG_JSON")
                .map(|s| s == "true" || s == "1")
                .unwrap_or(false),
        }
    }

    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    fn env_filter(&self) -> VaultResult<EnvFilter> {
        EnvFilter::try_new(&self.filter).map_err(|e| {
            ConfigError::InvalidValue {
                field: "filter".to_string(),
                value: self.filter.clone(),
                reason: e.to_string(),
            }
            .into()
        })
    }
}

/// Install the global tracing subscriber.
///
/// Returns an error when the filter does not parse or a subscriber is
/// already installed.
pub fn init_tracing(config: &TelemetryConfig) -> VaultResult<()> {
    let env_filter = config.env_filter()?;
    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if config.json {
        registry.with(tracing_subscriber::fmt::layer().json()).try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    };

    result.map_err(|e| {
        ConfigError::InvalidValue {
            field: "subscriber".to_string(),
            value: "global".to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}
