//! Lazily established, shared store connection.
//!
//! A [`SharedConnection`] is created once per process and handed to every
//! component that needs the store. The first caller of
//! [`SharedConnection::store`] establishes the connection; concurrent first
//! callers wait on that one attempt instead of racing their own. A failed
//! attempt is not cached, so the next caller retries.

use std::sync::Arc;

use async_trait::async_trait;
use grantvault_core::{StoreOptions, VaultResult};
use tokio::sync::OnceCell;

use crate::kv::KeyValueStore;
use crate::memory::InMemoryKeyValueStore;

/// Opens a store handle from connection options.
#[async_trait]
pub trait StoreConnector: Send + Sync {
    async fn connect(&self, options: &StoreOptions) -> VaultResult<Arc<dyn KeyValueStore>>;
}

/// Connector producing a fresh [`InMemoryKeyValueStore`].
///
/// The connection string and database index are not interpreted.
#[derive(Debug, Clone, Copy, Default)]
pub struct InMemoryConnector;

#[async_trait]
impl StoreConnector for InMemoryConnector {
    async fn connect(&self, options: &StoreOptions) -> VaultResult<Arc<dyn KeyValueStore>> {
        options.validate()?;
        tracing::debug!(db = options.db, "opening in-memory store");
        Ok(Arc::new(InMemoryKeyValueStore::new()))
    }
}

/// One store handle shared by all consumers.
pub struct SharedConnection {
    options: StoreOptions,
    connector: Arc<dyn StoreConnector>,
    store: OnceCell<Arc<dyn KeyValueStore>>,
}

impl std::fmt::Debug for SharedConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedConnection")
            .field("options", &self.options)
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}

impl SharedConnection {
    /// Connection that will be opened by `connector` on first use.
    pub fn new(options: StoreOptions, connector: Arc<dyn StoreConnector>) -> Self {
        Self {
            options,
            connector,
            store: OnceCell::new(),
        }
    }

    /// Connection wrapping an already open store handle.
    pub fn with_store(options: StoreOptions, store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            options,
            connector: Arc::new(InMemoryConnector),
            store: OnceCell::new_with(Some(store)),
        }
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    pub fn is_connected(&self) -> bool {
        self.store.initialized()
    }

    /// The shared store handle, connecting on first call.
    pub async fn store(&self) -> VaultResult<Arc<dyn KeyValueStore>> {
        let store = self
            .store
            .get_or_try_init(|| async {
                tracing::info!(db = self.options.db, "connecting to store");
                self.connector.connect(&self.options).await.inspect_err(|e| {
                    tracing::error!(error = %e, "failed to connect to store");
                })
            })
            .await?;
        Ok(Arc::clone(store))
    }
}
