//! Shared state handed to every handler.

use std::sync::Arc;

use forum_extensions::{
    ExtensionConfigStore, ExtensionRegistry, IntegrationRegistry, LifecycleManager, ManifestStore,
};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;

use crate::config::ServerConfig;
use crate::error::{Error, Result};

/// Build the extension stack described by `config`.
///
/// Creates the extensions root if it does not exist yet.
pub fn open_lifecycle(config: &ServerConfig) -> Result<LifecycleManager> {
    let root = &config.extensions.root;
    std::fs::create_dir_all(root).map_err(|e| forum_extensions::Error::io(root, e))?;

    let store = Arc::new(
        ManifestStore::new(root.clone()).with_aliases(config.extensions.aliases.clone()),
    );
    let registry = Arc::new(ExtensionRegistry::new(Arc::clone(&store)));
    let configs = Arc::new(ExtensionConfigStore::new(
        config.extensions.configs_dir.clone(),
        store,
    ));
    Ok(LifecycleManager::new(
        registry,
        configs,
        config.lifecycle_options(),
    ))
}

#[derive(Debug)]
pub struct AppState {
    pub lifecycle: Arc<LifecycleManager>,
    pub integrations: Arc<IntegrationRegistry>,
    /// Bearer token for admin routes. `None` disables auth.
    pub admin_token: Option<String>,
    pub max_upload_bytes: usize,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        let lifecycle = Arc::new(open_lifecycle(config)?);
        let integrations = Arc::new(IntegrationRegistry::new());
        integrations.sync(&lifecycle.registry().entries()?);

        Ok(Self {
            lifecycle,
            integrations,
            admin_token: config.server.admin_token.clone(),
            max_upload_bytes: config.server.max_upload_bytes,
        })
    }

    /// Keep the integration registry in step with lifecycle events.
    ///
    /// A lagging receiver falls back to a full resync from the registry
    /// listing. The task ends when the lifecycle manager is dropped.
    pub fn spawn_integration_sync(&self) -> JoinHandle<()> {
        let mut events = self.lifecycle.subscribe();
        let integrations = Arc::clone(&self.integrations);
        let registry = Arc::clone(self.lifecycle.registry());

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => integrations.apply(&event),
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Lifecycle events lagged, resyncing integrations");
                        let registry = Arc::clone(&registry);
                        match tokio::task::spawn_blocking(move || registry.entries()).await {
                            Ok(Ok(entries)) => integrations.sync(&entries),
                            Ok(Err(e)) => {
                                tracing::error!(error = %e, "Failed to list extensions for resync");
                            }
                            Err(e) => tracing::error!(error = %e, "Resync task failed"),
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    /// Run a blocking lifecycle or store operation off the async runtime.
    pub async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&LifecycleManager) -> forum_extensions::Result<T> + Send + 'static,
    {
        let lifecycle = Arc::clone(&self.lifecycle);
        let outcome = tokio::task::spawn_blocking(move || f(lifecycle.as_ref())).await?;
        outcome.map_err(Error::from)
    }
}
