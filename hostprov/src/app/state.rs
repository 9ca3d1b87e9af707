//! Application state management

use std::sync::Arc;

use tracing::info;

use crate::app::options::AppOptions;
use crate::errors::ProvisionError;
use crate::provision::Provisioner;
use crate::registry::Registry;
use crate::ssh::{RemoteShell, SshExecutor};

/// Main application state
pub struct AppState {
    /// Host registry
    pub registry: Arc<Registry>,

    /// Provisioning entry points
    pub provisioner: Arc<Provisioner>,
}

impl AppState {
    /// Initialize application state with the SSH executor
    pub async fn init(options: &AppOptions) -> Result<Self, ProvisionError> {
        let shell: Arc<dyn RemoteShell> = Arc::new(SshExecutor::new(options.ssh.clone()));
        Self::init_with_shell(options, shell).await
    }

    /// Initialize application state with a custom remote shell
    pub async fn init_with_shell(
        options: &AppOptions,
        shell: Arc<dyn RemoteShell>,
    ) -> Result<Self, ProvisionError> {
        info!("Initializing application state...");

        options.storage.setup().await?;

        let registry = Arc::new(Registry::load(options.storage.registry_file()).await);
        let provisioner = Arc::new(Provisioner::new(
            registry.clone(),
            shell,
            options.provisioning.clone(),
        ));

        Ok(Self {
            registry,
            provisioner,
        })
    }
}
