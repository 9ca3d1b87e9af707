//! Application configuration options

use std::path::PathBuf;
use std::time::Duration;

use crate::provision;
use crate::ssh;
use crate::storage::layout::StorageLayout;
use crate::storage::settings::Settings;

/// Main application options
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Lifecycle configuration
    pub lifecycle: LifecycleOptions,

    /// Storage layout paths
    pub storage: StorageLayout,

    /// Server configuration
    pub server: ServerOptions,

    /// SSH executor options
    pub ssh: ssh::Options,

    /// Provisioning options
    pub provisioning: provision::Options,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            lifecycle: LifecycleOptions::default(),
            storage: StorageLayout::default(),
            server: ServerOptions::default(),
            ssh: ssh::Options::default(),
            provisioning: provision::Options::default(),
        }
    }
}

impl AppOptions {
    /// Build options from a settings file rooted at `layout`
    pub fn from_settings(settings: &Settings, layout: StorageLayout) -> Self {
        let known_hosts_path = settings
            .ssh
            .known_hosts_path
            .as_ref()
            .map(PathBuf::from)
            .unwrap_or_else(|| layout.known_hosts_file().path().to_path_buf());

        Self {
            lifecycle: LifecycleOptions::default(),
            server: ServerOptions {
                enabled: settings.server.enabled,
                host: settings.server.host.clone(),
                port: settings.server.port,
            },
            ssh: ssh::Options {
                port: settings.ssh.port,
                connect_timeout: Duration::from_secs(settings.ssh.connect_timeout_secs),
                run_timeout: Duration::from_secs(settings.ssh.run_timeout_secs),
                inactivity_timeout: Duration::from_secs(settings.ssh.inactivity_timeout_secs),
                host_key_policy: settings.ssh.host_key_policy,
                known_hosts_path: Some(known_hosts_path),
            },
            provisioning: provision::Options {
                record_policy: settings.provisioning.record_policy,
                login_shell: settings.provisioning.login_shell.clone(),
                max_concurrent_runs: settings.provisioning.max_concurrent_runs,
                max_runs_per_host: settings.provisioning.max_runs_per_host,
            },
            storage: layout,
        }
    }
}

/// Lifecycle options
#[derive(Debug, Clone)]
pub struct LifecycleOptions {
    /// Maximum delay for graceful shutdown
    pub max_shutdown_delay: Duration,
}

impl Default for LifecycleOptions {
    fn default() -> Self {
        Self {
            max_shutdown_delay: Duration::from_secs(30),
        }
    }
}

/// HTTP server options
#[derive(Debug, Clone)]
pub struct ServerOptions {
    /// Serve the HTTP API
    pub enabled: bool,

    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,
}

impl Default for ServerOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}
