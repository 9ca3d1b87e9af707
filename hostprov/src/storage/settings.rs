//! Settings file management

use serde::{Deserialize, Serialize};

use crate::logs::LogLevel;
use crate::provision::RecordPolicy;
use crate::ssh::HostKeyPolicy;

/// Service settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Log level
    #[serde(default)]
    pub log_level: LogLevel,

    /// Emit logs as JSON
    #[serde(default)]
    pub log_json: bool,

    /// Also write logs to the data directory
    #[serde(default)]
    pub log_to_file: bool,

    /// HTTP server configuration
    #[serde(default)]
    pub server: ServerSettings,

    /// SSH configuration
    #[serde(default)]
    pub ssh: SshSettings,

    /// Provisioning configuration
    #[serde(default)]
    pub provisioning: ProvisioningSettings,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            log_json: false,
            log_to_file: false,
            server: ServerSettings::default(),
            ssh: SshSettings::default(),
            provisioning: ProvisioningSettings::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

/// HTTP server settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerSettings {
    /// Enable the HTTP API
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Host to bind to
    #[serde(default = "default_server_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_server_port")]
    pub port: u16,
}

fn default_server_host() -> String {
    "127.0.0.1".to_string()
}

fn default_server_port() -> u16 {
    8080
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_server_host(),
            port: default_server_port(),
        }
    }
}

/// SSH settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SshSettings {
    /// Port used when the host id has no explicit port
    #[serde(default = "default_ssh_port")]
    pub port: u16,

    /// Upper bound on connect + handshake + authentication
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Upper bound on running the synthesized script
    #[serde(default = "default_run_timeout")]
    pub run_timeout_secs: u64,

    /// Close the connection after this long without traffic
    #[serde(default = "default_inactivity_timeout")]
    pub inactivity_timeout_secs: u64,

    /// How remote host keys are verified
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,

    /// known_hosts file; defaults to the one in the data directory
    #[serde(default)]
    pub known_hosts_path: Option<String>,
}

fn default_ssh_port() -> u16 {
    22
}

fn default_connect_timeout() -> u64 {
    15
}

fn default_run_timeout() -> u64 {
    300
}

fn default_inactivity_timeout() -> u64 {
    60
}

impl Default for SshSettings {
    fn default() -> Self {
        Self {
            port: default_ssh_port(),
            connect_timeout_secs: default_connect_timeout(),
            run_timeout_secs: default_run_timeout(),
            inactivity_timeout_secs: default_inactivity_timeout(),
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_path: None,
        }
    }
}

/// Provisioning settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisioningSettings {
    /// Which usernames are recorded after a run
    #[serde(default)]
    pub record_policy: RecordPolicy,

    /// Login shell for created accounts
    #[serde(default = "default_login_shell")]
    pub login_shell: String,

    /// Runs allowed at once across all hosts
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,

    /// Runs allowed at once against a single host
    #[serde(default = "default_max_runs_per_host")]
    pub max_runs_per_host: usize,
}

fn default_login_shell() -> String {
    "/bin/bash".to_string()
}

fn default_max_concurrent_runs() -> usize {
    16
}

fn default_max_runs_per_host() -> usize {
    1
}

impl Default for ProvisioningSettings {
    fn default() -> Self {
        Self {
            record_policy: RecordPolicy::default(),
            login_shell: default_login_shell(),
            max_concurrent_runs: default_max_concurrent_runs(),
            max_runs_per_host: default_max_runs_per_host(),
        }
    }
}
