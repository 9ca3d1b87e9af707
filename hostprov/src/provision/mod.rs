//! Provisioning runs: ingest, synthesize, execute, aggregate

use serde::{Deserialize, Serialize};

pub mod limits;
pub mod report;
pub mod service;

pub use report::ProvisioningReport;
pub use service::Provisioner;

/// Which usernames are appended to a host's account list after a run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordPolicy {
    /// Only accounts whose command pair reported success
    #[default]
    Confirmed,

    /// Every accepted row, whatever happened remotely
    Attempted,
}

/// Provisioner options
#[derive(Debug, Clone)]
pub struct Options {
    pub record_policy: RecordPolicy,

    /// Login shell for created accounts
    pub login_shell: String,

    /// Runs allowed at once across all hosts
    pub max_concurrent_runs: usize,

    /// Runs allowed at once against a single host
    pub max_runs_per_host: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            record_policy: RecordPolicy::default(),
            login_shell: "/bin/bash".to_string(),
            max_concurrent_runs: 16,
            max_runs_per_host: 1,
        }
    }
}
