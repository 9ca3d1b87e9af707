//! Request and response models

use serde::{Deserialize, Serialize};

/// Health response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
}

/// Version response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionResponse {
    pub version: String,
    pub git_hash: String,
    pub build_time: String,
}

/// Error body returned with non-2xx responses
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Register (or re-register) a host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterHostRequest {
    pub host_id: String,
    pub root_username: String,
    pub root_password: String,
}

/// A registered host. The root password is never sent back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostSummary {
    pub host_id: String,
    pub root_username: String,
    pub accounts: Vec<String>,
}

/// Host list response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostListResponse {
    pub hosts: Vec<HostSummary>,
    pub total: usize,
}

/// A skipped CSV row
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowDiagnosticEntry {
    pub line: u64,
    pub reason: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
}

/// Outcome of one provisioning run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionResponse {
    pub run_id: String,
    pub host_id: String,
    pub success: bool,
    pub diagnostics: Vec<RowDiagnosticEntry>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub execution_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registry_error: Option<String>,
    pub attempted_accounts: Vec<String>,
    pub recorded_accounts: Vec<String>,
    pub output: String,
    /// The full report as plain text, in display order
    pub log: String,
}
