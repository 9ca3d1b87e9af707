//! Provisioning report

use std::borrow::Cow;

use hostprov_api::models::{ProvisionResponse, RowDiagnosticEntry};

use crate::ingest::RowDiagnostic;
use crate::ssh::ExecFailure;

/// Everything a caller learns about one provisioning run
#[derive(Debug, Clone)]
pub struct ProvisioningReport {
    pub run_id: String,
    pub host_id: String,

    /// Skipped rows, in input order
    pub row_diagnostics: Vec<RowDiagnostic>,

    /// Set when the work-list was empty
    pub batch_notice: Option<String>,

    /// Set when the remote step failed
    pub execution_error: Option<ExecFailure>,

    /// Combined remote stdout and stderr, verbatim
    pub output: Vec<u8>,

    /// Usernames sent to the host
    pub attempted: Vec<String>,

    /// Usernames appended to the registry
    pub recorded: Vec<String>,

    /// Set when the registry could not be updated
    pub registry_error: Option<String>,
}

/// One block of the rendered report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportEntry {
    Skipped(String),
    Notice(String),
    Failure(String),
    Output(String),
    RegistryFailure(String),
}

impl ReportEntry {
    pub fn text(&self) -> &str {
        match self {
            ReportEntry::Skipped(s)
            | ReportEntry::Notice(s)
            | ReportEntry::Failure(s)
            | ReportEntry::Output(s)
            | ReportEntry::RegistryFailure(s) => s,
        }
    }
}

impl ProvisioningReport {
    /// True when the script ran cleanly and the registry was updated
    pub fn is_success(&self) -> bool {
        self.execution_error.is_none() && self.registry_error.is_none()
    }

    /// Captured output as text, with invalid UTF-8 replaced
    pub fn output_text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.output)
    }

    /// Report blocks in display order: skipped rows, empty-batch notice,
    /// execution failure, captured output, registry failure
    pub fn entries(&self) -> Vec<ReportEntry> {
        let mut entries: Vec<ReportEntry> = self
            .row_diagnostics
            .iter()
            .map(|d| ReportEntry::Skipped(describe_row(d)))
            .collect();

        if let Some(notice) = &self.batch_notice {
            entries.push(ReportEntry::Notice(format!("Notice: {}", notice)));
        }
        if let Some(error) = &self.execution_error {
            entries.push(ReportEntry::Failure(format!(
                "Remote script execution failed: {}",
                error
            )));
        }
        if !self.output.is_empty() {
            entries.push(ReportEntry::Output(self.output_text().into_owned()));
        }
        if let Some(error) = &self.registry_error {
            entries.push(ReportEntry::RegistryFailure(format!(
                "Registry update failed: {}",
                error
            )));
        }
        entries
    }

    /// The report as plain text
    pub fn render(&self) -> String {
        let mut text = String::new();
        for entry in self.entries() {
            text.push_str(entry.text());
            if !text.ends_with('\n') {
                text.push('\n');
            }
        }
        text
    }

    /// API response for this report
    pub fn to_response(&self) -> ProvisionResponse {
        ProvisionResponse {
            run_id: self.run_id.clone(),
            host_id: self.host_id.clone(),
            success: self.is_success(),
            diagnostics: self
                .row_diagnostics
                .iter()
                .map(|d| RowDiagnosticEntry {
                    line: d.line,
                    reason: d.reason.to_string(),
                    username: d.username.clone(),
                })
                .collect(),
            notice: self.batch_notice.clone(),
            execution_error: self.execution_error.as_ref().map(ToString::to_string),
            registry_error: self.registry_error.clone(),
            attempted_accounts: self.attempted.clone(),
            recorded_accounts: self.recorded.clone(),
            output: self.output_text().into_owned(),
            log: self.render(),
        }
    }
}

fn describe_row(diagnostic: &RowDiagnostic) -> String {
    match &diagnostic.username {
        Some(username) => format!(
            "Skipped line {} ({}): {}",
            diagnostic.line, username, diagnostic.reason
        ),
        None => format!("Skipped line {}: {}", diagnostic.line, diagnostic.reason),
    }
}
