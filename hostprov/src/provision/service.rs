//! Host registration and provisioning runs

use std::io::Read;
use std::sync::Arc;

use secrecy::SecretString;
use tracing::{error, info, info_span, warn, Instrument};

use crate::errors::ProvisionError;
use crate::ingest::WorkList;
use crate::provision::limits::RunLimiter;
use crate::provision::report::ProvisioningReport;
use crate::provision::{Options, RecordPolicy};
use crate::registry::{HostRecord, Registry};
use crate::script::{confirmed_accounts, synthesize, ScriptOptions};
use crate::ssh::{RemoteShell, RemoteTarget};
use crate::utils::generate_uuid;

/// Entry point for registering hosts and provisioning accounts on them
pub struct Provisioner {
    registry: Arc<Registry>,
    shell: Arc<dyn RemoteShell>,
    limiter: RunLimiter,
    options: Options,
}

impl Provisioner {
    pub fn new(registry: Arc<Registry>, shell: Arc<dyn RemoteShell>, options: Options) -> Self {
        let limiter = RunLimiter::new(options.max_concurrent_runs, options.max_runs_per_host);
        Self {
            registry,
            shell,
            limiter,
            options,
        }
    }

    /// The registry this provisioner updates
    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Register a host, replacing any existing record for the same id.
    /// The account history of a replaced record is not kept.
    pub async fn register_host(
        &self,
        host_id: &str,
        root_username: &str,
        root_password: SecretString,
    ) -> Result<(), ProvisionError> {
        let host_id = host_id.trim();
        let root_username = root_username.trim();
        if host_id.is_empty() {
            return Err(ProvisionError::ValidationError(
                "host id is required".to_string(),
            ));
        }
        if root_username.is_empty() {
            return Err(ProvisionError::ValidationError(
                "root username is required".to_string(),
            ));
        }

        self.registry
            .put(host_id, HostRecord::new(root_username, root_password))
            .await?;
        info!("Registered host {} (login {})", host_id, root_username);
        Ok(())
    }

    /// Create the accounts listed in `csv` on `host_id`.
    ///
    /// Fails only when the host is not registered, before any connection is
    /// attempted. Every other problem is described in the returned report.
    pub async fn provision<R: Read + Send>(
        &self,
        host_id: &str,
        csv: R,
    ) -> Result<ProvisioningReport, ProvisionError> {
        let host_id = host_id.trim();
        let record = self.registry.get(host_id).await?;

        let run_id = generate_uuid();
        let span = info_span!("provision", run_id = %run_id, host = %host_id);
        self.run(run_id, host_id, record, csv).instrument(span).await
    }

    async fn run<R: Read + Send>(
        &self,
        run_id: String,
        host_id: &str,
        record: HostRecord,
        csv: R,
    ) -> Result<ProvisioningReport, ProvisionError> {
        let work_list = WorkList::from_reader(csv);
        let attempted = work_list.usernames();
        info!(
            "Accepted {} row(s), skipped {}",
            work_list.len(),
            work_list.diagnostics.len()
        );

        let script_options =
            ScriptOptions::for_login(&record.root_username, &self.options.login_shell);
        let script = synthesize(&work_list.requests, &script_options);
        let target = RemoteTarget {
            host_id: host_id.to_string(),
            username: record.root_username,
            password: record.root_password,
        };

        let outcome = {
            let _permit = self
                .limiter
                .acquire(host_id)
                .await
                .map_err(|e| ProvisionError::Internal(format!("run limiter closed: {}", e)))?;
            self.shell.run_script(&target, &script).await
        };

        match &outcome.result {
            Ok(()) => info!("Remote script finished ({} bytes of output)", outcome.output.len()),
            Err(failure) => warn!("Remote script failed: {}", failure),
        }

        let to_record = match self.options.record_policy {
            RecordPolicy::Attempted => attempted.clone(),
            RecordPolicy::Confirmed => confirmed_accounts(&outcome.output, &attempted),
        };

        let (recorded, registry_error) = if to_record.is_empty() {
            (Vec::new(), None)
        } else {
            match self.registry.append_accounts(host_id, &to_record).await {
                Ok(_) => {
                    info!("Recorded {} account(s)", to_record.len());
                    (to_record, None)
                }
                Err(e) => {
                    error!("Failed to record accounts: {}", e);
                    (Vec::new(), Some(e.to_string()))
                }
            }
        };

        Ok(ProvisioningReport {
            run_id,
            host_id: host_id.to_string(),
            batch_notice: work_list.batch_notice().map(str::to_string),
            row_diagnostics: work_list.diagnostics,
            execution_error: outcome.result.err(),
            output: outcome.output,
            attempted,
            recorded,
            registry_error,
        })
    }
}
