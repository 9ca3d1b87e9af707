//! Connection setup and host key verification

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::anyhow;
use async_trait::async_trait;
use russh::client::{AuthResult, Config, Handle};
use russh::keys::known_hosts::{learn_known_hosts, learn_known_hosts_path};
use russh::keys::ssh_key::PublicKey;
use russh::Disconnect;
use secrecy::ExposeSecret;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::script::Script;
use crate::ssh::exec::run_on;
use crate::ssh::{
    ExecFailure, ExecOutcome, HostKeyPolicy, Options, RemoteShell, RemoteTarget, Stage,
};

pub(super) struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts_path: Option<PathBuf>,
}

impl russh::client::Handler for ClientHandler {
    type Error = anyhow::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        verify_server_key(
            &self.host,
            self.port,
            server_public_key,
            self.policy,
            self.known_hosts_path.as_deref(),
        )
    }
}

fn check_known_hosts_for(
    host: &str,
    port: u16,
    key: &PublicKey,
    known_hosts_path: Option<&Path>,
) -> Result<bool, russh::keys::Error> {
    match known_hosts_path {
        Some(path) => russh::keys::check_known_hosts_path(host, port, key, path),
        None => russh::keys::check_known_hosts(host, port, key),
    }
}

fn learn_known_hosts_for(
    host: &str,
    port: u16,
    key: &PublicKey,
    known_hosts_path: Option<&Path>,
) -> Result<(), russh::keys::Error> {
    match known_hosts_path {
        Some(path) => learn_known_hosts_path(host, port, key, path),
        None => learn_known_hosts(host, port, key),
    }
}

fn verify_server_key(
    host: &str,
    port: u16,
    key: &PublicKey,
    policy: HostKeyPolicy,
    known_hosts_path: Option<&Path>,
) -> Result<bool, anyhow::Error> {
    if policy == HostKeyPolicy::AcceptAny {
        warn!("host key verification is disabled, accepting key for {host}:{port} unchecked");
        return Ok(true);
    }

    match check_known_hosts_for(host, port, key, known_hosts_path) {
        Ok(true) => return Ok(true),
        Ok(false) => {}
        Err(err) => {
            warn!("server key validation failed for {host}:{port}: {err}");
            return Err(anyhow!(
                "server key validation failed for {host}:{port}: {err}"
            ));
        }
    }

    if policy == HostKeyPolicy::Strict {
        warn!("server key for {host}:{port} is not present in known_hosts; rejecting");
        return Err(anyhow!(
            "server key for {host}:{port} is not present in known_hosts"
        ));
    }

    info!("server key for {host}:{port} is not present in known_hosts; learning");
    learn_known_hosts_for(host, port, key, known_hosts_path).map_err(|err| {
        warn!("failed to learn server key for {host}:{port}: {err}");
        anyhow!("failed to learn server key for {host}:{port}: {err}")
    })?;
    Ok(true)
}

/// `RemoteShell` backed by russh with password authentication
pub struct SshExecutor {
    options: Options,
    config: Arc<Config>,
}

impl SshExecutor {
    pub fn new(options: Options) -> Self {
        let config = Config {
            inactivity_timeout: Some(options.inactivity_timeout),
            ..Default::default()
        };
        Self {
            options,
            config: Arc::new(config),
        }
    }

    async fn dial(
        &self,
        host: &str,
        port: u16,
        target: &RemoteTarget,
    ) -> Result<Handle<ClientHandler>, ExecFailure> {
        let handler = ClientHandler {
            host: host.to_string(),
            port,
            policy: self.options.host_key_policy,
            known_hosts_path: self.options.known_hosts_path.clone(),
        };

        let mut handle = russh::client::connect(self.config.clone(), (host, port), handler)
            .await
            .map_err(|e| ExecFailure::Dial(format!("connect to {host}:{port} failed: {e:#}")))?;

        let auth = handle
            .authenticate_password(
                target.username.clone(),
                target.password.expose_secret().to_string(),
            )
            .await
            .map_err(|e| ExecFailure::Dial(format!("authentication with {host}:{port} failed: {e}")))?;

        match auth {
            AuthResult::Success => Ok(handle),
            AuthResult::Failure { .. } => {
                // Drop closes the connection.
                Err(ExecFailure::Dial(format!(
                    "authentication rejected for {}@{host}:{port}",
                    target.username
                )))
            }
        }
    }
}

#[async_trait]
impl RemoteShell for SshExecutor {
    async fn run_script(&self, target: &RemoteTarget, script: &Script) -> ExecOutcome {
        let (host, port) = target.endpoint(self.options.port);
        let mut output = Vec::new();

        info!(
            "Connecting to {}@{}:{} to run {} command(s)",
            target.username,
            host,
            port,
            script.command_count()
        );

        let handle = match timeout(self.options.connect_timeout, self.dial(&host, port, target)).await
        {
            Ok(Ok(handle)) => handle,
            Ok(Err(failure)) => return ExecOutcome::failed(output, failure),
            Err(_) => {
                return ExecOutcome::failed(
                    output,
                    ExecFailure::Timeout {
                        stage: Stage::Dial,
                        after: self.options.connect_timeout,
                    },
                )
            }
        };

        let result = match timeout(self.options.run_timeout, run_on(&handle, script, &mut output))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(ExecFailure::Timeout {
                stage: Stage::Run,
                after: self.options.run_timeout,
            }),
        };

        if let Err(e) = handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!("disconnect from {}:{} failed: {}", host, port, e);
        }

        ExecOutcome { output, result }
    }
}
