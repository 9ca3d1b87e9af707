//! Remote script execution over SSH
//!
//! A run opens exactly one connection and one session channel, feeds the
//! script to `sh -s` on stdin and captures stdout and stderr into a single
//! buffer in arrival order.

use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::script::Script;

mod exec;
mod session;

pub use session::SshExecutor;

/// Command the script is piped into
pub const REMOTE_COMMAND: &str = "sh -s";

/// How the server's host key is checked
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    /// Accept any key. Leaves connections open to interception.
    AcceptAny,

    /// Learn unknown keys into known_hosts, reject keys that changed
    #[default]
    TrustOnFirstUse,

    /// Only accept keys already present in known_hosts
    Strict,
}

/// Executor options
#[derive(Debug, Clone)]
pub struct Options {
    /// Port used when the host id has no explicit port
    pub port: u16,

    /// Bound on TCP connect, handshake and authentication
    pub connect_timeout: Duration,

    /// Bound on running the script once authenticated
    pub run_timeout: Duration,

    /// Idle connection timeout passed to the SSH client
    pub inactivity_timeout: Duration,

    /// Host key verification
    pub host_key_policy: HostKeyPolicy,

    /// known_hosts file; `None` uses the user's default
    pub known_hosts_path: Option<PathBuf>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            port: 22,
            connect_timeout: Duration::from_secs(15),
            run_timeout: Duration::from_secs(300),
            inactivity_timeout: Duration::from_secs(60),
            host_key_policy: HostKeyPolicy::default(),
            known_hosts_path: None,
        }
    }
}

/// Where and as whom a script runs
#[derive(Debug)]
pub struct RemoteTarget {
    pub host_id: String,
    pub username: String,
    pub password: SecretString,
}

impl RemoteTarget {
    /// Host and port to dial. `host_id` may be `host`, `host:port`,
    /// a bare IPv6 address or `[v6]:port`.
    pub fn endpoint(&self, default_port: u16) -> (String, u16) {
        parse_endpoint(&self.host_id, default_port)
    }
}

pub(crate) fn parse_endpoint(host_id: &str, default_port: u16) -> (String, u16) {
    let host_id = host_id.trim();
    if host_id.parse::<IpAddr>().is_ok() {
        return (host_id.to_string(), default_port);
    }
    if let Some(rest) = host_id.strip_prefix('[') {
        if let Some((host, tail)) = rest.split_once(']') {
            let port = tail
                .strip_prefix(':')
                .and_then(|p| p.parse::<u16>().ok())
                .unwrap_or(default_port);
            return (host.to_string(), port);
        }
    }
    if let Some((host, port)) = host_id.rsplit_once(':') {
        if let Ok(port) = port.parse::<u16>() {
            return (host.to_string(), port);
        }
    }
    (host_id.to_string(), default_port)
}

/// Step that was running when a timeout fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dial,
    Run,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stage::Dial => write!(f, "connecting"),
            Stage::Run => write!(f, "running the script"),
        }
    }
}

/// Why a run did not complete
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecFailure {
    #[error("dial failure: {0}")]
    Dial(String),

    #[error("session failure: {0}")]
    Session(String),

    #[error("script execution failure: {0}")]
    ScriptExecution(String),

    #[error("timeout: gave up {stage} after {}s", .after.as_secs())]
    Timeout { stage: Stage, after: Duration },
}

/// Captured output and how the run ended
#[derive(Debug, Clone)]
pub struct ExecOutcome {
    /// stdout and stderr, interleaved as received
    pub output: Vec<u8>,
    pub result: Result<(), ExecFailure>,
}

impl ExecOutcome {
    pub fn succeeded(output: Vec<u8>) -> Self {
        Self {
            output,
            result: Ok(()),
        }
    }

    pub fn failed(output: Vec<u8>, failure: ExecFailure) -> Self {
        Self {
            output,
            result: Err(failure),
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

/// Runs a synthesized script on a remote host
#[async_trait]
pub trait RemoteShell: Send + Sync {
    /// Run `script` on `target` over a single connection. Never panics on
    /// remote failure; every failure is reported in the outcome.
    async fn run_script(&self, target: &RemoteTarget, script: &Script) -> ExecOutcome;
}
