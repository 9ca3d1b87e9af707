//! Shell script synthesis for a work-list
//!
//! Each account becomes one line: `useradd` followed by `chpasswd`, wrapped
//! so the line reports its own outcome on stdout. The script is meant for
//! `sh -s` and does not stop on the first failing account.

use std::collections::HashMap;

use secrecy::ExposeSecret;

use crate::ingest::AccountRequest;

const OK_PREFIX: &str = "hostprov:ok ";
const FAIL_PREFIX: &str = "hostprov:fail ";

/// How the account commands are written
#[derive(Debug, Clone)]
pub struct ScriptOptions {
    /// Login shell passed to `useradd -s`
    pub login_shell: String,

    /// Prefix privileged commands with `sudo`
    pub use_sudo: bool,
}

impl Default for ScriptOptions {
    fn default() -> Self {
        Self {
            login_shell: "/bin/bash".to_string(),
            use_sudo: false,
        }
    }
}

impl ScriptOptions {
    /// Options for a host logged into as `login_user`
    pub fn for_login(login_user: &str, login_shell: &str) -> Self {
        Self {
            login_shell: login_shell.to_string(),
            use_sudo: login_user != "root",
        }
    }
}

/// A synthesized script. The text embeds passwords, so `Debug` only shows
/// the command count.
pub struct Script {
    text: String,
    commands: usize,
}

impl Script {
    /// Script body to feed to the remote shell
    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Number of account command pairs
    pub fn command_count(&self) -> usize {
        self.commands
    }

    pub fn is_empty(&self) -> bool {
        self.commands == 0
    }
}

impl std::fmt::Debug for Script {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Script")
            .field("commands", &self.commands)
            .finish_non_exhaustive()
    }
}

/// Build the script for `requests`, in order. An empty slice gives an
/// empty script.
pub fn synthesize(requests: &[AccountRequest], options: &ScriptOptions) -> Script {
    let sudo = if options.use_sudo { "sudo " } else { "" };
    let mut text = String::new();

    for request in requests {
        let user = &request.username;
        let credential = format!("{}:{}", user, request.password.expose_secret());
        text.push_str(&format!(
            "if {sudo}useradd -m -s {shell} {user} && printf '%s\\n' {credential} | {sudo}chpasswd; \
             then echo '{ok}{user}'; else echo '{fail}{user}'; fi\n",
            shell = single_quote(&options.login_shell),
            credential = single_quote(&credential),
            ok = OK_PREFIX,
            fail = FAIL_PREFIX,
        ));
    }

    Script {
        text,
        commands: requests.len(),
    }
}

/// Wrap `value` in single quotes, replacing each embedded `'` with `'\''`
pub fn single_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// Status line printed when an account was created and its password set
pub fn ok_marker(username: &str) -> String {
    format!("{}{}", OK_PREFIX, username)
}

/// Status line printed when either command failed for an account
pub fn fail_marker(username: &str) -> String {
    format!("{}{}", FAIL_PREFIX, username)
}

/// Usernames from `attempted` confirmed by a success line in `output`, in
/// `attempted` order. Each success line confirms at most one attempt, so a
/// name repeated in the batch is only counted as often as it succeeded.
pub fn confirmed_accounts(output: &[u8], attempted: &[String]) -> Vec<String> {
    let text = String::from_utf8_lossy(output);
    let mut confirmations: HashMap<&str, usize> = HashMap::new();
    for name in text
        .lines()
        .filter_map(|line| line.trim().strip_prefix(OK_PREFIX))
    {
        *confirmations.entry(name).or_default() += 1;
    }

    attempted
        .iter()
        .filter(|name| match confirmations.get_mut(name.as_str()) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        })
        .cloned()
        .collect()
}
