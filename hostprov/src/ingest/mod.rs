//! CSV ingestion of account requests
//!
//! Input is `username,password[,...]` with a header row that is always
//! discarded. Bad rows are reported and skipped, never fatal.

use std::io::Read;

use secrecy::SecretString;
use thiserror::Error;
use tracing::warn;

/// Batch notice for a work-list with nothing in it
pub const NO_VALID_ENTRIES: &str = "no valid entries";

/// Longest username accepted by `useradd` on common distributions
const MAX_USERNAME_LEN: usize = 32;

/// One account to create
#[derive(Debug)]
pub struct AccountRequest {
    pub username: String,
    pub password: SecretString,
}

/// Why a row was skipped
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RowRejection {
    #[error("malformed row: {0}")]
    MalformedRow(String),

    #[error("missing field: {0}")]
    MissingField(&'static str),

    #[error("invalid username: only lowercase letters, digits, '_' and '-' are allowed")]
    InvalidUsername,

    #[error("invalid password: line breaks are not allowed")]
    InvalidPassword,

    #[error("input could not be read past this point: {0}")]
    ReadError(String),
}

/// A skipped row and the reason. Never carries the password.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowDiagnostic {
    /// 1-based line number in the uploaded file
    pub line: u64,
    pub username: Option<String>,
    pub reason: RowRejection,
}

/// Lazy iterator over the data rows of a CSV source
pub struct CsvRows<R: Read> {
    records: csv::StringRecordsIntoIter<R>,
    finished: bool,
}

impl<R: Read> CsvRows<R> {
    /// Wrap a reader. The first record is treated as the header.
    pub fn new(reader: R) -> Self {
        let records = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader)
            .into_records();
        Self {
            records,
            finished: false,
        }
    }
}

impl<R: Read> Iterator for CsvRows<R> {
    type Item = Result<AccountRequest, RowDiagnostic>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let item = match self.records.next()? {
            Ok(record) => validate(&record),
            Err(e) => {
                let line = e.position().map(|p| p.line()).unwrap_or(0);
                let reason = match e.kind() {
                    csv::ErrorKind::Io(io) => {
                        self.finished = true;
                        RowRejection::ReadError(io.to_string())
                    }
                    _ => RowRejection::MalformedRow(e.to_string()),
                };
                Err(RowDiagnostic {
                    line,
                    username: None,
                    reason,
                })
            }
        };

        if let Err(diagnostic) = &item {
            warn!("Skipped CSV line {}: {}", diagnostic.line, diagnostic.reason);
        }
        Some(item)
    }
}

fn validate(record: &csv::StringRecord) -> Result<AccountRequest, RowDiagnostic> {
    let line = record.position().map(|p| p.line()).unwrap_or(0);
    let reject = |username: Option<&str>, reason| RowDiagnostic {
        line,
        username: username.filter(|u| !u.is_empty()).map(str::to_string),
        reason,
    };

    if record.len() < 2 {
        return Err(reject(
            None,
            RowRejection::MalformedRow(format!("expected 2 fields, found {}", record.len())),
        ));
    }

    let username = record[0].trim();
    let password = record[1].trim();
    if username.is_empty() {
        return Err(reject(None, RowRejection::MissingField("username")));
    }
    if password.is_empty() {
        return Err(reject(Some(username), RowRejection::MissingField("password")));
    }
    if !is_valid_username(username) {
        return Err(reject(Some(username), RowRejection::InvalidUsername));
    }
    // chpasswd reads one `user:password` pair per line
    if password.contains(['\n', '\r']) {
        return Err(reject(Some(username), RowRejection::InvalidPassword));
    }

    Ok(AccountRequest {
        username: username.to_string(),
        password: SecretString::from(password.to_string()),
    })
}

/// Portable account name: `[a-z_][a-z0-9_-]*` with an optional trailing `$`.
///
/// Usernames are placed in the script unquoted, so anything outside this
/// set is refused here.
pub fn is_valid_username(name: &str) -> bool {
    if name.is_empty() || name.len() > MAX_USERNAME_LEN {
        return false;
    }
    let body = name.strip_suffix('$').unwrap_or(name);
    let mut chars = body.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '-')
}

/// Accepted requests and skipped rows from one upload
#[derive(Debug, Default)]
pub struct WorkList {
    pub requests: Vec<AccountRequest>,
    pub diagnostics: Vec<RowDiagnostic>,
}

impl WorkList {
    /// Read every row from `reader`
    pub fn from_reader<R: Read>(reader: R) -> Self {
        let mut work_list = WorkList::default();
        for row in CsvRows::new(reader) {
            match row {
                Ok(request) => work_list.requests.push(request),
                Err(diagnostic) => work_list.diagnostics.push(diagnostic),
            }
        }
        if work_list.is_empty() {
            warn!("CSV upload produced {}", NO_VALID_ENTRIES);
        }
        work_list
    }

    pub fn len(&self) -> usize {
        self.requests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }

    /// Accepted usernames in acceptance order
    pub fn usernames(&self) -> Vec<String> {
        self.requests.iter().map(|r| r.username.clone()).collect()
    }

    /// Batch-level notice, present only when nothing was accepted
    pub fn batch_notice(&self) -> Option<&'static str> {
        self.is_empty().then_some(NO_VALID_ENTRIES)
    }
}
