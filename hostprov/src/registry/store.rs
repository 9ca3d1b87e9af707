//! Durable host registry

use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::errors::ProvisionError;
use crate::filesys::file::File;
use crate::registry::record::HostRecord;

type HostMap = BTreeMap<String, HostRecord>;

/// Registry of hosts keyed by host id, written through to a JSON file.
///
/// Every mutation holds the lock until the new state is on disk. A failed
/// save rolls the in-memory change back before the error is returned.
pub struct Registry {
    file: File,
    hosts: Mutex<HostMap>,
}

impl Registry {
    /// Create an empty registry backed by `file` without reading it
    pub fn empty(file: File) -> Self {
        Self {
            file,
            hosts: Mutex::new(HostMap::new()),
        }
    }

    /// Load the registry from `file`.
    ///
    /// A missing or unreadable file yields an empty registry. A file that
    /// does not parse is moved aside first so the next save cannot
    /// overwrite it.
    pub async fn load(file: File) -> Self {
        let hosts = match file.read_json::<HostMap>().await {
            Ok(hosts) => {
                info!(
                    "Loaded {} host(s) from {}",
                    hosts.len(),
                    file.path().display()
                );
                hosts
            }
            Err(ProvisionError::IoError(e)) if e.kind() == ErrorKind::NotFound => {
                info!(
                    "No registry at {}, starting empty",
                    file.path().display()
                );
                HostMap::new()
            }
            Err(ProvisionError::JsonError(e)) => {
                warn!(
                    "Registry at {} is corrupt ({}), starting empty",
                    file.path().display(),
                    e
                );
                quarantine(&file).await;
                HostMap::new()
            }
            Err(e) => {
                warn!(
                    "Unable to read registry at {} ({}), starting empty",
                    file.path().display(),
                    e
                );
                HostMap::new()
            }
        };

        Self {
            file,
            hosts: Mutex::new(hosts),
        }
    }

    /// Get the record for a host
    pub async fn get(&self, host_id: &str) -> Result<HostRecord, ProvisionError> {
        let hosts = self.hosts.lock().await;
        hosts
            .get(host_id)
            .cloned()
            .ok_or_else(|| ProvisionError::HostNotRegistered(host_id.to_string()))
    }

    /// All hosts ordered by host id
    pub async fn list(&self) -> Vec<(String, HostRecord)> {
        let hosts = self.hosts.lock().await;
        hosts
            .iter()
            .map(|(id, record)| (id.clone(), record.clone()))
            .collect()
    }

    /// Insert or replace a host record, then save
    pub async fn put(&self, host_id: &str, record: HostRecord) -> Result<(), ProvisionError> {
        let mut hosts = self.hosts.lock().await;
        let previous = hosts.insert(host_id.to_string(), record);

        if let Err(e) = self.persist(&hosts).await {
            match previous {
                Some(previous) => hosts.insert(host_id.to_string(), previous),
                None => hosts.remove(host_id),
            };
            return Err(e);
        }

        debug!("Stored host {}", host_id);
        Ok(())
    }

    /// Append usernames to a host's account list in order, then save
    pub async fn append_accounts(
        &self,
        host_id: &str,
        names: &[String],
    ) -> Result<HostRecord, ProvisionError> {
        let mut hosts = self.hosts.lock().await;
        let record = hosts
            .get_mut(host_id)
            .ok_or_else(|| ProvisionError::HostNotRegistered(host_id.to_string()))?;
        let previous_len = record.accounts.len();
        record.accounts.extend(names.iter().cloned());

        if let Err(e) = self.persist(&hosts).await {
            if let Some(record) = hosts.get_mut(host_id) {
                record.accounts.truncate(previous_len);
            }
            return Err(e);
        }

        debug!("Recorded {} account(s) on {}", names.len(), host_id);
        hosts
            .get(host_id)
            .cloned()
            .ok_or_else(|| ProvisionError::HostNotRegistered(host_id.to_string()))
    }

    /// Serialize the whole registry to disk
    pub async fn save(&self) -> Result<(), ProvisionError> {
        let hosts = self.hosts.lock().await;
        self.persist(&hosts).await
    }

    // The file holds root passwords; `write_json` creates it owner-only.
    async fn persist(&self, hosts: &HostMap) -> Result<(), ProvisionError> {
        self.file.write_json(hosts).await.map_err(|e| {
            ProvisionError::StorageError(format!(
                "failed to save registry to {}: {}",
                self.file.path().display(),
                e
            ))
        })
    }
}

async fn quarantine(file: &File) {
    let stamp = chrono::Utc::now().format("%Y%m%d%H%M%S");
    let mut target = PathBuf::from(file.path());
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "registry.json".to_string());
    target.set_file_name(format!("{}.corrupt-{}", name, stamp));

    match file.rename_to(&target).await {
        Ok(()) => warn!("Moved corrupt registry to {}", target.display()),
        Err(e) => warn!("Unable to move corrupt registry aside: {}", e),
    }
}
