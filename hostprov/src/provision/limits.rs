//! Concurrency limits for provisioning runs

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use tokio::sync::{AcquireError, OwnedSemaphorePermit, Semaphore};

/// Caps concurrent runs globally and per host
pub struct RunLimiter {
    global: Arc<Semaphore>,
    per_host_limit: usize,
    per_host: Mutex<HashMap<String, Arc<Semaphore>>>,
}

/// Held for the duration of one remote execution
pub struct RunPermit {
    _host: OwnedSemaphorePermit,
    _global: OwnedSemaphorePermit,
}

impl RunLimiter {
    pub fn new(max_concurrent_runs: usize, max_runs_per_host: usize) -> Self {
        Self {
            global: Arc::new(Semaphore::new(max_concurrent_runs.max(1))),
            per_host_limit: max_runs_per_host.max(1),
            per_host: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for a slot on `host_id`, then a global slot
    pub async fn acquire(&self, host_id: &str) -> Result<RunPermit, AcquireError> {
        let host_semaphore = {
            let mut per_host = self.per_host.lock().unwrap_or_else(|e| e.into_inner());
            per_host
                .entry(host_id.to_string())
                .or_insert_with(|| Arc::new(Semaphore::new(self.per_host_limit)))
                .clone()
        };

        let host = host_semaphore.acquire_owned().await?;
        let global = self.global.clone().acquire_owned().await?;
        Ok(RunPermit {
            _host: host,
            _global: global,
        })
    }
}
