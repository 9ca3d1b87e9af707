//! Server state

use std::sync::Arc;

use crate::provision::Provisioner;

/// Server state shared across handlers
pub struct ServerState {
    pub provisioner: Arc<Provisioner>,
}

impl ServerState {
    pub fn new(provisioner: Arc<Provisioner>) -> Self {
        Self { provisioner }
    }
}
