//! Registered hosts and their provisioned accounts

pub mod record;
pub mod store;

pub use record::HostRecord;
pub use store::Registry;
