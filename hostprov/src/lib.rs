//! hostprov library
//!
//! Registers remote hosts and provisions user accounts on them over SSH
//! from CSV account lists.

pub mod app;
pub mod errors;
pub mod filesys;
pub mod ingest;
pub mod logs;
pub mod provision;
pub mod registry;
pub mod script;
pub mod server;
pub mod ssh;
pub mod storage;
pub mod utils;
