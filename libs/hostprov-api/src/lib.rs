//! HTTP API models for the hostprov service

pub mod models;
