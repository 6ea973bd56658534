//! CLI command implementations

pub mod backup;
pub mod config;
pub mod delete;
pub mod fingerprint;
pub mod import;
pub mod list;
pub mod prune;
pub mod restore;
pub mod serve;
pub mod status;
pub mod sync_remote;
