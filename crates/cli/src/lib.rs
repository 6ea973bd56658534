//! Ledger sync daemon library - exports modules for testing

pub mod cmd;
pub mod context;
pub mod daemon;
pub mod locks;
pub mod recovery;
pub mod server;
pub mod system_config;
pub mod util;
