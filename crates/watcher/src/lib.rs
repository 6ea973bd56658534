//! Change notification for the ledger database
//!
//! This crate provides:
//! - [`ChangeDetector`]: compares content fingerprints between ticks
//! - [`Notifier`]: broadcast fan-out of change events to subscribers

pub mod detector;
pub mod notifier;

pub use detector::ChangeDetector;
pub use notifier::{ChangeEvent, Notifier, DEFAULT_CAPACITY};
