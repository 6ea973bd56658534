//! Fingerprint-based change detection
//!
//! Best-effort liveness only: a missed tick delays a notification by one
//! period. Nothing here gates persistence.

use crate::notifier::{ChangeEvent, Notifier};
use chrono::{DateTime, Utc};
use ledger_core::{Database, Fingerprint, Result};

/// Tracks the last observed content fingerprint of the database
pub struct ChangeDetector {
    db: Database,
    last: Option<Fingerprint>,
}

impl ChangeDetector {
    pub fn new(db: Database) -> Self {
        Self { db, last: None }
    }

    /// Record the current fingerprint as the baseline
    pub fn prime(&mut self) -> Result<Fingerprint> {
        let fingerprint = self.db.fingerprint()?;
        self.last = Some(fingerprint);
        Ok(fingerprint)
    }

    pub fn last(&self) -> Option<Fingerprint> {
        self.last
    }

    /// Compare the current fingerprint with the baseline.
    ///
    /// Returns an event if the content changed. An unprimed detector adopts
    /// the first observation as its baseline without reporting a change.
    pub fn detect(&mut self, now: DateTime<Utc>) -> Result<Option<ChangeEvent>> {
        let current = self.db.fingerprint()?;
        let previous = self.last.replace(current);

        match previous {
            Some(previous) if previous != current => {
                tracing::debug!("Content changed: {} -> {}", previous, current);
                Ok(Some(ChangeEvent {
                    timestamp: now,
                    fingerprint: current.to_hex(),
                }))
            }
            _ => Ok(None),
        }
    }

    /// One sync-loop iteration: detect and publish
    pub fn tick(&mut self, notifier: &Notifier) -> Result<Option<ChangeEvent>> {
        let event = self.detect(Utc::now())?;
        if let Some(event) = &event {
            let delivered = notifier.publish(event.clone());
            tracing::info!(
                "Database content changed, notified {} subscriber(s)",
                delivered
            );
        }
        Ok(event)
    }
}
