//! Retention policy for local snapshots

use crate::snapshot::{SnapshotOrigin, SnapshotRef};

/// Independent caps per snapshot origin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Automatic snapshots to keep (default: 5)
    pub max_auto: usize,
    /// Manual snapshots to keep (default: 200)
    pub max_manual: usize,
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            max_auto: 5,
            max_manual: 200,
        }
    }
}

impl RetentionPolicy {
    pub fn cap_for(&self, origin: SnapshotOrigin) -> usize {
        match origin {
            SnapshotOrigin::Auto => self.max_auto,
            SnapshotOrigin::Manual => self.max_manual,
        }
    }

    /// Select the snapshots that exceed their origin's cap.
    ///
    /// `snapshots` must be sorted newest first; the oldest excess of each
    /// origin is returned, in input order.
    pub fn excess<'a>(&self, snapshots: &'a [SnapshotRef]) -> Vec<&'a SnapshotRef> {
        let mut seen_auto = 0usize;
        let mut seen_manual = 0usize;
        let mut excess = Vec::new();

        for snapshot in snapshots {
            let seen = match snapshot.origin {
                SnapshotOrigin::Auto => &mut seen_auto,
                SnapshotOrigin::Manual => &mut seen_manual,
            };
            *seen += 1;
            if *seen > self.cap_for(snapshot.origin) {
                excess.push(snapshot);
            }
        }

        excess
    }
}

/// Outcome of a pruning pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PruneSummary {
    pub removed: usize,
    pub kept: usize,
    pub failed: usize,
}
