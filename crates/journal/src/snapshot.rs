//! Snapshot data structures and file naming

use chrono::{DateTime, Local, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use ledger_core::RowCounts;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Extension of the database copy
pub const DATA_EXT: &str = "db";

/// Extension of the metadata record
pub const META_EXT: &str = "json";

const NAME_TIME_FORMAT: &str = "%Y%m%d_%H%M%S";
const NAME_TIME_LEN: usize = 15;

/// Why a snapshot was taken; retention caps each origin independently
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SnapshotOrigin {
    /// Scheduler or safety snapshot
    Auto,
    /// Explicitly requested by a user
    Manual,
}

impl SnapshotOrigin {
    pub fn as_str(&self) -> &'static str {
        match self {
            SnapshotOrigin::Auto => "auto",
            SnapshotOrigin::Manual => "manual",
        }
    }
}

impl std::fmt::Display for SnapshotOrigin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parsed `<prefix>_<YYYYMMDD_HHMMSS>[_<n>]` stem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotName {
    pub stem: String,
    pub taken_at: DateTime<Utc>,
    /// Disambiguates snapshots taken within the same second
    pub sequence: u32,
}

impl SnapshotName {
    pub fn new(prefix: &str, taken_at: DateTime<Utc>, sequence: u32) -> Self {
        let mut stem = format!("{}_{}", prefix, taken_at.format(NAME_TIME_FORMAT));
        if sequence > 0 {
            stem.push_str(&format!("_{}", sequence));
        }
        Self {
            stem,
            taken_at,
            sequence,
        }
    }

    /// Parse a stem or a full file name; returns None if it does not follow the pattern
    pub fn parse(prefix: &str, name: &str) -> Option<Self> {
        let stem = name
            .strip_suffix(&format!(".{}", DATA_EXT))
            .or_else(|| name.strip_suffix(&format!(".{}", META_EXT)))
            .unwrap_or(name);

        let rest = stem.strip_prefix(prefix)?.strip_prefix('_')?;
        if rest.len() < NAME_TIME_LEN || !rest.is_char_boundary(NAME_TIME_LEN) {
            return None;
        }
        let (time_part, suffix) = rest.split_at(NAME_TIME_LEN);

        let naive = NaiveDateTime::parse_from_str(time_part, NAME_TIME_FORMAT).ok()?;
        let sequence = match suffix {
            "" => 0,
            s => s.strip_prefix('_')?.parse().ok()?,
        };

        Some(Self {
            stem: stem.to_string(),
            taken_at: Utc.from_utc_datetime(&naive),
            sequence,
        })
    }

    pub fn data_file(&self) -> String {
        format!("{}.{}", self.stem, DATA_EXT)
    }

    pub fn meta_file(&self) -> String {
        format!("{}.{}", self.stem, META_EXT)
    }
}

/// Metadata record persisted next to each snapshot copy.
///
/// Older records may miss fields or use the legacy keys `size`, `tables`,
/// `gdrive_id`, `timestamp` and `is_auto_backup`; missing values fall back to
/// safe defaults.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SnapshotMeta {
    pub filename: String,
    pub created_at: Option<String>,
    #[serde(alias = "size")]
    pub size_bytes: u64,
    #[serde(alias = "tables")]
    pub table_row_counts: BTreeMap<String, u64>,
    pub origin: Option<SnapshotOrigin>,
    #[serde(alias = "gdrive_id", skip_serializing_if = "Option::is_none")]
    pub remote_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(skip_serializing)]
    timestamp: Option<String>,
    #[serde(skip_serializing)]
    is_auto_backup: Option<bool>,
}

impl SnapshotMeta {
    pub fn new(
        filename: impl Into<String>,
        created_at: DateTime<Utc>,
        size_bytes: u64,
        counts: RowCounts,
        origin: SnapshotOrigin,
    ) -> Self {
        Self {
            filename: filename.into(),
            created_at: Some(created_at.to_rfc3339_opts(SecondsFormat::Micros, true)),
            size_bytes,
            table_row_counts: counts.to_map(),
            origin: Some(origin),
            remote_id: None,
            source: Some("local".to_string()),
            timestamp: None,
            is_auto_backup: None,
        }
    }

    pub fn origin(&self) -> SnapshotOrigin {
        match (self.origin, self.is_auto_backup) {
            (Some(origin), _) => origin,
            (None, Some(true)) => SnapshotOrigin::Auto,
            _ => SnapshotOrigin::Manual,
        }
    }

    /// Creation time from the record, if it holds a parseable one
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
            .as_deref()
            .or(self.timestamp.as_deref())
            .and_then(parse_timestamp)
    }

    pub fn row_counts(&self) -> RowCounts {
        RowCounts::from_map(&self.table_row_counts)
    }

    pub fn set_remote_id(&mut self, remote_id: impl Into<String>) {
        self.remote_id = Some(remote_id.into());
        self.source = Some("local_and_remote".to_string());
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

/// Accepts RFC 3339 and the naive local ISO-8601 form older records use
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }

    let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f"))
        .ok()?;
    Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
}

/// A valid snapshot: both files present and metadata readable
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotRef {
    /// File stem shared by the data copy and the metadata record
    pub stem: String,
    pub data_path: PathBuf,
    pub meta_path: PathBuf,
    pub created_at: DateTime<Utc>,
    pub sequence: u32,
    pub origin: SnapshotOrigin,
    pub size_bytes: u64,
    pub row_counts: RowCounts,
    pub remote_id: Option<String>,
}

impl SnapshotRef {
    /// Name of the data copy, e.g. `finance_backup_20250710_143403.db`
    pub fn filename(&self) -> String {
        format!("{}.{}", self.stem, DATA_EXT)
    }

    pub fn is_replicated(&self) -> bool {
        self.remote_id.is_some()
    }

    /// Sort key; newer compares greater
    pub fn order_key(&self) -> (DateTime<Utc>, u32) {
        (self.created_at, self.sequence)
    }
}

/// Sort snapshots newest first
pub fn sort_newest_first(snapshots: &mut [SnapshotRef]) {
    snapshots.sort_by(|a, b| b.order_key().cmp(&a.order_key()));
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Timelike;

    #[test]
    fn test_name_roundtrip() {
        let at = Utc.with_ymd_and_hms(2025, 7, 10, 14, 34, 3).unwrap();
        let name = SnapshotName::new("finance_backup", at, 0);
        assert_eq!(name.stem, "finance_backup_20250710_143403");
        assert_eq!(name.data_file(), "finance_backup_20250710_143403.db");

        let parsed = SnapshotName::parse("finance_backup", &name.data_file()).unwrap();
        assert_eq!(parsed, name);
    }

    #[test]
    fn test_name_with_sequence() {
        let at = Utc.with_ymd_and_hms(2025, 7, 10, 14, 34, 3).unwrap();
        let name = SnapshotName::new("finance_backup", at, 3);
        assert_eq!(name.meta_file(), "finance_backup_20250710_143403_3.json");

        let parsed = SnapshotName::parse("finance_backup", &name.meta_file()).unwrap();
        assert_eq!(parsed.sequence, 3);
        assert_eq!(parsed.taken_at.second(), 3);
    }

    #[test]
    fn test_parse_rejects_foreign_names() {
        assert!(SnapshotName::parse("finance_backup", "other_20250710_143403.db").is_none());
        assert!(SnapshotName::parse("finance_backup", "finance_backup_2025.db").is_none());
        assert!(SnapshotName::parse("finance_backup", "finance_backup_20251310_143403.db").is_none());
        assert!(SnapshotName::parse("finance_backup", "finance_backup_20250710_143403_x.db").is_none());
        assert!(SnapshotName::parse("finance_backup", "gdrive_restore_20250710_143403.db").is_none());
    }

    #[test]
    fn test_meta_serializes_current_fields() {
        let at = Utc.with_ymd_and_hms(2025, 7, 10, 14, 34, 3).unwrap();
        let counts = RowCounts { ledger: 12, lookup: 4 };
        let meta = SnapshotMeta::new("a.db", at, 2048, counts, SnapshotOrigin::Auto);
        let json = meta.to_json().unwrap();

        assert!(json.contains("\"size_bytes\": 2048"));
        assert!(json.contains("\"origin\": \"auto\""));
        assert!(json.contains("\"tranzactii\": 12"));
        assert!(!json.contains("remote_id"));
        assert!(!json.contains("is_auto_backup"));

        let parsed = SnapshotMeta::from_json(&json).unwrap();
        assert_eq!(parsed.created_at(), Some(at));
        assert_eq!(parsed.row_counts(), counts);
        assert_eq!(parsed.origin(), SnapshotOrigin::Auto);
    }

    #[test]
    fn test_meta_accepts_legacy_record() {
        let json = r#"{
            "filename": "finance_backup_20250710_143403.db",
            "created_at": "2025-07-10T14:34:03.123456",
            "timestamp": "2025-07-10T14:34:03.123456",
            "size": 40960,
            "tables": {"tranzactii": 9, "obiecte": 13},
            "source": "local_and_gdrive",
            "gdrive_id": "1AbC",
            "description": "Backup manual",
            "is_auto_backup": true
        }"#;
        let meta = SnapshotMeta::from_json(json).unwrap();

        assert_eq!(meta.size_bytes, 40960);
        assert_eq!(meta.row_counts(), RowCounts { ledger: 9, lookup: 13 });
        assert_eq!(meta.remote_id.as_deref(), Some("1AbC"));
        assert_eq!(meta.origin(), SnapshotOrigin::Auto);
        assert!(meta.created_at().is_some());
    }

    #[test]
    fn test_meta_missing_fields_default() {
        let meta = SnapshotMeta::from_json("{}").unwrap();
        assert_eq!(meta.origin(), SnapshotOrigin::Manual);
        assert_eq!(meta.created_at(), None);
        assert_eq!(meta.row_counts(), RowCounts::default());
        assert_eq!(meta.remote_id, None);
    }

    #[test]
    fn test_set_remote_id_marks_source() {
        let mut meta = SnapshotMeta::default();
        meta.set_remote_id("xyz");
        let json = meta.to_json().unwrap();
        assert!(json.contains("\"remote_id\": \"xyz\""));
        assert!(json.contains("local_and_remote"));
    }
}
