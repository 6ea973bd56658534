//! Shared accessor for the ledger database file
//!
//! Components never hold a long-lived connection: each operation opens its own
//! and relies on SQLite's locking, so the file can be replaced by a restore
//! between operations.

use crate::error::IoResultExt;
use crate::fingerprint::{self, Fingerprint};
use crate::{Result, SyncError};
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Append-mostly transaction table
pub const LEDGER_TABLE: &str = "tranzactii";

/// Category/object name lookup table
pub const LOOKUP_TABLE: &str = "obiecte";

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS tranzactii (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    data TEXT NOT NULL,
    suma REAL NOT NULL,
    comentariu TEXT NOT NULL,
    operator TEXT NOT NULL,
    tip TEXT NOT NULL,
    obiect TEXT NOT NULL,
    persoana TEXT NOT NULL,
    categorie TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS obiecte (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    nume TEXT UNIQUE NOT NULL
);
";

/// Lookup names seeded into an empty lookup table
const DEFAULT_OBJECTS: &[&str] = &[
    "transport",
    "mâncare",
    "întreținere",
    "divertisment",
    "sănătate",
    "educație",
    "îmbrăcăminte",
    "tehnologie",
    "servicii",
    "taxe",
    "transfer",
    "venit",
    "salariu",
];

/// Row counts for the two tables of a database file
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCounts {
    pub ledger: u64,
    pub lookup: u64,
}

impl RowCounts {
    /// Table name -> count mapping, as persisted in snapshot metadata
    pub fn to_map(&self) -> BTreeMap<String, u64> {
        BTreeMap::from([
            (LEDGER_TABLE.to_string(), self.ledger),
            (LOOKUP_TABLE.to_string(), self.lookup),
        ])
    }

    /// Missing tables count as zero
    pub fn from_map(map: &BTreeMap<String, u64>) -> Self {
        Self {
            ledger: map.get(LEDGER_TABLE).copied().unwrap_or(0),
            lookup: map.get(LOOKUP_TABLE).copied().unwrap_or(0),
        }
    }
}

impl std::fmt::Display for RowCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}={} {}={}",
            LEDGER_TABLE, self.ledger, LOOKUP_TABLE, self.lookup
        )
    }
}

/// A ledger row, minus its id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub date: String,
    pub amount: f64,
    pub note: String,
    pub operator: String,
    pub kind: String,
    pub object: String,
    pub person: String,
    pub category: String,
}

/// Handle to the active database file
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Open a fresh read-write connection (creates the file if missing)
    pub fn open(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).at_path(parent)?;
        }
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    /// Create both tables if they do not exist. Never migrates.
    pub fn init_schema(&self) -> Result<()> {
        let conn = self.open()?;
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(())
    }

    /// Seed the lookup table with default names if it is empty.
    ///
    /// Returns the number of names inserted.
    pub fn seed_default_objects(&self) -> Result<usize> {
        let mut conn = self.open()?;
        let tx = conn.transaction()?;
        let existing: i64 =
            tx.query_row("SELECT COUNT(*) FROM obiecte", [], |row| row.get(0))?;
        if existing > 0 {
            return Ok(0);
        }

        let mut inserted = 0;
        for name in DEFAULT_OBJECTS {
            inserted += tx.execute("INSERT OR IGNORE INTO obiecte (nume) VALUES (?1)", [name])?;
        }
        tx.commit()?;

        tracing::info!("Seeded {} default lookup names", inserted);
        Ok(inserted)
    }

    pub fn row_counts(&self) -> Result<RowCounts> {
        let conn = self.open()?;
        count_rows(&conn)
    }

    pub fn ledger_count(&self) -> Result<u64> {
        Ok(self.row_counts()?.ledger)
    }

    /// True if the ledger table holds at least one record
    pub fn has_ledger_records(&self) -> Result<bool> {
        if !self.exists() {
            return Ok(false);
        }
        Ok(self.ledger_count()? > 0)
    }

    /// Compute the content fingerprint of the live file.
    ///
    /// Read-only: a missing file is an error and is never created.
    pub fn fingerprint(&self) -> Result<Fingerprint> {
        let mut conn = open_read_only(&self.path)?;
        fingerprint::compute(&mut conn)
    }

    pub fn insert_entry(&self, entry: &LedgerEntry) -> Result<i64> {
        let conn = self.open()?;
        conn.execute(
            "INSERT INTO tranzactii (data, suma, comentariu, operator, tip, obiect, persoana, categorie)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.date,
                entry.amount,
                entry.note,
                entry.operator,
                entry.kind,
                entry.object,
                entry.person,
                entry.category
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn insert_object(&self, name: &str) -> Result<bool> {
        let conn = self.open()?;
        let changed = conn.execute("INSERT OR IGNORE INTO obiecte (nume) VALUES (?1)", [name])?;
        Ok(changed > 0)
    }
}

/// Count rows in an arbitrary database file without writing to it
pub fn count_rows_at(path: &Path) -> Result<RowCounts> {
    let conn = open_read_only(path)?;
    count_rows(&conn)
}

fn open_read_only(path: &Path) -> Result<Connection> {
    if !path.is_file() {
        return Err(SyncError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "database file not found"),
        ));
    }
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )?;
    conn.busy_timeout(BUSY_TIMEOUT)?;
    Ok(conn)
}

fn count_rows(conn: &Connection) -> Result<RowCounts> {
    Ok(RowCounts {
        ledger: count_table(conn, LEDGER_TABLE)?,
        lookup: count_table(conn, LOOKUP_TABLE)?,
    })
}

fn count_table(conn: &Connection, table: &str) -> Result<u64> {
    let present: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )?;
    if present == 0 {
        return Ok(0);
    }

    let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM \"{table}\""), [], |row| {
        row.get(0)
    })?;
    Ok(count.max(0) as u64)
}
