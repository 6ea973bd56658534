//! BLAKE3 content fingerprints over the ledger tables

use crate::db::{LEDGER_TABLE, LOOKUP_TABLE};
use crate::Result;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, TransactionBehavior};

/// Digest of the ordered logical contents of both tables
#[derive(Copy, Clone, Eq, PartialEq)]
pub struct Fingerprint(blake3::Hash);

impl Fingerprint {
    /// Full 64-character lowercase hex
    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    /// Leading 16 hex characters, for display
    pub fn short(&self) -> String {
        self.to_hex()[..16].to_string()
    }
}

impl std::fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Fingerprint({})", self.0.to_hex())
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_hex())
    }
}

/// Compute the fingerprint of both tables.
///
/// Both tables are read inside one read transaction, ordered by primary key,
/// so physical row order never affects the digest.
pub fn compute(conn: &mut Connection) -> Result<Fingerprint> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Deferred)?;
    let mut hasher = blake3::Hasher::new();

    for table in [LEDGER_TABLE, LOOKUP_TABLE] {
        hash_table(&tx, table, &mut hasher)?;
    }

    tx.finish()?;
    Ok(Fingerprint(hasher.finalize()))
}

fn hash_table(conn: &Connection, table: &str, hasher: &mut blake3::Hasher) -> Result<()> {
    hasher.update(b"table\0");
    hasher.update(table.as_bytes());
    hasher.update(b"\0");

    let mut stmt = conn.prepare(&format!("SELECT * FROM \"{table}\" ORDER BY id"))?;
    let column_count = stmt.column_count();
    let mut rows = stmt.query([])?;

    while let Some(row) = rows.next()? {
        hasher.update(b"row");
        for i in 0..column_count {
            hash_value(row.get_ref(i)?, hasher);
        }
    }

    Ok(())
}

/// Tag + length prefix every value so field boundaries are unambiguous
fn hash_value(value: ValueRef<'_>, hasher: &mut blake3::Hasher) {
    match value {
        ValueRef::Null => {
            hasher.update(&[0]);
        }
        ValueRef::Integer(i) => {
            hasher.update(&[1]);
            hasher.update(&i.to_le_bytes());
        }
        ValueRef::Real(f) => {
            hasher.update(&[2]);
            hasher.update(&f.to_bits().to_le_bytes());
        }
        ValueRef::Text(bytes) => {
            hasher.update(&[3]);
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
        ValueRef::Blob(bytes) => {
            hasher.update(&[4]);
            hasher.update(&(bytes.len() as u64).to_le_bytes());
            hasher.update(bytes);
        }
    }
}
