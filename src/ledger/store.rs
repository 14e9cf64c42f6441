//! SQLite Ledger Store
//!
//! Durable shadow of the in-memory commitment tree plus the nullifier set and
//! per-chain scan cursors. Uses connection pooling via r2d2 for concurrent
//! access. Leaf and nullifier inserts are idempotent so replayed observations
//! never fail; nullifier deletion exists only to roll back optimistic
//! marking.

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use thiserror::Error;

use crate::types::{Field, KnownRoot, Leaf};

/// Ledger errors. Storage failures are fatal for the current request; callers
/// roll back and surface a retryable error.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("connection error: {0}")]
    Connection(String),

    #[error("database error: {0}")]
    Database(String),
}

pub type LedgerResult<T> = Result<T, LedgerError>;

fn db_err(e: rusqlite::Error) -> LedgerError {
    LedgerError::Database(e.to_string())
}

/// SQLite-backed ledger with four logical tables: leaves, roots, nullifiers,
/// scan_cursors.
pub struct LedgerStore {
    pool: Pool<SqliteConnectionManager>,
}

impl LedgerStore {
    /// Open (or create) the database at the given path and run migrations.
    pub fn open<P: AsRef<Path>>(db_path: P) -> LedgerResult<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent).ok();
        }

        let manager = SqliteConnectionManager::file(db_path);
        let pool = Pool::builder()
            .max_size(10)
            .build(manager)
            .map_err(|e| LedgerError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;
        Ok(store)
    }

    /// Create an in-memory ledger (for testing).
    pub fn in_memory() -> LedgerResult<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(|e| LedgerError::Connection(e.to_string()))?;

        let store = Self { pool };
        store.run_migrations()?;
        Ok(store)
    }

    fn conn(&self) -> LedgerResult<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| LedgerError::Connection(e.to_string()))
    }

    fn run_migrations(&self) -> LedgerResult<()> {
        let conn = self.conn()?;

        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA busy_timeout = 5000;

            CREATE TABLE IF NOT EXISTS leaves (
                leaf_index INTEGER PRIMARY KEY,
                commitment TEXT NOT NULL UNIQUE,
                chain_id INTEGER NOT NULL,
                block_number INTEGER NOT NULL,
                tx_index INTEGER NOT NULL,
                log_index INTEGER NOT NULL,
                asset TEXT NOT NULL,
                amount TEXT NOT NULL,
                observed_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS roots (
                root_index INTEGER PRIMARY KEY AUTOINCREMENT,
                root TEXT NOT NULL UNIQUE,
                tx_hash TEXT,
                recorded_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS nullifiers (
                nullifier TEXT PRIMARY KEY,
                tx_hash TEXT,
                spent_at INTEGER NOT NULL
            );

            CREATE TABLE IF NOT EXISTS scan_cursors (
                chain_id INTEGER PRIMARY KEY,
                last_block INTEGER NOT NULL
            );
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    // =========================================================================
    // Leaves
    // =========================================================================

    /// Insert a leaf; collisions on leaf_index or commitment are absorbed.
    pub fn insert_leaf(&self, leaf: &Leaf) -> LedgerResult<()> {
        insert_leaf_on(&*self.conn()?, leaf)
    }

    pub fn get_leaf_by_commitment(&self, commitment: &Field) -> LedgerResult<Option<Leaf>> {
        self.conn()?
            .query_row(
                "SELECT * FROM leaves WHERE commitment = ?1",
                params![commitment.to_hex()],
                row_to_leaf,
            )
            .optional()
            .map_err(db_err)
    }

    pub fn get_leaf_by_index(&self, leaf_index: u64) -> LedgerResult<Option<Leaf>> {
        self.conn()?
            .query_row(
                "SELECT * FROM leaves WHERE leaf_index = ?1",
                params![leaf_index as i64],
                row_to_leaf,
            )
            .optional()
            .map_err(db_err)
    }

    /// All leaves in leaf-index order, the replay sequence for boot recovery.
    pub fn get_all_leaves_ordered(&self) -> LedgerResult<Vec<Leaf>> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT * FROM leaves ORDER BY leaf_index ASC")
            .map_err(db_err)?;

        let leaves = stmt
            .query_map([], row_to_leaf)
            .map_err(db_err)?
            .collect::<Result<Vec<_>, _>>()
            .map_err(db_err)?;

        Ok(leaves)
    }

    pub fn leaf_count(&self) -> LedgerResult<u64> {
        let count: i64 = self
            .conn()?
            .query_row("SELECT COUNT(*) FROM leaves", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count as u64)
    }

    // =========================================================================
    // Roots
    // =========================================================================

    /// Record a root; a repeated root keeps its original ordinal.
    pub fn insert_root(&self, root: &Field, tx_hash: Option<&str>) -> LedgerResult<()> {
        insert_root_on(&*self.conn()?, root, tx_hash)
    }

    pub fn latest_root(&self) -> LedgerResult<Option<KnownRoot>> {
        self.conn()?
            .query_row(
                "SELECT root_index, root, tx_hash, recorded_at FROM roots \
                 ORDER BY root_index DESC LIMIT 1",
                [],
                row_to_root,
            )
            .optional()
            .map_err(db_err)
    }

    pub fn is_known_root(&self, root: &Field) -> LedgerResult<bool> {
        let found: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT root_index FROM roots WHERE root = ?1",
                params![root.to_hex()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(found.is_some())
    }

    // =========================================================================
    // Nullifiers
    // =========================================================================

    pub fn insert_nullifier(&self, nullifier: &Field, tx_hash: Option<&str>) -> LedgerResult<()> {
        insert_nullifier_on(&*self.conn()?, nullifier, tx_hash)
    }

    pub fn is_nullifier_spent(&self, nullifier: &Field) -> LedgerResult<bool> {
        let found: Option<String> = self
            .conn()?
            .query_row(
                "SELECT nullifier FROM nullifiers WHERE nullifier = ?1",
                params![nullifier.to_hex()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(found.is_some())
    }

    /// Remove a nullifier; only used to roll back optimistic marking.
    pub fn delete_nullifier(&self, nullifier: &Field) -> LedgerResult<()> {
        delete_nullifier_on(&*self.conn()?, nullifier)
    }

    /// Attach the spending transaction to an already-marked nullifier.
    pub fn set_nullifier_tx_hash(&self, nullifier: &Field, tx_hash: &str) -> LedgerResult<()> {
        self.conn()?
            .execute(
                "UPDATE nullifiers SET tx_hash = ?2 WHERE nullifier = ?1",
                params![nullifier.to_hex(), tx_hash],
            )
            .map_err(db_err)?;
        Ok(())
    }

    // =========================================================================
    // Scan cursors
    // =========================================================================

    /// Last fully processed block for a chain, defaulting to 0.
    pub fn get_scan_cursor(&self, chain_id: u64) -> LedgerResult<u64> {
        let block: Option<i64> = self
            .conn()?
            .query_row(
                "SELECT last_block FROM scan_cursors WHERE chain_id = ?1",
                params![chain_id as i64],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        Ok(block.unwrap_or(0) as u64)
    }

    pub fn set_scan_cursor(&self, chain_id: u64, block: u64) -> LedgerResult<()> {
        set_scan_cursor_on(&*self.conn()?, chain_id, block)
    }

    // =========================================================================
    // Transactions
    // =========================================================================

    /// Run `f` inside an immediate-mode transaction. The transaction commits
    /// when `f` returns Ok and rolls back when it returns Err.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&LedgerTx<'_>) -> LedgerResult<T>,
    ) -> LedgerResult<T> {
        let mut conn = self.conn()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(db_err)?;

        let out = f(&LedgerTx { conn: &tx })?;

        tx.commit().map_err(db_err)?;
        Ok(out)
    }
}

/// Handle to an open ledger transaction. Dropped without commit on error,
/// which rolls everything back.
pub struct LedgerTx<'a> {
    conn: &'a Connection,
}

impl LedgerTx<'_> {
    pub fn insert_leaf(&self, leaf: &Leaf) -> LedgerResult<()> {
        insert_leaf_on(self.conn, leaf)
    }

    pub fn insert_nullifier(&self, nullifier: &Field, tx_hash: Option<&str>) -> LedgerResult<()> {
        insert_nullifier_on(self.conn, nullifier, tx_hash)
    }

    pub fn delete_nullifier(&self, nullifier: &Field) -> LedgerResult<()> {
        delete_nullifier_on(self.conn, nullifier)
    }

    pub fn insert_root(&self, root: &Field, tx_hash: Option<&str>) -> LedgerResult<()> {
        insert_root_on(self.conn, root, tx_hash)
    }

    pub fn set_scan_cursor(&self, chain_id: u64, block: u64) -> LedgerResult<()> {
        set_scan_cursor_on(self.conn, chain_id, block)
    }
}

// =============================================================================
// Shared row helpers
// =============================================================================

fn insert_leaf_on(conn: &Connection, leaf: &Leaf) -> LedgerResult<()> {
    conn.execute(
        r#"
        INSERT OR IGNORE INTO leaves (
            leaf_index, commitment, chain_id, block_number,
            tx_index, log_index, asset, amount, observed_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
        "#,
        params![
            leaf.leaf_index as i64,
            leaf.commitment.to_hex(),
            leaf.chain_id as i64,
            leaf.block_number as i64,
            leaf.tx_index as i64,
            leaf.log_index as i64,
            leaf.asset.to_hex(),
            leaf.amount,
            leaf.observed_at as i64,
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

fn insert_nullifier_on(
    conn: &Connection,
    nullifier: &Field,
    tx_hash: Option<&str>,
) -> LedgerResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO nullifiers (nullifier, tx_hash, spent_at) VALUES (?1, ?2, ?3)",
        params![
            nullifier.to_hex(),
            tx_hash,
            crate::types::unix_now() as i64
        ],
    )
    .map_err(db_err)?;
    Ok(())
}

fn insert_root_on(conn: &Connection, root: &Field, tx_hash: Option<&str>) -> LedgerResult<()> {
    conn.execute(
        "INSERT OR IGNORE INTO roots (root, tx_hash, recorded_at) VALUES (?1, ?2, ?3)",
        params![root.to_hex(), tx_hash, crate::types::unix_now() as i64],
    )
    .map_err(db_err)?;
    Ok(())
}

fn set_scan_cursor_on(conn: &Connection, chain_id: u64, block: u64) -> LedgerResult<()> {
    conn.execute(
        "INSERT INTO scan_cursors (chain_id, last_block) VALUES (?1, ?2) \
         ON CONFLICT(chain_id) DO UPDATE SET last_block = excluded.last_block",
        params![chain_id as i64, block as i64],
    )
    .map_err(db_err)?;
    Ok(())
}

fn delete_nullifier_on(conn: &Connection, nullifier: &Field) -> LedgerResult<()> {
    conn.execute(
        "DELETE FROM nullifiers WHERE nullifier = ?1",
        params![nullifier.to_hex()],
    )
    .map_err(db_err)?;
    Ok(())
}

fn parse_field(value: String) -> rusqlite::Result<Field> {
    Field::from_hex(&value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(e),
        )
    })
}

fn row_to_leaf(row: &rusqlite::Row) -> rusqlite::Result<Leaf> {
    Ok(Leaf {
        leaf_index: row.get::<_, i64>("leaf_index")? as u64,
        commitment: parse_field(row.get("commitment")?)?,
        chain_id: row.get::<_, i64>("chain_id")? as u64,
        block_number: row.get::<_, i64>("block_number")? as u64,
        tx_index: row.get::<_, i64>("tx_index")? as u32,
        log_index: row.get::<_, i64>("log_index")? as u32,
        asset: parse_field(row.get("asset")?)?,
        amount: row.get("amount")?,
        observed_at: row.get::<_, i64>("observed_at")? as u64,
    })
}

fn row_to_root(row: &rusqlite::Row) -> rusqlite::Result<KnownRoot> {
    Ok(KnownRoot {
        root_index: row.get::<_, i64>(0)? as u64,
        root: parse_field(row.get(1)?)?,
        tx_hash: row.get(2)?,
        recorded_at: row.get::<_, i64>(3)? as u64,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(byte: u8) -> Field {
        Field::from_be_bytes([byte; 32]).unwrap()
    }

    fn leaf(index: u64, byte: u8) -> Leaf {
        Leaf {
            leaf_index: index,
            commitment: field(byte),
            chain_id: 1,
            block_number: 100,
            tx_index: 0,
            log_index: index as u32,
            asset: Field::ZERO,
            amount: "0x64".to_string(),
            observed_at: 1_700_000_000,
        }
    }

    #[test]
    fn test_leaf_round_trip_and_idempotence() {
        let store = LedgerStore::in_memory().unwrap();
        store.insert_leaf(&leaf(0, 0x0a)).unwrap();

        // replayed observation: same index, same commitment
        store.insert_leaf(&leaf(0, 0x0a)).unwrap();
        assert_eq!(store.leaf_count().unwrap(), 1);

        let by_commitment = store.get_leaf_by_commitment(&field(0x0a)).unwrap().unwrap();
        assert_eq!(by_commitment.leaf_index, 0);

        let by_index = store.get_leaf_by_index(0).unwrap().unwrap();
        assert_eq!(by_index.commitment, field(0x0a));

        assert!(store.get_leaf_by_index(7).unwrap().is_none());
    }

    #[test]
    fn test_leaves_ordered_by_index() {
        let store = LedgerStore::in_memory().unwrap();
        store.insert_leaf(&leaf(1, 0x0b)).unwrap();
        store.insert_leaf(&leaf(0, 0x0a)).unwrap();
        store.insert_leaf(&leaf(2, 0x0c)).unwrap();

        let all = store.get_all_leaves_ordered().unwrap();
        let indices: Vec<u64> = all.iter().map(|l| l.leaf_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_roots_monotone_and_known() {
        let store = LedgerStore::in_memory().unwrap();
        store.insert_root(&field(0x11), None).unwrap();
        store.insert_root(&field(0x22), Some("0xdeadbeef")).unwrap();

        // duplicate insert keeps original ordinal
        store.insert_root(&field(0x11), None).unwrap();

        let latest = store.latest_root().unwrap().unwrap();
        assert_eq!(latest.root, field(0x22));
        assert_eq!(latest.tx_hash.as_deref(), Some("0xdeadbeef"));

        assert!(store.is_known_root(&field(0x11)).unwrap());
        assert!(!store.is_known_root(&field(0x33)).unwrap());
    }

    #[test]
    fn test_nullifier_lifecycle() {
        let store = LedgerStore::in_memory().unwrap();
        let n = field(0x02);

        assert!(!store.is_nullifier_spent(&n).unwrap());
        store.insert_nullifier(&n, None).unwrap();
        store.insert_nullifier(&n, None).unwrap(); // idempotent
        assert!(store.is_nullifier_spent(&n).unwrap());

        store.delete_nullifier(&n).unwrap();
        assert!(!store.is_nullifier_spent(&n).unwrap());
    }

    #[test]
    fn test_scan_cursor_upsert() {
        let store = LedgerStore::in_memory().unwrap();
        assert_eq!(store.get_scan_cursor(5).unwrap(), 0);

        store.set_scan_cursor(5, 100).unwrap();
        assert_eq!(store.get_scan_cursor(5).unwrap(), 100);

        store.set_scan_cursor(5, 250).unwrap();
        assert_eq!(store.get_scan_cursor(5).unwrap(), 250);
    }

    #[test]
    fn test_transaction_commits_on_ok() {
        let store = LedgerStore::in_memory().unwrap();
        store
            .transaction(|tx| {
                tx.insert_nullifier(&field(0x02), Some("0xabc"))?;
                tx.insert_leaf(&leaf(0, 0x0a))?;
                Ok(())
            })
            .unwrap();

        assert!(store.is_nullifier_spent(&field(0x02)).unwrap());
        assert_eq!(store.leaf_count().unwrap(), 1);
    }

    #[test]
    fn test_transaction_rolls_back_on_err() {
        let store = LedgerStore::in_memory().unwrap();
        let result: LedgerResult<()> = store.transaction(|tx| {
            tx.insert_nullifier(&field(0x02), None)?;
            Err(LedgerError::Database("forced".to_string()))
        });

        assert!(result.is_err());
        assert!(!store.is_nullifier_spent(&field(0x02)).unwrap());
    }
}
