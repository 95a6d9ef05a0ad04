use std::path::Path;
use std::sync::Arc;

use aggregator_bundle::Bundle;
use alloy_primitives::B256;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, warn};

use crate::queue::row::{encode_block, BundleRow, BundleStatus, NewBundleRow, StoredRow};
use crate::queue::DatabaseError;

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS bundles (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    status TEXT NOT NULL,
    hash TEXT NOT NULL,
    bundle TEXT NOT NULL,
    action_count INTEGER NOT NULL,
    eligible_after TEXT NOT NULL,
    next_eligibility_delay TEXT NOT NULL,
    submit_error TEXT,
    receipt TEXT
);
CREATE INDEX IF NOT EXISTS idx_bundles_status_eligible ON bundles (status, eligible_after);
CREATE INDEX IF NOT EXISTS idx_bundles_hash ON bundles (hash);
"#;

/// Durable queue of bundles, backed by a single SQLite connection.
///
/// Every access goes through a [`QueryGroup`], so at most one group is open at a time.
#[derive(Clone)]
pub struct BundleTable {
    conn: Arc<Mutex<Connection>>,
}

impl BundleTable {
    pub fn open(path: &Path) -> Result<Self, DatabaseError> {
        let conn = Connection::open(path)?;
        let mode: String = conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        debug!(path = %path.display(), journal_mode = %mode, "Opened bundle table");
        Self::with_connection(conn)
    }

    pub fn in_memory() -> Result<Self, DatabaseError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, DatabaseError> {
        conn.execute_batch(SCHEMA_SQL)?;
        Ok(Self { conn: Arc::new(Mutex::new(conn)) })
    }

    /// Waits for exclusive access to the store and opens a transaction.
    pub async fn begin(&self) -> Result<QueryGroup, DatabaseError> {
        let conn = self.conn.clone().lock_owned().await;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(QueryGroup { conn, finished: false })
    }
}

/// Exclusive transactional access to the bundle table.
///
/// Changes become visible on [`QueryGroup::commit`]. A group dropped without committing
/// rolls back, and the store lock is released only after that.
pub struct QueryGroup {
    conn: OwnedMutexGuard<Connection>,
    finished: bool,
}

impl QueryGroup {
    pub fn add(&mut self, rows: Vec<NewBundleRow>) -> Result<Vec<BundleRow>, DatabaseError> {
        let mut inserted = Vec::with_capacity(rows.len());
        let mut stmt = self.conn.prepare_cached(
            "INSERT INTO bundles (status, hash, bundle, action_count, eligible_after, next_eligibility_delay)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        )?;
        for row in rows {
            let bundle_json = serde_json::to_string(&row.bundle)
                .map_err(|source| DatabaseError::Serialization { column: "bundle", source })?;
            stmt.execute(params![
                BundleStatus::Pending.as_ref(),
                format!("{:#x}", row.hash),
                bundle_json,
                action_count(&row.bundle),
                encode_block(row.eligible_after),
                encode_block(row.next_eligibility_delay),
            ])?;
            inserted.push(BundleRow {
                id: self.conn.last_insert_rowid(),
                status: BundleStatus::Pending,
                hash: row.hash,
                bundle: row.bundle,
                eligible_after: row.eligible_after,
                next_eligibility_delay: row.next_eligibility_delay,
                submit_error: None,
                receipt: None,
            });
        }
        Ok(inserted)
    }

    /// Pending rows selectable at `current_block`, oldest first.
    pub fn find_eligible(&self, current_block: u64, limit: usize) -> Result<Vec<BundleRow>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM bundles WHERE status = ?1 AND eligible_after <= ?2 ORDER BY id ASC LIMIT ?3",
            StoredRow::COLUMNS
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.query_rows(&sql, params![BundleStatus::Pending.as_ref(), encode_block(current_block), limit])
    }

    /// `(id, action_count)` of every row [`QueryGroup::find_eligible`] would return,
    /// without decoding the bundles.
    pub fn eligible_action_counts(&self, current_block: u64) -> Result<Vec<(i64, usize)>, DatabaseError> {
        let mut stmt = self.conn.prepare_cached(
            "SELECT id, action_count FROM bundles WHERE status = ?1 AND eligible_after <= ?2 ORDER BY id ASC",
        )?;
        let counts = stmt
            .query_map(params![BundleStatus::Pending.as_ref(), encode_block(current_block)], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, i64>(1)?))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(counts.into_iter().map(|(id, actions)| (id, usize::try_from(actions).unwrap_or_default())).collect())
    }

    pub fn find_by_hash(&self, hash: &B256) -> Result<Option<BundleRow>, DatabaseError> {
        let sql = format!(
            "SELECT {} FROM bundles WHERE hash = ?1 ORDER BY (status = ?2) DESC, id DESC LIMIT 1",
            StoredRow::COLUMNS
        );
        let stored = self
            .conn
            .query_row(&sql, params![format!("{hash:#x}"), BundleStatus::Pending.as_ref()], StoredRow::from_sql)
            .optional()?;
        stored.map(BundleRow::try_from).transpose()
    }

    /// Replaces every column of the row with the same id.
    pub fn update(&mut self, row: &BundleRow) -> Result<(), DatabaseError> {
        let bundle_json = serde_json::to_string(&row.bundle)
            .map_err(|source| DatabaseError::Serialization { column: "bundle", source })?;
        let receipt_json = row
            .receipt
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|source| DatabaseError::Serialization { column: "receipt", source })?;

        let changed = self.conn.execute(
            "UPDATE bundles SET status = ?2, hash = ?3, bundle = ?4, action_count = ?5, eligible_after = ?6,
                 next_eligibility_delay = ?7, submit_error = ?8, receipt = ?9
             WHERE id = ?1",
            params![
                row.id,
                row.status.as_ref(),
                format!("{:#x}", row.hash),
                bundle_json,
                action_count(&row.bundle),
                encode_block(row.eligible_after),
                encode_block(row.next_eligibility_delay),
                row.submit_error,
                receipt_json,
            ],
        )?;
        if changed == 0 {
            return Err(DatabaseError::RowNotFound(row.id));
        }
        Ok(())
    }

    pub fn remove(&mut self, ids: &[i64]) -> Result<usize, DatabaseError> {
        let mut stmt = self.conn.prepare_cached("DELETE FROM bundles WHERE id = ?1")?;
        let mut removed = 0;
        for id in ids {
            removed += stmt.execute(params![id])?;
        }
        Ok(removed)
    }

    pub fn count(&self) -> Result<usize, DatabaseError> {
        let count: i64 = self.conn.query_row("SELECT COUNT(*) FROM bundles", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn count_with_status(&self, status: BundleStatus) -> Result<usize, DatabaseError> {
        let count: i64 =
            self.conn.query_row("SELECT COUNT(*) FROM bundles WHERE status = ?1", params![status.as_ref()], |row| {
                row.get(0)
            })?;
        Ok(count as usize)
    }

    pub fn all(&self) -> Result<Vec<BundleRow>, DatabaseError> {
        let sql = format!("SELECT {} FROM bundles ORDER BY id ASC", StoredRow::COLUMNS);
        self.query_rows(&sql, [])
    }

    pub fn commit(mut self) -> Result<(), DatabaseError> {
        self.conn.execute_batch("COMMIT")?;
        self.finished = true;
        Ok(())
    }

    fn query_rows<P: rusqlite::Params>(&self, sql: &str, params: P) -> Result<Vec<BundleRow>, DatabaseError> {
        let mut stmt = self.conn.prepare_cached(sql)?;
        let stored = stmt.query_map(params, StoredRow::from_sql)?.collect::<rusqlite::Result<Vec<_>>>()?;
        stored.into_iter().map(BundleRow::try_from).collect()
    }
}

fn action_count(bundle: &Bundle) -> i64 {
    i64::try_from(bundle.action_count()).unwrap_or(i64::MAX)
}

impl Drop for QueryGroup {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(e) = self.conn.execute_batch("ROLLBACK") {
            warn!(error = %e, "Failed to roll back query group");
        }
    }
}
