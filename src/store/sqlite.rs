//! SQLite-backed store
//!
//! Counters are incremented with a single upsert-returning statement, so
//! concurrent callers (including other processes sharing the file) never
//! receive the same value. Registration and mark updates run inside
//! `BEGIN IMMEDIATE` transactions, which take the write lock up front and
//! roll back if dropped before commit.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};

use super::{MarkUpdate, Registration, Store, StoreError};
use crate::registry::Node;
use crate::watermark::{HighWaterMark, Tsn};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS sequences (
    clock_id TEXT PRIMARY KEY,
    value INTEGER NOT NULL
);
CREATE TABLE IF NOT EXISTS nodes (
    id TEXT PRIMARY KEY,
    url TEXT NOT NULL UNIQUE,
    metadata TEXT NOT NULL,
    registered_at TEXT NOT NULL
);
CREATE TABLE IF NOT EXISTS high_water_marks (
    node_id TEXT NOT NULL,
    clock_id TEXT NOT NULL,
    tsn INTEGER NOT NULL,
    PRIMARY KEY (node_id, clock_id)
);
";

/// Store backed by a SQLite database file.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Io(e.to_string()))?;
        }

        let conn = Connection::open(path)?;
        conn.busy_timeout(busy_timeout)?;
        // WAL lets readers proceed while a writer holds the lock
        let mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        log::debug!("journal_mode={} for {}", mode, path.display());
        conn.execute_batch(SCHEMA)?;

        log::info!("Opened SQLite store at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory database.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
            path: None,
        })
    }

    /// Database file, if this store is file-backed
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }
}

fn to_tsn(value: i64) -> Result<Tsn, StoreError> {
    Tsn::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative sequence value {}", value)))
}

fn to_sql_tsn(tsn: Tsn) -> Result<i64, StoreError> {
    i64::try_from(tsn).map_err(|_| StoreError::Constraint(format!("tsn {} exceeds storage range", tsn)))
}

type NodeRow = (String, String, String, String);

fn read_node_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<NodeRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn node_from_row((id, url, metadata, registered_at): NodeRow) -> Result<Node, StoreError> {
    let registered_at = DateTime::parse_from_rfc3339(&registered_at)
        .map_err(|e| StoreError::Corrupt(format!("node {} registered_at: {}", id, e)))?
        .with_timezone(&Utc);
    Ok(Node {
        id,
        url,
        metadata,
        registered_at,
    })
}

impl Store for SqliteStore {
    fn allocate_sequence(&self, clock_id: &str) -> Result<Tsn, StoreError> {
        let conn = self.conn.lock()?;
        let value: i64 = conn.query_row(
            "INSERT INTO sequences (clock_id, value) VALUES (?1, 1)
             ON CONFLICT(clock_id) DO UPDATE SET value = value + 1
             RETURNING value",
            params![clock_id],
            |row| row.get(0),
        )?;
        to_tsn(value)
    }

    fn register_identity(&self, url: &str, metadata: &str) -> Result<Registration, StoreError> {
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let existing = tx
            .query_row(
                "SELECT id, url, metadata, registered_at FROM nodes WHERE url = ?1",
                params![url],
                read_node_row,
            )
            .optional()?;

        let registration = match existing {
            Some(row) => Registration {
                node: node_from_row(row)?,
                created: false,
            },
            None => {
                let node = Node::new(url, metadata);
                tx.execute(
                    "INSERT INTO nodes (id, url, metadata, registered_at) VALUES (?1, ?2, ?3, ?4)",
                    params![node.id, node.url, node.metadata, node.registered_at.to_rfc3339()],
                )?;
                Registration {
                    node,
                    created: true,
                }
            }
        };

        tx.commit()?;
        Ok(registration)
    }

    fn lookup_identity(&self, node_id: &str) -> Result<Option<Node>, StoreError> {
        let conn = self.conn.lock()?;
        let row = conn
            .query_row(
                "SELECT id, url, metadata, registered_at FROM nodes WHERE id = ?1",
                params![node_id],
                read_node_row,
            )
            .optional()?;
        row.map(node_from_row).transpose()
    }

    fn list_identities(&self) -> Result<Vec<Node>, StoreError> {
        let conn = self.conn.lock()?;
        let mut stmt = conn
            .prepare_cached("SELECT id, url, metadata, registered_at FROM nodes ORDER BY id")?;
        let rows = stmt.query_map([], read_node_row)?;

        let mut nodes = Vec::new();
        for row in rows {
            nodes.push(node_from_row(row?)?);
        }
        Ok(nodes)
    }

    fn query_high_water_marks(&self) -> Result<Vec<HighWaterMark>, StoreError> {
        let conn = self.conn.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT node_id, clock_id, tsn FROM high_water_marks ORDER BY node_id, clock_id",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?, row.get::<_, i64>(2)?))
        })?;

        let mut marks = Vec::new();
        for row in rows {
            let (node_id, clock_id, tsn) = row?;
            marks.push(HighWaterMark::new(node_id, clock_id, to_tsn(tsn)?));
        }
        Ok(marks)
    }

    fn advance_high_water_mark(
        &self,
        node_id: &str,
        clock_id: &str,
        tsn: Tsn,
    ) -> Result<MarkUpdate, StoreError> {
        let sql_tsn = to_sql_tsn(tsn)?;
        let mut conn = self.conn.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let stored: Option<i64> = tx
            .query_row(
                "SELECT tsn FROM high_water_marks WHERE node_id = ?1 AND clock_id = ?2",
                params![node_id, clock_id],
                |row| row.get(0),
            )
            .optional()?;
        let stored = stored.map(to_tsn).transpose()?.unwrap_or(0);

        let update = if tsn > stored {
            tx.execute(
                "INSERT INTO high_water_marks (node_id, clock_id, tsn) VALUES (?1, ?2, ?3)
                 ON CONFLICT(node_id, clock_id) DO UPDATE SET tsn = excluded.tsn",
                params![node_id, clock_id, sql_tsn],
            )?;
            MarkUpdate::Advanced { previous: stored }
        } else if tsn == stored {
            MarkUpdate::Unchanged
        } else {
            MarkUpdate::Rejected { stored }
        };

        tx.commit()?;
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_temp(dir: &tempfile::TempDir) -> SqliteStore {
        SqliteStore::open(&dir.path().join("nodes.db"), Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a").join("b").join("nodes.db");
        let store = SqliteStore::open(&path, Duration::from_secs(5)).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        assert!(path.exists());
    }

    #[test]
    fn test_counter_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_temp(&dir);
            assert_eq!(store.path(), Some(dir.path().join("nodes.db").as_path()));
            assert_eq!(store.allocate_sequence("A1").unwrap(), 1);
            assert_eq!(store.allocate_sequence("A1").unwrap(), 2);
        }

        let store = open_temp(&dir);
        assert_eq!(store.allocate_sequence("A1").unwrap(), 3);
        assert_eq!(store.allocate_sequence("B1").unwrap(), 1);
    }

    #[test]
    fn test_registration_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let node;
        {
            let store = open_temp(&dir);
            node = store.register_identity("a.example", "zone1").unwrap().node;
        }

        let store = open_temp(&dir);
        let loaded = store.lookup_identity(&node.id).unwrap().unwrap();
        assert_eq!(loaded, node);

        let again = store.register_identity("a.example", "zone1").unwrap();
        assert!(!again.created);
        assert_eq!(again.node.id, node.id);
    }

    #[test]
    fn test_marks_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = open_temp(&dir);
            store.advance_high_water_mark("A1", "A1", 3).unwrap();
            store.advance_high_water_mark("B1", "B1", 8).unwrap();
        }

        let store = open_temp(&dir);
        assert_eq!(
            store.query_high_water_marks().unwrap(),
            vec![
                HighWaterMark::new("A1", "A1", 3),
                HighWaterMark::new("B1", "B1", 8),
            ]
        );
        assert_eq!(
            store.advance_high_water_mark("A1", "A1", 1).unwrap(),
            MarkUpdate::Rejected { stored: 3 }
        );
    }

    #[test]
    fn test_two_handles_share_counter() {
        let dir = tempfile::tempdir().unwrap();
        let first = open_temp(&dir);
        let second = open_temp(&dir);

        assert_eq!(first.allocate_sequence("c").unwrap(), 1);
        assert_eq!(second.allocate_sequence("c").unwrap(), 2);
        assert_eq!(first.allocate_sequence("c").unwrap(), 3);
    }

    #[test]
    fn test_tsn_out_of_range() {
        let store = SqliteStore::open_in_memory().unwrap();
        assert_eq!(store.path(), None);
        let result = store.advance_high_water_mark("n", "c", u64::MAX);
        assert!(matches!(result, Err(StoreError::Constraint(_))));
    }

    #[test]
    fn test_list_identities_ordered() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.register_identity("a.example", "").unwrap();
        store.register_identity("b.example", "").unwrap();
        store.register_identity("c.example", "").unwrap();

        let ids: Vec<String> = store
            .list_identities()
            .unwrap()
            .into_iter()
            .map(|n| n.id)
            .collect();
        let mut sorted = ids.clone();
        sorted.sort();
        assert_eq!(ids.len(), 3);
        assert_eq!(ids, sorted);
    }
}
