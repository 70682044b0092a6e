//! [`SqlitePager`]: the [`super::Pager`] contract realized on `rusqlite`.
//!
//! Tables are the B-tree roots of §6: `CREATE TABLE t (key BLOB PRIMARY KEY,
//! value BLOB NOT NULL) WITHOUT ROWID`. SQLite's default `BINARY` collation
//! on a `BLOB` primary key is unsigned byte-wise `memcmp`, which is exactly
//! the ordering §3 specifies for keys, so `ORDER BY key` gives ordered
//! iteration for free.
//!
//! Table names are never derived from caller-supplied strings directly —
//! the registry (`crate::registry`) maps a CF name to a synthetic `t<id:08x>`
//! identifier before it ever reaches this module — so building `CREATE
//! TABLE {table} (...)` with `format!` is safe here.
//!
//! There is deliberately no long-lived `rusqlite::Statement` held across
//! calls: a cursor "object" with its own lifetime would borrow from the
//! connection for as long as it is open, which conflicts with the rest of
//! the store also wanting `&self`-shaped access to the connection between
//! cursor steps. Every cursor primitive below instead re-prepares a small,
//! cheap statement per call; SQLite's statement cache (enabled below) keeps
//! the real cost to a lookup.

//---------------------------------------------------------------------------------------------------- Import
use std::{cell::Cell, path::Path};

use rusqlite::{Connection, OptionalExtension};

use crate::{
    config::{Config, JournalMode, SyncLevel},
    error::classify_sqlite,
    pager::{CheckpointMode, Pager},
    Error,
};

//---------------------------------------------------------------------------------------------------- SqlitePager
/// One connection to the database file, configured per [`Config`].
#[derive(Debug)]
pub(crate) struct SqlitePager {
    conn: Connection,
    /// Whether the open database is in WAL mode; `wal_checkpoint` and
    /// the auto-checkpoint threshold are no-ops otherwise (§4.6).
    wal: Cell<bool>,
}

impl SqlitePager {
    /// Opens (creating if necessary) the database at `path` and applies the
    /// pragmas described by `config` (§4.1, open sequence steps 1-2).
    ///
    /// `path` of `None` opens a private in-memory database (the
    /// `:memory:` sentinel of §4.1).
    pub(crate) fn open(path: Option<&Path>, config: &Config) -> Result<Self, Error> {
        config.validate()?;

        let conn = match path {
            Some(path) => {
                if config.read_only {
                    let flags = rusqlite::OpenFlags::SQLITE_OPEN_READ_ONLY
                        | rusqlite::OpenFlags::SQLITE_OPEN_NO_MUTEX;
                    Connection::open_with_flags(path, flags).map_err(classify_sqlite)?
                } else {
                    Connection::open(path).map_err(classify_sqlite)?
                }
            }
            None => {
                if config.read_only {
                    return Err(Error::invalid(
                        "read_only is incompatible with an in-memory store",
                    ));
                }
                Connection::open_in_memory().map_err(classify_sqlite)?
            }
        };

        conn.set_prepared_statement_cache_capacity(128);

        // Page size only takes effect on an empty database, before any
        // table is created, and requires journal_mode=delete while it is
        // applied (SQLite restriction).
        conn.pragma_update(None, "page_size", config.page_size)
            .map_err(classify_sqlite)?;

        let journal_mode = match config.journal_mode {
            JournalMode::Delete => "DELETE",
            JournalMode::Wal => "WAL",
        };
        let applied: String = conn
            .pragma_update_and_check(None, "journal_mode", journal_mode, |row| row.get(0))
            .map_err(classify_sqlite)?;
        let wal = applied.eq_ignore_ascii_case("wal");

        let sync_level = match config.sync_level {
            SyncLevel::Off => 0,
            SyncLevel::Normal => 1,
            SyncLevel::Full => 2,
        };
        conn.pragma_update(None, "synchronous", sync_level)
            .map_err(classify_sqlite)?;
        // A positive `cache_size` is a page count (§4.1: "cache_size: page
        // count"); SQLite only interprets it as kibibytes when negative.
        conn.pragma_update(None, "cache_size", i64::from(config.cache_size))
            .map_err(classify_sqlite)?;
        conn.pragma_update(None, "auto_vacuum", "incremental")
            .map_err(classify_sqlite)?;
        // The coordinator (`crate::txn`) owns busy retry with its own
        // backoff schedule; disable SQLite's built-in busy handler so the
        // two don't race each other.
        conn.pragma_update(None, "busy_timeout", 0)
            .map_err(classify_sqlite)?;
        conn.pragma_update(None, "foreign_keys", false)
            .map_err(classify_sqlite)?;

        Ok(Self {
            conn,
            wal: Cell::new(wal),
        })
    }

    /// Whether the database is currently in WAL mode.
    pub(crate) fn is_wal(&self) -> bool {
        self.wal.get()
    }

    /// Raw access for callers that need a query shape this trait doesn't
    /// cover (the master-CF registry scan, the TTL expiry-index range
    /// scan).
    pub(crate) fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Pager for SqlitePager {
    fn begin_read(&self) -> Result<(), Error> {
        self.conn
            .execute_batch("BEGIN DEFERRED")
            .map_err(classify_sqlite)
    }

    fn begin_write(&self) -> Result<(), Error> {
        self.conn
            .execute_batch("BEGIN IMMEDIATE")
            .map_err(classify_sqlite)
    }

    fn commit(&self) -> Result<(), Error> {
        self.conn.execute_batch("COMMIT").map_err(classify_sqlite)
    }

    fn rollback(&self) -> Result<(), Error> {
        self.conn
            .execute_batch("ROLLBACK")
            .map_err(classify_sqlite)
    }

    fn create_table(&self, table: &str) -> Result<(), Error> {
        self.conn
            .execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS \"{table}\" \
                 (key BLOB PRIMARY KEY, value BLOB NOT NULL) WITHOUT ROWID"
            ))
            .map_err(classify_sqlite)
    }

    fn drop_table(&self, table: &str) -> Result<(), Error> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS \"{table}\""))
            .map_err(classify_sqlite)
    }

    fn table_exists(&self, table: &str) -> Result<bool, Error> {
        self.conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                [table],
                |_| Ok(()),
            )
            .optional()
            .map_err(classify_sqlite)
            .map(|row| row.is_some())
    }

    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
        self.conn
            .query_row(
                &format!("SELECT value FROM \"{table}\" WHERE key = ?1"),
                [key],
                |row| row.get(0),
            )
            .optional()
            .map_err(classify_sqlite)
    }

    fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO \"{table}\" (key, value) VALUES (?1, ?2) \
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value"
                ),
                rusqlite::params![key, value],
            )
            .map_err(classify_sqlite)?;
        Ok(())
    }

    fn delete(&self, table: &str, key: &[u8]) -> Result<bool, Error> {
        let n = self
            .conn
            .execute(&format!("DELETE FROM \"{table}\" WHERE key = ?1"), [key])
            .map_err(classify_sqlite)?;
        Ok(n > 0)
    }

    fn seek_first(&self, table: &str) -> Result<Option<(Vec<u8>, Vec<u8>)>, Error> {
        self.conn
            .query_row(
                &format!("SELECT key, value FROM \"{table}\" ORDER BY key ASC LIMIT 1"),
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(classify_sqlite)
    }

    fn seek_ge(&self, table: &str, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>, Error> {
        self.conn
            .query_row(
                &format!(
                    "SELECT key, value FROM \"{table}\" WHERE key >= ?1 ORDER BY key ASC LIMIT 1"
                ),
                [key],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(classify_sqlite)
    }

    fn next_after(&self, table: &str, after: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>, Error> {
        self.conn
            .query_row(
                &format!(
                    "SELECT key, value FROM \"{table}\" WHERE key > ?1 ORDER BY key ASC LIMIT 1"
                ),
                [after],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(classify_sqlite)
    }

    fn wal_checkpoint(&self, mode: CheckpointMode) -> Result<(i64, i64), Error> {
        if !self.is_wal() {
            return Ok((0, 0));
        }
        let mode_str = match mode {
            CheckpointMode::Passive => "PASSIVE",
            CheckpointMode::Full => "FULL",
            CheckpointMode::Restart => "RESTART",
            CheckpointMode::Truncate => "TRUNCATE",
        };
        self.conn
            .query_row(
                &format!("PRAGMA wal_checkpoint({mode_str})"),
                [],
                |row| {
                    let log: i64 = row.get(1)?;
                    let ckpt: i64 = row.get(2)?;
                    Ok((log, ckpt))
                },
            )
            .map_err(classify_sqlite)
    }

    fn incremental_vacuum(&self, n_pages: u32) -> Result<(), Error> {
        if n_pages == 0 {
            self.conn
                .execute_batch("PRAGMA incremental_vacuum")
                .map_err(classify_sqlite)
        } else {
            self.conn
                .execute_batch(&format!("PRAGMA incremental_vacuum({n_pages})"))
                .map_err(classify_sqlite)
        }
    }

    fn integrity_check(&self) -> Result<(bool, String), Error> {
        let message: String = self
            .conn
            .query_row("PRAGMA integrity_check", [], |row| row.get(0))
            .map_err(classify_sqlite)?;
        Ok((message == "ok", message))
    }
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod tests {
    use super::*;

    fn open_memory() -> SqlitePager {
        SqlitePager::open(None, &Config::default()).unwrap()
    }

    #[test]
    fn create_put_get_roundtrip() {
        let pager = open_memory();
        pager.begin_write().unwrap();
        pager.create_table("t00000001").unwrap();
        pager.put("t00000001", b"k", b"v").unwrap();
        pager.commit().unwrap();

        assert_eq!(
            pager.get("t00000001", b"k").unwrap(),
            Some(b"v".to_vec())
        );
    }

    #[test]
    fn ordering_is_unsigned_lexicographic() {
        let pager = open_memory();
        pager.begin_write().unwrap();
        pager.create_table("t1").unwrap();
        for k in [b"b".to_vec(), b"a".to_vec(), b"\xff".to_vec(), b"\x00".to_vec()] {
            pager.put("t1", &k, b"").unwrap();
        }
        pager.commit().unwrap();

        let mut got = Vec::new();
        let mut cursor = pager.seek_first("t1").unwrap();
        while let Some((k, _)) = cursor {
            got.push(k.clone());
            cursor = pager.next_after("t1", &k).unwrap();
        }
        assert_eq!(got, vec![b"\x00".to_vec(), b"a".to_vec(), b"b".to_vec(), b"\xff".to_vec()]);
    }

    #[test]
    fn integrity_check_reports_ok() {
        let pager = open_memory();
        let (ok, msg) = pager.integrity_check().unwrap();
        assert!(ok, "{msg}");
    }
}
