//! The B-tree/pager collaborator contract (§6).
//!
//! Everything above this module — the registry, the transaction
//! coordinator, KV operations, the iterator, checkpoint and vacuum — talks
//! to the page-oriented B-tree only through [`Pager`]. `sqlite` is the one
//! concrete implementation this crate ships; it realizes the contract on
//! top of `rusqlite`, whose own pager (SQLite's) already speaks rollback
//! journal / WAL, page-oriented storage, incremental vacuum and WAL
//! checkpoint modes natively, which is precisely the shape this contract
//! asks for.

pub(crate) mod sqlite;

//---------------------------------------------------------------------------------------------------- Import
use crate::Error;

//---------------------------------------------------------------------------------------------------- CheckpointMode
/// The four WAL checkpoint modes of §4.6.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointMode {
    /// Copy as many frames as possible without blocking readers or writers.
    Passive,
    /// Block new readers/writers until every frame is copied.
    Full,
    /// Like `Full`, then also reset the WAL file back to its start.
    Restart,
    /// Like `Restart`, then truncate the WAL file to zero bytes.
    Truncate,
}

//---------------------------------------------------------------------------------------------------- Pager
/// The collaborator contract.
///
/// A single [`Pager`] owns one connection to the database file and is not
/// `Sync`; callers coordinate access the same way the rest of the store
/// does (see `crate::store`). Every method here maps to one line of §6's
/// bullet list.
pub(crate) trait Pager: std::fmt::Debug {
    /// Starts a read transaction ("`begin_read`" in §6). Used both for the
    /// persistent read cursor and for nested explicit reads.
    fn begin_read(&self) -> Result<(), Error>;

    /// Starts a write transaction ("`begin_write`"). Fails with
    /// [`crate::Error::Busy`] on contention once the caller's retry budget
    /// is exhausted.
    fn begin_write(&self) -> Result<(), Error>;

    /// Commits the currently open transaction.
    fn commit(&self) -> Result<(), Error>;

    /// Rolls back the currently open transaction.
    fn rollback(&self) -> Result<(), Error>;

    /// Creates a table ("B-tree root") named `table`, if absent.
    fn create_table(&self, table: &str) -> Result<(), Error>;

    /// Drops a table, if present. Not an error if it does not exist —
    /// callers (the registry) already know whether it should.
    fn drop_table(&self, table: &str) -> Result<(), Error>;

    /// Whether a table exists.
    fn table_exists(&self, table: &str) -> Result<bool, Error>;

    /// Point lookup.
    fn get(&self, table: &str, key: &[u8]) -> Result<Option<Vec<u8>>, Error>;

    /// Point insert-or-replace.
    fn put(&self, table: &str, key: &[u8], value: &[u8]) -> Result<(), Error>;

    /// Point delete. Returns whether the key was present.
    fn delete(&self, table: &str, key: &[u8]) -> Result<bool, Error>;

    /// Cursor `seek_first`: the smallest key in the table, if any.
    fn seek_first(&self, table: &str) -> Result<Option<(Vec<u8>, Vec<u8>)>, Error>;

    /// Cursor `seek`: the smallest key `>= key`, if any.
    fn seek_ge(&self, table: &str, key: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>, Error>;

    /// Cursor `next`: the smallest key strictly greater than `after`.
    fn next_after(&self, table: &str, after: &[u8]) -> Result<Option<(Vec<u8>, Vec<u8>)>, Error>;

    /// `wal_checkpoint(mode) -> (log, ckpt)`.
    fn wal_checkpoint(&self, mode: CheckpointMode) -> Result<(i64, i64), Error>;

    /// `incremental_vacuum(n)`.
    fn incremental_vacuum(&self, n_pages: u32) -> Result<(), Error>;

    /// `integrity_check() -> (ok, text)`.
    fn integrity_check(&self) -> Result<(bool, String), Error>;
}
