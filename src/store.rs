//! [`Store`]: the handle returned by [`crate::Store::open`], and the
//! public façade over `crate::{registry, txn, kv, ttl, iter, checkpoint}`.

//---------------------------------------------------------------------------------------------------- Import
use std::{
    cell::Cell,
    path::{Path, PathBuf},
    sync::Arc,
};

use crate::{
    checkpoint,
    config::Config,
    iter::Cursor,
    kv,
    pager::{sqlite::SqlitePager, CheckpointMode, Pager},
    registry::{CfRecord, Registry, DEFAULT_CF_NAME},
    stats::{Counters, Stats},
    time::{Clock, SystemClock},
    ttl, Error,
};

//---------------------------------------------------------------------------------------------------- Cf
/// A handle to an open column family (§3 "Column Family").
///
/// Unlike a [`Cursor`], a `Cf` does not borrow from its [`Store`]: it
/// is a small, `Clone`-able value (a name and a resolved table reference)
/// looked up once via [`Store::create_cf`]/[`Store::open_cf`]/
/// [`Store::default_cf`] and then passed back into every store method that
/// operates on that namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cf {
    pub(crate) name: String,
    pub(crate) record: CfRecord,
}

impl Cf {
    /// This column family's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

//---------------------------------------------------------------------------------------------------- Store
/// An open database handle (§3 "Store").
///
/// Every public method takes `&self`: mutable state (transaction depth,
/// the active-TTL counter, statistics) lives behind `Cell`s so that
/// [`Cursor`] can hold a plain `&'s Store` without conflicting with
/// the rest of the API, the same shape `rusqlite::Connection` itself
/// exposes.
#[derive(Debug)]
pub struct Store {
    path: Option<PathBuf>,
    pager: Box<dyn Pager>,
    registry: Registry,
    coordinator: crate::txn::Coordinator,
    counters: Counters,
    active_ttl: Cell<i64>,
    clock: Arc<dyn Clock>,
    config: Config,
    live_iterators: Cell<u32>,
}

impl Store {
    /// Opens (or creates) a database at `path` per §4.1. `path = None`
    /// opens a private in-memory store.
    #[tracing::instrument(skip(config))]
    pub fn open(path: Option<&Path>, config: Config) -> Result<Self, Error> {
        Self::open_with_clock(path, config, Arc::new(SystemClock))
    }

    /// As [`Store::open`], but with an explicit time source; tests use
    /// this to control TTL expiry deterministically.
    pub fn open_with_clock(
        path: Option<&Path>,
        config: Config,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, Error> {
        let pager = SqlitePager::open(path, &config)?;
        let registry = Registry::open(&pager, config.read_only)?;

        // §4.1 step 4: read transaction, step 6: persistent read cursor.
        pager.begin_read()?;

        let active_ttl = count_active_ttl(&pager, &registry)?;

        Ok(Self {
            path: path.map(Path::to_path_buf),
            pager: Box::new(pager),
            registry,
            coordinator: crate::txn::Coordinator::new(config.busy_timeout_ms, config.wal_size_limit),
            counters: Counters::default(),
            active_ttl: Cell::new(active_ttl),
            clock,
            config,
            live_iterators: Cell::new(0),
        })
    }

    /// The path this store was opened with, or `None` for an in-memory
    /// store.
    #[must_use]
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // ---- column families (§4.2) ------------------------------------------------

    /// `default()`: the always-present default column family.
    #[must_use]
    pub fn default_cf(&self) -> Cf {
        Cf {
            name: DEFAULT_CF_NAME.to_string(),
            record: self.registry.default_record(),
        }
    }

    /// `create(name)`.
    pub fn create_cf(&self, name: &str) -> Result<Cf, Error> {
        let record = self.with_write_txn(|pager, _ttl| self.registry.create(pager, name))?;
        Ok(Cf {
            name: name.to_string(),
            record,
        })
    }

    /// `open(name)`.
    pub fn open_cf(&self, name: &str) -> Result<Cf, Error> {
        let record = self.with_read_txn(|pager| self.registry.lookup(pager, name))?;
        Ok(Cf {
            name: name.to_string(),
            record,
        })
    }

    /// `drop(name)`.
    pub fn drop_cf(&self, name: &str) -> Result<(), Error> {
        self.with_write_txn(|pager, _ttl| self.registry.drop_cf(pager, name))
    }

    /// `list()`.
    pub fn list_cfs(&self) -> Result<Vec<String>, Error> {
        self.with_read_txn(|pager| self.registry.list(pager))
    }

    // ---- KV operations (§4.4) --------------------------------------------------

    /// `put(cf, key, value)`.
    pub fn put(&self, cf: &Cf, key: &[u8], value: &[u8]) -> Result<(), Error> {
        self.record_errors(kv::put(self, &cf.record, &cf.name, key, value))
    }

    /// `put_ttl(cf, key, value, expire_ms)`.
    pub fn put_ttl(&self, cf: &Cf, key: &[u8], value: &[u8], expire_ms: i64) -> Result<(), Error> {
        self.record_errors(kv::put_ttl(self, &cf.record, &cf.name, key, value, expire_ms))
    }

    /// `get(cf, key) -> value`.
    pub fn get(&self, cf: &Cf, key: &[u8]) -> Result<Vec<u8>, Error> {
        self.record_errors(kv::get(self, &cf.record, &cf.name, key))
    }

    /// `get_ttl(cf, key) -> (value, remaining_ms)`.
    pub fn get_ttl(&self, cf: &Cf, key: &[u8]) -> Result<(Vec<u8>, i64), Error> {
        self.record_errors(kv::get_ttl(self, &cf.record, &cf.name, key))
    }

    /// `delete(cf, key)`.
    pub fn delete(&self, cf: &Cf, key: &[u8]) -> Result<(), Error> {
        self.record_errors(kv::delete(self, &cf.record, &cf.name, key))
    }

    /// `exists(cf, key) -> bool`.
    pub fn exists(&self, cf: &Cf, key: &[u8]) -> Result<bool, Error> {
        self.record_errors(kv::exists(self, &cf.record, &cf.name, key))
    }

    /// `ttl_remaining(cf, key)`.
    pub fn ttl_remaining(&self, cf: &Cf, key: &[u8]) -> Result<i64, Error> {
        self.record_errors(kv::ttl_remaining(self, &cf.record, &cf.name, key))
    }

    /// `purge_expired(cf) -> n`.
    pub fn purge_expired(&self, cf: &Cf) -> Result<u64, Error> {
        self.record_errors(kv::purge_expired(self, &cf.record, &cf.name))
    }

    // ---- iteration (§4.5) ------------------------------------------------------

    /// `create(cf, [prefix]) -> iter`.
    pub fn iter<'s>(&'s self, cf: &Cf) -> Cursor<'s> {
        Cursor::new(self, cf.clone(), None)
    }

    /// As [`Store::iter`], bounded to keys starting with `prefix`.
    pub fn iter_prefix<'s>(&'s self, cf: &Cf, prefix: &[u8]) -> Cursor<'s> {
        Cursor::new(self, cf.clone(), Some(prefix.to_vec()))
    }

    // ---- transactions (§4.3) ---------------------------------------------------

    /// `begin(write)` (`write = false` for `begin(read)`).
    pub fn begin(&self, write: bool) -> Result<(), Error> {
        if self.coordinator.depth() == 0 {
            self.close_persistent_cursor()?;
        }
        match self.coordinator.begin(self.pager.as_ref(), write, self.active_ttl.get()) {
            Ok(()) => Ok(()),
            Err(e) => {
                if self.coordinator.depth() == 0 {
                    let _ = self.open_persistent_cursor();
                }
                Err(e)
            }
        }
    }

    /// `commit()`.
    pub fn commit(&self) -> Result<(), Error> {
        let was_write = self.coordinator.is_write();
        let reaching_zero = self.coordinator.depth() == 1;
        self.coordinator.commit(self.pager.as_ref())?;

        if reaching_zero {
            // `checkpoint::checkpoint` expects the persistent read cursor
            // to already be open (it closes and reopens one of its own
            // around the actual pager checkpoint call); reopen it first so
            // the auto-checkpoint below has something to close.
            self.open_persistent_cursor()?;
            if was_write && self.coordinator.should_auto_checkpoint() {
                if let Err(e) = checkpoint::checkpoint(self, CheckpointMode::Passive) {
                    tracing::warn!(error = %e, "auto checkpoint after commit failed");
                }
            }
        }
        Ok(())
    }

    /// `rollback()`.
    pub fn rollback(&self) -> Result<(), Error> {
        let restored = self.coordinator.rollback(self.pager.as_ref())?;
        self.active_ttl.set(restored);
        self.open_persistent_cursor()?;
        Ok(())
    }

    // ---- checkpoint & vacuum (§4.6, §4.7) --------------------------------------

    /// `checkpoint(mode)`.
    pub fn checkpoint(&self, mode: CheckpointMode) -> Result<(i64, i64), Error> {
        self.record_errors(checkpoint::checkpoint(self, mode))
    }

    /// `incremental_vacuum(n_pages)`.
    pub fn incremental_vacuum(&self, n_pages: u32) -> Result<(), Error> {
        self.record_errors(checkpoint::incremental_vacuum(self, n_pages))
    }

    /// `integrity_check()`.
    pub fn integrity_check(&self) -> Result<(bool, String), Error> {
        self.record_errors(checkpoint::integrity_check(self))
    }

    /// `stats()`.
    #[must_use]
    pub fn stats(&self) -> Stats {
        self.counters.snapshot()
    }

    /// Close sequence (§4.1): any borrowed [`Cursor`]s must already be
    /// dropped (the borrow checker enforces this); releasing the
    /// persistent read cursor, closing the collaborator connection, and
    /// freeing the registry all happen via `Drop` once `self` goes out of
    /// scope. Provided so callers can make closing an explicit,
    /// documented step rather than relying on an implicit drop.
    pub fn close(self) {
        drop(self);
    }

    // ---- internal plumbing ------------------------------------------------------

    pub(crate) fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    #[cfg(test)]
    pub(crate) fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub(crate) fn active_ttl(&self) -> i64 {
        self.active_ttl.get()
    }

    pub(crate) fn pager(&self) -> &dyn Pager {
        self.pager.as_ref()
    }

    pub(crate) fn counters(&self) -> &Counters {
        &self.counters
    }

    pub(crate) fn coordinator_depth(&self) -> u32 {
        self.coordinator.depth()
    }

    pub(crate) fn coordinator_is_write(&self) -> bool {
        self.coordinator.is_write()
    }

    pub(crate) fn live_iterators(&self) -> u32 {
        self.live_iterators.get()
    }

    pub(crate) fn iterator_opened(&self) {
        self.live_iterators.set(self.live_iterators.get() + 1);
        self.counters.n_iterations();
    }

    pub(crate) fn iterator_closed(&self) {
        self.live_iterators.set(self.live_iterators.get().saturating_sub(1));
    }

    pub(crate) fn close_persistent_cursor(&self) -> Result<(), Error> {
        self.pager.commit()
    }

    pub(crate) fn open_persistent_cursor(&self) -> Result<(), Error> {
        self.pager.begin_read()
    }

    /// Runs `f` within a read view: the currently open explicit
    /// transaction if one is open, or the persistent read cursor
    /// otherwise (no begin/commit overhead in the common case, per §2
    /// "reads outside a write transaction incur no begin/commit cost").
    pub(crate) fn with_read_txn<T>(&self, f: impl FnOnce(&dyn Pager) -> Result<T, Error>) -> Result<T, Error> {
        if self.coordinator.depth() > 0 && self.coordinator.is_aborted() {
            return Err(Error::Protocol(
                "transaction aborted; call rollback before continuing".into(),
            ));
        }
        f(self.pager.as_ref())
    }

    /// Runs `f` within a write view: the currently open explicit write
    /// transaction if one is open (invariant 8 rejects this if the open
    /// explicit transaction is read-only), or a freshly opened-and-
    /// committed implicit write transaction otherwise.
    pub(crate) fn with_write_txn<T>(
        &self,
        f: impl FnOnce(&dyn Pager, &Cell<i64>) -> Result<T, Error>,
    ) -> Result<T, Error> {
        if self.config.read_only {
            return Err(Error::ReadOnly);
        }
        if self.coordinator.depth() > 0 {
            if self.coordinator.is_aborted() {
                return Err(Error::Protocol(
                    "transaction aborted; call rollback before continuing".into(),
                ));
            }
            if !self.coordinator.is_write() {
                return Err(Error::ReadOnly);
            }
            let result = f(self.pager.as_ref(), &self.active_ttl);
            // §7 "fatal-for-transaction": corrupt or constraint errors
            // inside an explicit write transaction abort it outright;
            // the caller must roll back before issuing further work.
            if matches!(result, Err(Error::Corrupt(_) | Error::Error(_))) {
                self.coordinator.mark_aborted();
            }
            return result;
        }

        self.begin(true)?;
        match f(self.pager.as_ref(), &self.active_ttl) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(e) => {
                let _ = self.rollback();
                Err(e)
            }
        }
    }

    fn record_errors<T>(&self, result: Result<T, Error>) -> Result<T, Error> {
        if result.is_err() {
            self.counters.n_errors();
        }
        result
    }
}

/// Sums the live TTL entries across every user CF, for the active-TTL
/// counter's initial value on open (invariant 5).
fn count_active_ttl(pager: &dyn Pager, registry: &Registry) -> Result<i64, Error> {
    let mut total = 0_i64;
    for name in registry.list(pager)? {
        let table = crate::registry::ttl_key_index_name(&name);
        if !pager.table_exists(&table)? {
            continue;
        }
        let mut cursor = pager.seek_first(&table)?;
        while let Some((key, _)) = cursor {
            total += 1;
            cursor = pager.next_after(&table, &key)?;
        }
    }
    Ok(total)
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_default_cf_exists() {
        let store = Store::open(None, Config::default()).unwrap();
        assert!(store.list_cfs().unwrap().contains(&"default".to_string()));
    }

    #[test]
    fn explicit_write_then_rollback_discards_changes() {
        let store = Store::open(None, Config::default()).unwrap();
        let default = store.default_cf();
        store.begin(true).unwrap();
        store.put(&default, b"k1", b"v1").unwrap();
        store.put(&default, b"k2", b"v2").unwrap();
        store.rollback().unwrap();
        assert!(store.get(&default, b"k1").is_err());
        assert!(store.get(&default, b"k2").is_err());
    }

    #[test]
    fn explicit_write_then_commit_persists() {
        let store = Store::open(None, Config::default()).unwrap();
        let default = store.default_cf();
        store.begin(true).unwrap();
        store.put(&default, b"k1", b"v1").unwrap();
        store.commit().unwrap();
        assert_eq!(store.get(&default, b"k1").unwrap(), b"v1".to_vec());
    }

    #[test]
    fn write_inside_read_transaction_is_readonly() {
        let store = Store::open(None, Config::default()).unwrap();
        let default = store.default_cf();
        store.begin(false).unwrap();
        let err = store.put(&default, b"k", b"v").unwrap_err();
        assert!(matches!(err, Error::ReadOnly));
        store.rollback().unwrap();
    }

    #[test]
    fn second_nested_begin_write_errors() {
        let store = Store::open(None, Config::default()).unwrap();
        store.begin(true).unwrap();
        assert!(store.begin(true).is_err());
        store.rollback().unwrap();
    }

    #[test]
    fn constraint_error_in_explicit_txn_aborts_it() {
        let store = Store::open(None, Config::default()).unwrap();
        let default = store.default_cf();
        store.begin(true).unwrap();
        store.create_cf("dup").unwrap();
        assert!(store.create_cf("dup").is_err());
        // The transaction is now fatally aborted (§7): further work on
        // this handle short-circuits until the caller rolls back.
        let err = store.put(&default, b"k", b"v").unwrap_err();
        assert!(matches!(err, Error::Protocol(_)));
        assert!(matches!(store.commit().unwrap_err(), Error::Error(_)));
        store.rollback().unwrap();
        // The transaction tree is gone; normal autocommit work resumes.
        store.put(&default, b"k", b"v").unwrap();
    }
}
