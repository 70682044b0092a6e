//! Transaction coordinator (§4.3).
//!
//! Owns transaction nesting depth, the write flag, busy-retry backoff, and
//! the auto-checkpoint-on-commit threshold. [`Coordinator`] does not touch
//! the pager directly except through [`crate::pager::Pager`]; it has no
//! knowledge of CFs or KV semantics.
//!
//! Nesting simplification (recorded in DESIGN.md): §4.3 lets a rollback at
//! any nesting depth "abort entirely" and treats reaching depth zero again
//! as "the outermost rollback completing". This implementation collapses
//! that into one step — any `rollback()` call immediately undoes the whole
//! transaction tree and resets depth to zero — rather than requiring every
//! intermediate nested caller to also call `rollback()` before the pager
//! transaction is actually closed. A nested caller that still tries to
//! `commit()`/`rollback()` after that point observes
//! [`crate::Error::Protocol`], which matches "further work returns error
//! until the outermost rollback completes" at the point that matters: no
//! caller can keep mutating a transaction that has already been discarded.

//---------------------------------------------------------------------------------------------------- Import
use std::{
    cell::Cell,
    thread,
    time::Duration,
};

use crate::{
    pager::Pager,
    Error,
};

/// Initial busy-retry backoff, in milliseconds (§4.3: "increasing backoff
/// (10 ms -> 100 ms clamp)").
const BUSY_BACKOFF_START_MS: u64 = 10;
/// Backoff clamp.
const BUSY_BACKOFF_MAX_MS: u64 = 100;

//---------------------------------------------------------------------------------------------------- Coordinator
/// Transaction state for one store handle.
#[derive(Debug)]
pub(crate) struct Coordinator {
    depth: Cell<u32>,
    write: Cell<bool>,
    /// Set once a write transaction has failed with a non-retryable error;
    /// cleared when depth returns to zero.
    aborted: Cell<bool>,
    /// The active-TTL counter value as of the outermost `begin`, restored
    /// verbatim on rollback (§4.3 "Rollback").
    ttl_snapshot: Cell<i64>,
    /// Non-zero enables busy retry (§4.1 `busy_timeout_ms`).
    busy_timeout_ms: u32,
    /// `0` disables passive-checkpoint-on-commit (§4.1 `wal_size_limit`).
    wal_size_limit: u32,
    /// Count of committed write transactions since open, for the
    /// `wal_size_limit` threshold.
    committed_writes: Cell<u64>,
}

impl Coordinator {
    pub(crate) fn new(busy_timeout_ms: u32, wal_size_limit: u32) -> Self {
        Self {
            depth: Cell::new(0),
            write: Cell::new(false),
            aborted: Cell::new(false),
            ttl_snapshot: Cell::new(0),
            busy_timeout_ms,
            wal_size_limit,
            committed_writes: Cell::new(0),
        }
    }

    /// Current nesting depth; `0` means no explicit transaction is open.
    pub(crate) fn depth(&self) -> u32 {
        self.depth.get()
    }

    /// Whether the open transaction (if any) is a write transaction.
    pub(crate) fn is_write(&self) -> bool {
        self.write.get()
    }

    /// Whether the open transaction has been fatally aborted (§7).
    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.get()
    }

    /// `begin(write)` / `begin(read)` (§4.3).
    ///
    /// `active_ttl` is the store's live active-TTL counter; on the
    /// outermost `begin` its value is snapshotted so `rollback` can
    /// restore it.
    pub(crate) fn begin(
        &self,
        pager: &dyn Pager,
        write: bool,
        active_ttl: i64,
    ) -> Result<(), Error> {
        if self.aborted.get() {
            return Err(Error::Protocol(
                "transaction aborted; call rollback before continuing".into(),
            ));
        }

        if self.depth.get() == 0 {
            if write {
                self.retry_busy(|| pager.begin_write())?;
            } else {
                pager.begin_read()?;
            }
            self.write.set(write);
            self.ttl_snapshot.set(active_ttl);
            self.depth.set(1);
            return Ok(());
        }

        if write && self.write.get() {
            // §3/§4.3: a second `begin(write)` on an open write is the
            // generic *error* kind ("in-transaction" / "not allowed"),
            // not *locked* (which this crate reserves for contention
            // reported by the collaborator itself).
            return Err(Error::Error(
                "a write transaction is already open on this handle".into(),
            ));
        }
        // A nested `begin(read)` under an open write, or a nested
        // `begin(write)` upgrading an open read, both just extend the
        // existing pager transaction; SQLite auto-upgrades a deferred
        // transaction's lock on its first write statement, which is where
        // the busy retry for that case actually happens (§4.3: "Retries
        // apply to ... the first page-modifying call inside an implicit
        // write transaction").
        if write {
            self.write.set(true);
        }
        self.depth.set(self.depth.get() + 1);
        Ok(())
    }

    /// `commit()`. Only the outermost commit touches the pager.
    pub(crate) fn commit(&self, pager: &dyn Pager) -> Result<(), Error> {
        if self.depth.get() == 0 {
            return Err(Error::Protocol("commit with no open transaction".into()));
        }
        if self.aborted.get() {
            return Err(Error::Error(
                "transaction aborted; call rollback instead of commit".into(),
            ));
        }

        let depth = self.depth.get() - 1;
        self.depth.set(depth);
        if depth > 0 {
            return Ok(());
        }

        let was_write = self.write.get();
        self.write.set(false);
        self.retry_busy(|| pager.commit())?;

        if was_write {
            self.committed_writes.set(self.committed_writes.get() + 1);
        }
        Ok(())
    }

    /// `rollback()`. See the module-level note on the nesting
    /// simplification: this always discards the whole transaction tree
    /// and reports the active-TTL value the caller must restore.
    pub(crate) fn rollback(&self, pager: &dyn Pager) -> Result<i64, Error> {
        if self.depth.get() == 0 {
            return Err(Error::Protocol("rollback with no open transaction".into()));
        }
        let restore = self.ttl_snapshot.get();
        pager.rollback()?;
        self.depth.set(0);
        self.write.set(false);
        self.aborted.set(false);
        Ok(restore)
    }

    /// Marks the current transaction as fatally aborted (§7
    /// "fatal-for-transaction": corrupt or error inside a write
    /// transaction). Subsequent operations short-circuit until rollback.
    pub(crate) fn mark_aborted(&self) {
        if self.depth.get() > 0 {
            self.aborted.set(true);
        }
    }

    /// Whether a passive checkpoint should be attempted after the commit
    /// that just happened (§4.3 "Commit").
    pub(crate) fn should_auto_checkpoint(&self) -> bool {
        self.wal_size_limit > 0
            && self.committed_writes.get() > 0
            && self.committed_writes.get() % u64::from(self.wal_size_limit) == 0
    }

    /// Retries `f` with increasing backoff while it returns
    /// [`crate::Error::Busy`], until `busy_timeout_ms` is exhausted.
    fn retry_busy<T>(&self, mut f: impl FnMut() -> Result<T, Error>) -> Result<T, Error> {
        if self.busy_timeout_ms == 0 {
            return f();
        }

        let deadline = Duration::from_millis(u64::from(self.busy_timeout_ms));
        let mut waited = Duration::ZERO;
        let mut backoff = BUSY_BACKOFF_START_MS;
        loop {
            match f() {
                Err(Error::Busy(msg)) => {
                    if waited >= deadline {
                        return Err(Error::Busy(msg));
                    }
                    let sleep_for = Duration::from_millis(backoff).min(deadline - waited);
                    tracing::debug!(backoff_ms = backoff, "busy; retrying");
                    thread::sleep(sleep_for);
                    waited += sleep_for;
                    backoff = (backoff * 2).min(BUSY_BACKOFF_MAX_MS);
                }
                other => return other,
            }
        }
    }
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, pager::sqlite::SqlitePager};

    fn open() -> SqlitePager {
        SqlitePager::open(None, &Config::default()).unwrap()
    }

    #[test]
    fn nested_read_then_write_upgrades() {
        let pager = open();
        let coord = Coordinator::new(0, 0);
        coord.begin(&pager, false, 0).unwrap();
        assert_eq!(coord.depth(), 1);
        assert!(!coord.is_write());
        coord.begin(&pager, true, 0).unwrap();
        assert_eq!(coord.depth(), 2);
        assert!(coord.is_write());
        coord.commit(&pager).unwrap();
        assert_eq!(coord.depth(), 1);
        coord.commit(&pager).unwrap();
        assert_eq!(coord.depth(), 0);
    }

    #[test]
    fn second_begin_write_is_rejected() {
        let pager = open();
        let coord = Coordinator::new(0, 0);
        coord.begin(&pager, true, 0).unwrap();
        assert!(coord.begin(&pager, true, 0).is_err());
        coord.rollback(&pager).unwrap();
    }

    #[test]
    fn rollback_restores_ttl_snapshot_and_clears_state() {
        let pager = open();
        let coord = Coordinator::new(0, 0);
        coord.begin(&pager, true, 7).unwrap();
        let restored = coord.rollback(&pager).unwrap();
        assert_eq!(restored, 7);
        assert_eq!(coord.depth(), 0);
        assert!(!coord.is_write());
    }
}
