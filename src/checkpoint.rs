//! Checkpoint & incremental vacuum (§4.6).
//!
//! Both operations briefly release and reacquire the persistent read
//! cursor (invariant 2); this module only contains that choreography —
//! the actual pager calls live behind [`crate::pager::Pager`].

//---------------------------------------------------------------------------------------------------- Import
use crate::{pager::CheckpointMode, store::Store, Error};

/// `checkpoint(mode) -> (wal_frames_after, frames_copied)` (§4.6).
pub(crate) fn checkpoint(store: &Store, mode: CheckpointMode) -> Result<(i64, i64), Error> {
    if store.coordinator_depth() > 0 && store.coordinator_is_write() {
        return Err(Error::Busy(
            "a write transaction is currently open on this handle".into(),
        ));
    }

    store.close_persistent_cursor()?;
    let result = store.pager().wal_checkpoint(mode);
    // Step 5: re-open regardless of the checkpoint's own result, then
    // report the checkpoint's error if there was one.
    let reopened = store.open_persistent_cursor();
    match (result, reopened) {
        (Ok(v), Ok(())) => Ok(v),
        (Ok(_), Err(reopen_err)) => Err(reopen_err),
        (Err(checkpoint_err), _) => Err(checkpoint_err),
    }
}

/// `incremental_vacuum(n_pages)` (§4.6). Rejected while an iterator or
/// write transaction is open on this store.
pub(crate) fn incremental_vacuum(store: &Store, n_pages: u32) -> Result<(), Error> {
    if store.coordinator_depth() > 0 && store.coordinator_is_write() {
        return Err(Error::Busy(
            "a write transaction is currently open on this handle".into(),
        ));
    }
    if store.live_iterators() > 0 {
        return Err(Error::Busy("an iterator is open on this handle".into()));
    }

    store.close_persistent_cursor()?;
    let result = store.pager().incremental_vacuum(n_pages);
    let reopened = store.open_persistent_cursor();
    match (result, reopened) {
        (Ok(()), Ok(())) => Ok(()),
        (Ok(()), Err(reopen_err)) => Err(reopen_err),
        (Err(e), _) => Err(e),
    }
}

/// `integrity_check() -> (ok, message)` (§4.7). Read-only; runs within
/// whatever read view is already current.
pub(crate) fn integrity_check(store: &Store) -> Result<(bool, String), Error> {
    store.pager().integrity_check()
}
