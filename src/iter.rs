//! Ordered, forward-only cursor over a column family (§4.5).
//!
//! `first`/`next` return `Result<bool, Error>` (`true` = positioned,
//! `false` = end of range) rather than a bare boolean — the idiomatic
//! Rust shape for an operation that can also fail, since the underlying
//! lookup goes through the collaborator and can surface any of the usual
//! storage errors.

//---------------------------------------------------------------------------------------------------- Import
use std::cell::{Cell, RefCell};

use crate::{
    store::{Cf, Store},
    ttl, Error,
};

/// `first`/`next` search from one of two starting points.
enum Seek<'a> {
    /// The smallest key in range (`first`).
    Start,
    /// The smallest key strictly greater than this one (`next`).
    After(&'a [u8]),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Uninitialized,
    Positioned,
    Eof,
}

//---------------------------------------------------------------------------------------------------- Cursor
/// A forward cursor over one CF, optionally bounded to a key prefix.
///
/// Borrows `&'s Store` rather than owning a collaborator cursor object:
/// every step re-runs a small ordered query instead of holding a live
/// prepared statement, which would otherwise need a self-referential
/// lifetime back into the connection it came from.
#[derive(Debug)]
pub struct Cursor<'s> {
    store: &'s Store,
    cf: Cf,
    prefix: Option<Vec<u8>>,
    current: RefCell<Option<(Vec<u8>, Vec<u8>)>>,
    state: Cell<State>,
}

impl<'s> Cursor<'s> {
    /// `create(cf, [prefix])`: allocates the cursor and positions it at
    /// the first matching key, if any (§4.5).
    pub(crate) fn new(store: &'s Store, cf: Cf, prefix: Option<Vec<u8>>) -> Self {
        store.iterator_opened();
        let iter = Self {
            store,
            cf,
            prefix,
            current: RefCell::new(None),
            state: Cell::new(State::Uninitialized),
        };
        let _ = iter.first();
        iter
    }

    /// `first(iter)`: (re-)positions at the first key of the bound range.
    pub fn first(&self) -> Result<bool, Error> {
        self.advance(&Seek::Start)
    }

    /// `next(iter)`: advances one key.
    pub fn next(&self) -> Result<bool, Error> {
        let current_key = self.current.borrow().as_ref().map(|(k, _)| k.clone());
        match current_key {
            Some(k) => self.advance(&Seek::After(&k)),
            None => {
                self.state.set(State::Eof);
                Ok(false)
            }
        }
    }

    /// `eof(iter) -> bool`.
    #[must_use]
    pub fn eof(&self) -> bool {
        matches!(self.state.get(), State::Eof | State::Uninitialized)
    }

    /// `key(iter)`: the current key, or `None` at eof.
    #[must_use]
    pub fn key(&self) -> Option<Vec<u8>> {
        self.current.borrow().as_ref().map(|(k, _)| k.clone())
    }

    /// `value(iter)`: the current value, or `None` at eof.
    #[must_use]
    pub fn value(&self) -> Option<Vec<u8>> {
        self.current.borrow().as_ref().map(|(_, v)| v.clone())
    }

    /// `close(iter)`: releases the cursor. Equivalent to dropping the
    /// iterator; provided for callers that prefer an explicit call.
    pub fn close(self) {
        drop(self);
    }

    /// Runs the ordered search from `seek`, skipping TTL-expired entries
    /// (read-only — no lazy delete, §4.5) and stopping at the prefix
    /// boundary, then updates cursor state.
    fn advance(&self, seek: &Seek<'_>) -> Result<bool, Error> {
        let table = &self.cf.record.table;
        let cf_name = &self.cf.name;

        let result = self.store.with_read_txn(|pager| {
            let mut candidate = match seek {
                Seek::Start => match &self.prefix {
                    Some(prefix) => pager.seek_ge(table, prefix)?,
                    None => pager.seek_first(table)?,
                },
                Seek::After(key) => pager.next_after(table, key)?,
            };

            loop {
                let Some((key, value)) = candidate else {
                    return Ok(None);
                };
                if let Some(prefix) = &self.prefix {
                    if !key.starts_with(prefix.as_slice()) {
                        return Ok(None);
                    }
                }
                if self.store.active_ttl() > 0 {
                    if let Some(expire_ms) = ttl::existing_expire(pager, cf_name, &key)? {
                        if ttl::is_expired(expire_ms, self.store.now_ms()) {
                            candidate = pager.next_after(table, &key)?;
                            continue;
                        }
                    }
                }
                return Ok(Some((key, value)));
            }
        })?;

        match result {
            Some(entry) => {
                *self.current.borrow_mut() = Some(entry);
                self.state.set(State::Positioned);
                Ok(true)
            }
            None => {
                *self.current.borrow_mut() = None;
                self.state.set(State::Eof);
                Ok(false)
            }
        }
    }
}

impl Drop for Cursor<'_> {
    fn drop(&mut self) {
        self.store.iterator_closed();
    }
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod tests {
    use crate::{config::Config, Store};

    #[test]
    fn full_iteration_is_ascending() {
        let store = Store::open(None, Config::default()).unwrap();
        let default = store.default_cf();
        for k in [b"c".to_vec(), b"a".to_vec(), b"b".to_vec()] {
            store.put(&default, &k, b"v").unwrap();
        }
        let iter = store.iter(&default);
        let mut seen = Vec::new();
        while !iter.eof() {
            seen.push(iter.key().unwrap());
            iter.next().unwrap();
        }
        assert_eq!(seen, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn prefix_scan_stops_at_boundary() {
        let store = Store::open(None, Config::default()).unwrap();
        let default = store.default_cf();
        for k in ["ap", "ab", "az", "b"] {
            store.put(&default, k.as_bytes(), b"v").unwrap();
        }
        let iter = store.iter_prefix(&default, b"a");
        let mut seen = Vec::new();
        while !iter.eof() {
            seen.push(iter.key().unwrap());
            iter.next().unwrap();
        }
        assert_eq!(seen, vec![b"ab".to_vec(), b"ap".to_vec(), b"az".to_vec()]);
    }

    #[test]
    fn iteration_skips_expired_without_deleting() {
        let store = Store::open_with_clock(
            None,
            Config::default(),
            std::sync::Arc::new(crate::time::TestClock::new(0)),
        )
        .unwrap();
        let default = store.default_cf();
        for k in ["a", "b", "c", "d", "e"] {
            store.put(&default, k.as_bytes(), b"v").unwrap();
        }
        store.put_ttl(&default, b"b", b"v", 100).unwrap();
        store.put_ttl(&default, b"d", b"v", 100).unwrap();
        store.clock().advance(100);

        let iter = store.iter(&default);
        let mut seen = Vec::new();
        while !iter.eof() {
            seen.push(iter.key().unwrap());
            iter.next().unwrap();
        }
        assert_eq!(seen, vec![b"a".to_vec(), b"c".to_vec(), b"e".to_vec()]);
        // Read-only skip: the expired entries are still physically present.
        assert!(store.exists(&default, b"b").unwrap() == false);
    }
}
