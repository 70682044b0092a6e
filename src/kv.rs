//! KV operations (§4.4): `put`, `put_ttl`, `get`, `get_ttl`, `delete`,
//! `exists`, `ttl_remaining`, `purge_expired`.
//!
//! Free functions taking `&Store` rather than inherent `Store` methods,
//! mirroring how `crate::registry`/`crate::ttl` are organized — the public
//! `impl Store` in `crate::store` is a thin, documented façade over these.

//---------------------------------------------------------------------------------------------------- Import
use crate::{registry::CfRecord, store::Store, ttl, Error};

/// `put(cf, key, value)`.
pub(crate) fn put(store: &Store, cf: &CfRecord, cf_name: &str, key: &[u8], value: &[u8]) -> Result<(), Error> {
    validate_key(key)?;
    store.with_write_txn(|pager, active_ttl| {
        if active_ttl.get() > 0 {
            ttl::clear_ttl_for_key(pager, cf_name, key, active_ttl)?;
        }
        pager.put(&cf.table, key, value)
    })?;
    store.counters().n_puts();
    Ok(())
}

/// `put_ttl(cf, key, value, expire_ms)`.
pub(crate) fn put_ttl(
    store: &Store,
    cf: &CfRecord,
    cf_name: &str,
    key: &[u8],
    value: &[u8],
    expire_ms: i64,
) -> Result<(), Error> {
    validate_key(key)?;
    store.with_write_txn(|pager, active_ttl| {
        pager.put(&cf.table, key, value)?;
        ttl::set_ttl(pager, cf_name, key, expire_ms, active_ttl)
    })?;
    store.counters().n_puts();
    Ok(())
}

/// `get(cf, key) -> value`. Performs lazy expiry: an expired key is
/// deleted (data + both TTL entries) in a fresh write transaction and
/// reported as `not_found`.
pub(crate) fn get(store: &Store, cf: &CfRecord, cf_name: &str, key: &[u8]) -> Result<Vec<u8>, Error> {
    validate_key(key)?;
    let result = get_checked(store, cf, cf_name, key)?;
    let value = result.ok_or_else(|| Error::not_found(format!("key not present in '{cf_name}'")))?;
    store.counters().n_gets();
    Ok(value)
}

/// `get_ttl(cf, key) -> (value, remaining_ms)`.
pub(crate) fn get_ttl(
    store: &Store,
    cf: &CfRecord,
    cf_name: &str,
    key: &[u8],
) -> Result<(Vec<u8>, i64), Error> {
    validate_key(key)?;
    let value = get_checked(store, cf, cf_name, key)?
        .ok_or_else(|| Error::not_found(format!("key not present in '{cf_name}'")))?;
    let now = store.now_ms();
    let remaining = if store.active_ttl() > 0 {
        ttl::remaining(store.pager(), cf_name, key, now)?.unwrap_or(ttl::NO_TTL)
    } else {
        ttl::NO_TTL
    };
    store.counters().n_gets();
    Ok((value, remaining))
}

/// Shared `get`/`get_ttl` core: reads the value, lazily reclaiming it (and
/// returning `None`) if it has expired.
fn get_checked(store: &Store, cf: &CfRecord, cf_name: &str, key: &[u8]) -> Result<Option<Vec<u8>>, Error> {
    let value = store.with_read_txn(|pager| pager.get(&cf.table, key))?;
    let Some(value) = value else {
        return Ok(None);
    };

    if store.active_ttl() == 0 {
        return Ok(Some(value));
    }
    let now = store.now_ms();
    let expire_ms = store.with_read_txn(|pager| ttl::existing_expire(pager, cf_name, key))?;
    let Some(expire_ms) = expire_ms else {
        return Ok(Some(value));
    };
    if !ttl::is_expired(expire_ms, now) {
        return Ok(Some(value));
    }

    // The read view already determines this key is gone; the physical
    // reclaim is best-effort. If the handle can't take a write right now
    // (a read-only store, or an explicit read transaction already open —
    // invariant 8), skip it rather than surface *read-only* from what the
    // caller sees as a read.
    match store.with_write_txn(|pager, active_ttl| {
        pager.delete(&cf.table, key)?;
        ttl::clear_ttl_for_key(pager, cf_name, key, active_ttl)
    }) {
        Ok(()) | Err(Error::ReadOnly) => Ok(None),
        Err(e) => Err(e),
    }
}

/// `delete(cf, key)`.
pub(crate) fn delete(store: &Store, cf: &CfRecord, cf_name: &str, key: &[u8]) -> Result<(), Error> {
    validate_key(key)?;
    let existed = store.with_write_txn(|pager, active_ttl| {
        let existed = pager.delete(&cf.table, key)?;
        if existed && active_ttl.get() > 0 {
            ttl::clear_ttl_for_key(pager, cf_name, key, active_ttl)?;
        }
        Ok(existed)
    })?;
    if !existed {
        return Err(Error::not_found(format!("key not present in '{cf_name}'")));
    }
    store.counters().n_deletes();
    Ok(())
}

/// `exists(cf, key) -> bool`. Applies the same TTL filter as `get` but
/// never lazily deletes (see Open Question decisions in DESIGN.md).
pub(crate) fn exists(store: &Store, cf: &CfRecord, cf_name: &str, key: &[u8]) -> Result<bool, Error> {
    validate_key(key)?;
    let present = store.with_read_txn(|pager| -> Result<bool, Error> {
        let Some(_value) = pager.get(&cf.table, key)? else {
            return Ok(false);
        };
        if store.active_ttl() == 0 {
            return Ok(true);
        }
        match ttl::existing_expire(pager, cf_name, key)? {
            Some(expire_ms) if ttl::is_expired(expire_ms, store.now_ms()) => Ok(false),
            _ => Ok(true),
        }
    })?;
    Ok(present)
}

/// `ttl_remaining(cf, key)`.
pub(crate) fn ttl_remaining(store: &Store, cf: &CfRecord, cf_name: &str, key: &[u8]) -> Result<i64, Error> {
    validate_key(key)?;
    store.with_read_txn(|pager| -> Result<i64, Error> {
        if pager.get(&cf.table, key)?.is_none() {
            return Err(Error::not_found(format!("key not present in '{cf_name}'")));
        }
        let now = store.now_ms();
        match ttl::remaining(pager, cf_name, key, now)? {
            Some(remaining) => Ok(remaining),
            None => Ok(ttl::NO_TTL),
        }
    })
}

/// `purge_expired(cf) -> n`. Loops internal batches, one write
/// transaction per batch, until a batch reclaims nothing (§4.4).
pub(crate) fn purge_expired(store: &Store, cf: &CfRecord, cf_name: &str) -> Result<u64, Error> {
    let now = store.now_ms();
    let mut total = 0_u64;
    loop {
        let n = store.with_write_txn(|pager, active_ttl| {
            ttl::purge_batch(pager, cf_name, &cf.table, now, active_ttl)
        })?;
        total += n;
        if n == 0 || (n as usize) < ttl::PURGE_BATCH_SIZE {
            break;
        }
    }
    if total > 0 {
        for _ in 0..total {
            store.counters().n_deletes();
        }
    }
    Ok(total)
}

/// Invariant 6: an empty key is always rejected with *invalid argument*.
fn validate_key(key: &[u8]) -> Result<(), Error> {
    if key.is_empty() {
        return Err(Error::invalid("key must not be empty"));
    }
    Ok(())
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod tests {
    use crate::{config::Config, Store};

    #[test]
    fn put_get_roundtrip() {
        let store = Store::open(None, Config::default()).unwrap();
        let default = store.default_cf();
        store.put(&default, b"k", b"v").unwrap();
        assert_eq!(store.get(&default, b"k").unwrap(), b"v".to_vec());
    }

    #[test]
    fn empty_key_is_invalid() {
        let store = Store::open(None, Config::default()).unwrap();
        let default = store.default_cf();
        assert!(store.put(&default, b"", b"v").is_err());
    }

    #[test]
    fn delete_then_get_not_found() {
        let store = Store::open(None, Config::default()).unwrap();
        let default = store.default_cf();
        store.put(&default, b"k", b"v").unwrap();
        store.delete(&default, b"k").unwrap();
        assert!(store.get(&default, b"k").is_err());
    }

    #[test]
    fn ttl_expiry_is_lazy_on_get() {
        let store = Store::open_with_clock(
            None,
            Config::default(),
            std::sync::Arc::new(crate::time::TestClock::new(0)),
        )
        .unwrap();
        let default = store.default_cf();
        store.put_ttl(&default, b"e", b"v", 500).unwrap();
        store.clock().advance(500);
        let err = store.get_ttl(&default, b"e").unwrap_err();
        assert_eq!(err.status(), crate::error::Status::NotFound);
        assert!(!store.exists(&default, b"e").unwrap());
    }
}
