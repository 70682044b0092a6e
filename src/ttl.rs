//! TTL subsystem (§4.4's TTL variants, §3 "TTL entry", §6 persisted layout).
//!
//! A dual index per user CF `C`:
//! - key-index `__snkv_ttl_k__<C>`: `user_key -> 8-byte big-endian expire_ms`.
//! - expiry-index `__snkv_ttl_e__<C>`: `(8-byte big-endian expire_ms ‖ user_key) -> []`.
//!
//! The expiry-index's fixed-width big-endian prefix is what lets
//! [`purge_batch`] find "all entries with `expire_ms <= now`" using only
//! the ordered-scan primitives the pager exposes: such an entry's full key
//! always compares less than `(now + 1)`'s 8-byte encoding followed by
//! nothing, because a strictly longer byte string that agrees on a
//! shared prefix always compares greater than the shorter one.

//---------------------------------------------------------------------------------------------------- Import
use std::cell::Cell;

use crate::{
    pager::Pager,
    registry::{ttl_expiry_index_name, ttl_key_index_name},
    Error,
};

/// Sentinel `remaining_ms`/`ttl_remaining` value meaning "no TTL set".
pub const NO_TTL: i64 = -1;

/// Upper bound on rows reclaimed per internal write transaction (§4.4:
/// "batch size is a fixed internal constant").
pub(crate) const PURGE_BATCH_SIZE: usize = 256;

/// Encodes an expiry-index key: `expire_ms` big-endian, then the user key.
fn encode_expiry_key(expire_ms: i64, key: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(8 + key.len());
    out.extend_from_slice(&(expire_ms as u64).to_be_bytes());
    out.extend_from_slice(key);
    out
}

/// Splits an expiry-index key back into `(expire_ms, user_key)`.
fn decode_expiry_key(raw: &[u8]) -> Result<(i64, &[u8]), Error> {
    if raw.len() < 8 {
        return Err(Error::Corrupt("malformed expiry-index key".into()));
    }
    let (prefix, rest) = raw.split_at(8);
    let bytes: [u8; 8] = prefix.try_into().expect("split_at(8) guarantees length");
    Ok((u64::from_be_bytes(bytes) as i64, rest))
}

/// Whether `expire_ms` (as stored; `0` means no TTL) indicates expiry at
/// `now_ms`.
pub(crate) const fn is_expired(expire_ms: i64, now_ms: i64) -> bool {
    expire_ms != 0 && now_ms >= expire_ms
}

/// Creates the TTL companion tables for `cf_name` if they do not already
/// exist ("creating the index CF lazily", §4.4).
fn ensure_tables(pager: &dyn Pager, cf_name: &str) -> Result<(String, String), Error> {
    let key_table = ttl_key_index_name(cf_name);
    let expiry_table = ttl_expiry_index_name(cf_name);
    pager.create_table(&key_table)?;
    pager.create_table(&expiry_table)?;
    Ok((key_table, expiry_table))
}

/// Reads the current TTL entry for `key` in `cf_name`, or `None` if the
/// key-index table doesn't exist yet or has no entry for it.
pub(crate) fn existing_expire(
    pager: &dyn Pager,
    cf_name: &str,
    key: &[u8],
) -> Result<Option<i64>, Error> {
    let key_table = ttl_key_index_name(cf_name);
    if !pager.table_exists(&key_table)? {
        return Ok(None);
    }
    match pager.get(&key_table, key)? {
        None => Ok(None),
        Some(bytes) => {
            let arr: [u8; 8] = bytes
                .get(..8)
                .and_then(|s| s.try_into().ok())
                .ok_or_else(|| Error::Corrupt("malformed TTL key-index entry".into()))?;
            Ok(Some(u64::from_be_bytes(arr) as i64))
        }
    }
}

/// Removes any existing TTL entries for `(cf_name, key)`, decrementing
/// `active_ttl` if one was present. Called by plain `put`/`delete` (§4.4:
/// "removes any TTL entries for `(cf, key)`").
pub(crate) fn clear_ttl_for_key(
    pager: &dyn Pager,
    cf_name: &str,
    key: &[u8],
    active_ttl: &Cell<i64>,
) -> Result<(), Error> {
    let Some(old_expire) = existing_expire(pager, cf_name, key)? else {
        return Ok(());
    };
    let key_table = ttl_key_index_name(cf_name);
    let expiry_table = ttl_expiry_index_name(cf_name);
    pager.delete(&key_table, key)?;
    pager.delete(&expiry_table, &encode_expiry_key(old_expire, key))?;
    active_ttl.set(active_ttl.get() - 1);
    Ok(())
}

/// `put_ttl`'s TTL half: sets `(key -> expire_ms)` (after the caller has
/// already written the data value), or clears any existing TTL entry when
/// `expire_ms == 0` (§4.4).
pub(crate) fn set_ttl(
    pager: &dyn Pager,
    cf_name: &str,
    key: &[u8],
    expire_ms: i64,
    active_ttl: &Cell<i64>,
) -> Result<(), Error> {
    let had_ttl = existing_expire(pager, cf_name, key)?.is_some();

    if expire_ms == 0 {
        if had_ttl {
            clear_ttl_for_key(pager, cf_name, key, active_ttl)?;
        }
        return Ok(());
    }

    if had_ttl {
        clear_ttl_for_key(pager, cf_name, key, active_ttl)?;
    }
    let (key_table, expiry_table) = ensure_tables(pager, cf_name)?;
    pager.put(&key_table, key, &(expire_ms as u64).to_be_bytes())?;
    pager.put(&expiry_table, &encode_expiry_key(expire_ms, key), &[])?;
    active_ttl.set(active_ttl.get() + 1);
    Ok(())
}

/// `ttl_remaining`'s raw form: `None` means no TTL entry exists at all
/// (caller distinguishes "key absent" vs. "no TTL" using the main data
/// table before calling this).
pub(crate) fn remaining(
    pager: &dyn Pager,
    cf_name: &str,
    key: &[u8],
    now_ms: i64,
) -> Result<Option<i64>, Error> {
    match existing_expire(pager, cf_name, key)? {
        None => Ok(None),
        Some(expire_ms) => Ok(Some((expire_ms - now_ms).max(0))),
    }
}

/// One batch of `purge_expired` (§4.4). Must run inside an already-open
/// write transaction; the caller (`crate::kv`) loops this across separate
/// transactions until it returns `0`.
pub(crate) fn purge_batch(
    pager: &dyn Pager,
    cf_name: &str,
    main_table: &str,
    now_ms: i64,
    active_ttl: &Cell<i64>,
) -> Result<u64, Error> {
    let expiry_table = ttl_expiry_index_name(cf_name);
    if !pager.table_exists(&expiry_table)? {
        return Ok(0);
    }
    let key_table = ttl_key_index_name(cf_name);
    let upper_bound = encode_expiry_key(now_ms + 1, &[]);

    let mut victims = Vec::with_capacity(PURGE_BATCH_SIZE);
    let mut cursor = pager.seek_first(&expiry_table)?;
    while let Some((raw_key, _)) = cursor {
        if victims.len() >= PURGE_BATCH_SIZE || raw_key >= upper_bound {
            break;
        }
        let (_expire_ms, user_key) = decode_expiry_key(&raw_key)?;
        victims.push((raw_key.clone(), user_key.to_vec()));
        cursor = pager.next_after(&expiry_table, &raw_key)?;
    }

    for (expiry_key, user_key) in &victims {
        pager.delete(main_table, user_key)?;
        pager.delete(&key_table, user_key)?;
        pager.delete(&expiry_table, expiry_key)?;
        active_ttl.set(active_ttl.get() - 1);
    }

    Ok(victims.len() as u64)
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::Config, pager::sqlite::SqlitePager};

    fn open_with_table(table: &str) -> SqlitePager {
        let pager = SqlitePager::open(None, &Config::default()).unwrap();
        pager.begin_write().unwrap();
        pager.create_table(table).unwrap();
        pager.commit().unwrap();
        pager
    }

    #[test]
    fn set_then_clear_ttl_updates_counter() {
        let pager = open_with_table("main");
        let active = Cell::new(0_i64);
        pager.begin_write().unwrap();
        pager.put("main", b"k", b"v").unwrap();
        set_ttl(&pager, "cf", b"k", 1_000, &active).unwrap();
        pager.commit().unwrap();
        assert_eq!(active.get(), 1);
        assert_eq!(existing_expire(&pager, "cf", b"k").unwrap(), Some(1_000));

        pager.begin_write().unwrap();
        set_ttl(&pager, "cf", b"k", 0, &active).unwrap();
        pager.commit().unwrap();
        assert_eq!(active.get(), 0);
        assert_eq!(existing_expire(&pager, "cf", b"k").unwrap(), None);
    }

    #[test]
    fn purge_batch_reclaims_only_expired() {
        let pager = open_with_table("main");
        let active = Cell::new(0_i64);
        pager.begin_write().unwrap();
        for (k, expire) in [(b"a".to_vec(), 10), (b"b".to_vec(), 20), (b"c".to_vec(), 30)] {
            pager.put("main", &k, b"v").unwrap();
            set_ttl(&pager, "cf", &k, expire, &active).unwrap();
        }
        pager.commit().unwrap();
        assert_eq!(active.get(), 3);

        pager.begin_write().unwrap();
        let n = purge_batch(&pager, "cf", "main", 20, &active).unwrap();
        pager.commit().unwrap();

        assert_eq!(n, 2); // expire 10 and 20 both <= now=20
        assert_eq!(active.get(), 1);
        assert_eq!(pager.get("main", b"a").unwrap(), None);
        assert_eq!(pager.get("main", b"b").unwrap(), None);
        assert_eq!(pager.get("main", b"c").unwrap(), Some(b"v".to_vec()));
    }

    #[test]
    fn purge_batch_is_idempotent_once_dry() {
        let pager = open_with_table("main");
        let active = Cell::new(0_i64);
        pager.begin_write().unwrap();
        pager.put("main", b"a", b"v").unwrap();
        set_ttl(&pager, "cf", b"a", 10, &active).unwrap();
        pager.commit().unwrap();

        pager.begin_write().unwrap();
        assert_eq!(purge_batch(&pager, "cf", "main", 100, &active).unwrap(), 1);
        pager.commit().unwrap();

        pager.begin_write().unwrap();
        assert_eq!(purge_batch(&pager, "cf", "main", 100, &active).unwrap(), 0);
        pager.commit().unwrap();
    }
}
