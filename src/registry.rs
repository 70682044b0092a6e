//! Column-family registry (§4.2).
//!
//! The registry is itself persisted in the database: a master table (the
//! "master CF" of §4.2/§6) maps a CF name to a synthetic `u32` id, and the
//! id in turn names the collaborator table that holds the CF's data
//! (`t<id:08x>`). The default CF is a fixed
//! id allocated unconditionally at open time rather than through the
//! general `create` path, matching invariant 7 ("the default CF always
//! exists").

//---------------------------------------------------------------------------------------------------- Import
use crate::{pager::Pager, Error};

/// Name of the table that backs the registry itself.
pub(crate) const MASTER_TABLE: &str = "__snkv_master__";

/// Synthetic id reserved for the default column family.
pub(crate) const DEFAULT_CF_ID: u32 = 1;

/// Display name the store reports for the default CF.
pub(crate) const DEFAULT_CF_NAME: &str = "default";

/// Maximum length, in bytes, of a user-supplied CF name.
const MAX_NAME_LEN: usize = 255;

/// Maximum number of user CFs (§4.2, "Capacity").
pub(crate) const MAX_USER_CFS: usize = 64;

/// Prefix reserved for internal names; no user CF may begin with it.
const RESERVED_PREFIX: &str = "__";

//---------------------------------------------------------------------------------------------------- CfRecord
/// One entry of the registry: a CF's synthetic id and its backing table
/// name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct CfRecord {
    pub(crate) id: u32,
    pub(crate) table: String,
}

impl CfRecord {
    fn new(id: u32) -> Self {
        Self {
            id,
            table: table_name(id),
        }
    }
}

/// The collaborator table name for a synthetic CF id.
pub(crate) fn table_name(id: u32) -> String {
    format!("t{id:08x}")
}

/// Reserved TTL key-index table name for user CF `name`.
pub(crate) fn ttl_key_index_name(name: &str) -> String {
    format!("__snkv_ttl_k__{name}")
}

/// Reserved TTL expiry-index table name for user CF `name`.
pub(crate) fn ttl_expiry_index_name(name: &str) -> String {
    format!("__snkv_ttl_e__{name}")
}

/// Validates a user-supplied CF name (§4.2 `create`, invariant 4).
pub(crate) fn validate_user_name(name: &str) -> Result<(), Error> {
    if name.is_empty() {
        return Err(Error::invalid("column family name must not be empty"));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(Error::invalid(format!(
            "column family name exceeds {MAX_NAME_LEN} bytes"
        )));
    }
    if name.starts_with(RESERVED_PREFIX) {
        return Err(Error::invalid(
            "column family names beginning with '__' are reserved",
        ));
    }
    // Guard the derived TTL companion names too, so a name that fits under
    // MAX_NAME_LEN on its own can't still collide once the index names are derived.
    if ttl_key_index_name(name).len() > MAX_NAME_LEN
        || ttl_expiry_index_name(name).len() > MAX_NAME_LEN
    {
        return Err(Error::invalid(
            "column family name too long once TTL companion names are derived",
        ));
    }
    Ok(())
}

//---------------------------------------------------------------------------------------------------- Registry
/// In-memory mirror of the master table, refreshed from the pager at open
/// time and kept in sync on every `create`/`drop`.
#[derive(Debug)]
pub(crate) struct Registry {
    next_id: std::cell::Cell<u32>,
}

impl Registry {
    /// Opens the registry: ensures the master table and the default CF
    /// exist (§4.1 open sequence step 5), then primes `next_id` from the
    /// highest id already stored.
    pub(crate) fn open(pager: &dyn Pager, read_only: bool) -> Result<Self, Error> {
        let needs_bootstrap = !pager.table_exists(MASTER_TABLE)?;
        if needs_bootstrap && read_only {
            return Err(Error::ReadOnly);
        }

        if needs_bootstrap {
            pager.begin_write()?;
            let result = (|| -> Result<(), Error> {
                pager.create_table(MASTER_TABLE)?;
                pager.create_table(&table_name(DEFAULT_CF_ID))?;
                pager.put(
                    MASTER_TABLE,
                    DEFAULT_CF_NAME.as_bytes(),
                    &DEFAULT_CF_ID.to_le_bytes(),
                )?;
                Ok(())
            })();
            match result {
                Ok(()) => pager.commit()?,
                Err(e) => {
                    let _ = pager.rollback();
                    return Err(e);
                }
            }
        }

        let next_id = Self::scan_max_id(pager)?.saturating_add(1).max(DEFAULT_CF_ID + 1);
        Ok(Self {
            next_id: std::cell::Cell::new(next_id),
        })
    }

    /// Full forward scan of the master table to find the highest assigned
    /// id; the registry has no secondary index over ids, so this runs once
    /// at open time rather than on every `create`.
    fn scan_max_id(pager: &dyn Pager) -> Result<u32, Error> {
        let mut max = DEFAULT_CF_ID;
        let mut cursor = pager.seek_first(MASTER_TABLE)?;
        while let Some((key, value)) = cursor {
            let id = decode_id(&value)?;
            max = max.max(id);
            cursor = pager.next_after(MASTER_TABLE, &key)?;
        }
        Ok(max)
    }

    /// `default()`: the fixed-id default CF handle. Never fails on an
    /// opened store (invariant 7, invariant 12).
    pub(crate) fn default_record(&self) -> CfRecord {
        CfRecord::new(DEFAULT_CF_ID)
    }

    /// `open(name)`: §4.2. Must be called within a transaction (read or
    /// write) so the lookup sees a consistent snapshot.
    pub(crate) fn lookup(&self, pager: &dyn Pager, name: &str) -> Result<CfRecord, Error> {
        if name == DEFAULT_CF_NAME {
            return Ok(self.default_record());
        }
        let value = pager
            .get(MASTER_TABLE, name.as_bytes())?
            .ok_or_else(|| Error::not_found(format!("column family '{name}'")))?;
        Ok(CfRecord::new(decode_id(&value)?))
    }

    /// `create(name)`: §4.2. Must run inside an already-open write
    /// transaction (the caller, `crate::store::Store`, opens it).
    pub(crate) fn create(&self, pager: &dyn Pager, name: &str) -> Result<CfRecord, Error> {
        validate_user_name(name)?;
        if name == DEFAULT_CF_NAME || pager.get(MASTER_TABLE, name.as_bytes())?.is_some() {
            return Err(Error::Error(format!(
                "column family '{name}' already exists"
            )));
        }
        if self.user_cf_count(pager)? >= MAX_USER_CFS {
            return Err(Error::Error(format!(
                "column family capacity ({MAX_USER_CFS}) reached"
            )));
        }

        let id = self.next_id.get();
        self.next_id.set(id + 1);
        let record = CfRecord::new(id);

        pager.create_table(&record.table)?;
        pager.put(MASTER_TABLE, name.as_bytes(), &id.to_le_bytes())?;
        Ok(record)
    }

    /// `drop(name)`: §4.2. Drops the user table plus both TTL companion
    /// tables (idempotently — they may never have been created) and all
    /// master entries. Must run inside an open write transaction.
    pub(crate) fn drop_cf(&self, pager: &dyn Pager, name: &str) -> Result<(), Error> {
        if name == DEFAULT_CF_NAME {
            return Err(Error::Error("the default column family cannot be dropped".into()));
        }
        let record = self.lookup(pager, name)?;

        pager.drop_table(&record.table)?;
        pager.drop_table(&ttl_key_index_name(name))?;
        pager.drop_table(&ttl_expiry_index_name(name))?;

        pager.delete(MASTER_TABLE, name.as_bytes())?;
        Ok(())
    }

    /// `list()`: §4.2. Lexicographic order (ascending, by stored name),
    /// the decided resolution for an otherwise-unspecified ordering. Reserved
    /// (`__`-prefixed) entries are elided per invariant 4; the default CF
    /// is included as `"default"`.
    pub(crate) fn list(&self, pager: &dyn Pager) -> Result<Vec<String>, Error> {
        let mut names = vec![DEFAULT_CF_NAME.to_string()];
        let mut cursor = pager.seek_first(MASTER_TABLE)?;
        while let Some((key, _value)) = cursor {
            if !key.starts_with(RESERVED_PREFIX.as_bytes()) {
                names.push(String::from_utf8_lossy(&key).into_owned());
            }
            cursor = pager.next_after(MASTER_TABLE, &key)?;
        }
        names.sort_unstable();
        names.dedup();
        Ok(names)
    }

    fn user_cf_count(&self, pager: &dyn Pager) -> Result<usize, Error> {
        Ok(self
            .list(pager)?
            .iter()
            .filter(|n| n.as_str() != DEFAULT_CF_NAME)
            .count())
    }
}

/// Decodes a master-table value: a little-endian `u32` root id plus
/// reserved trailing bytes (§6, "values encode the 32-bit root page
/// identifier in little-endian plus reserved bytes").
fn decode_id(value: &[u8]) -> Result<u32, Error> {
    let bytes: [u8; 4] = value
        .get(..4)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| Error::Corrupt("malformed master-table entry".into()))?;
    Ok(u32::from_le_bytes(bytes))
}
