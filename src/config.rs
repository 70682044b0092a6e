//! Store [`Config`]uration.
//!
//! This is the struct passed to [`crate::Store::open`] that configures the
//! pager/B-tree collaborator: journal mode, sync level, cache size, page
//! size, read-only, busy timeout and the WAL auto-checkpoint threshold
//! (§4.1).

//---------------------------------------------------------------------------------------------------- Import
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

//---------------------------------------------------------------------------------------------------- Config
/// Store configuration, passed to [`crate::Store::open`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Config {
    /// Rollback-journal or write-ahead-log durability. Default: [`JournalMode::Wal`].
    pub journal_mode: JournalMode,
    /// Disk synchronization level. Default: [`SyncLevel::Normal`].
    pub sync_level: SyncLevel,
    /// Page cache size, in pages. Default: 2000.
    pub cache_size: u32,
    /// Page size in bytes; a power of two in `[512, 65536]`. Only applies
    /// to newly created files. Default: 4096.
    pub page_size: u32,
    /// Open the store without permitting writes. Default: `false`.
    pub read_only: bool,
    /// Milliseconds to retry on contention before returning
    /// [`crate::Error::Busy`]; `0` fails immediately. Default: 0.
    pub busy_timeout_ms: u32,
    /// After every `N` committed write transactions, attempt a passive
    /// WAL checkpoint; `0` disables the behavior. Default: 0.
    pub wal_size_limit: u32,
}

impl Config {
    /// The default page size for newly created databases.
    pub const DEFAULT_PAGE_SIZE: u32 = 4096;
    /// The minimum page size accepted for newly created databases.
    pub const MIN_PAGE_SIZE: u32 = 512;
    /// The maximum page size accepted for newly created databases.
    pub const MAX_PAGE_SIZE: u32 = 65536;

    /// Sane defaults: WAL journaling, normal sync, a 2000-page cache.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            journal_mode: JournalMode::Wal,
            sync_level: SyncLevel::Normal,
            cache_size: 2000,
            page_size: Self::DEFAULT_PAGE_SIZE,
            read_only: false,
            busy_timeout_ms: 0,
            wal_size_limit: 0,
        }
    }

    /// The highest-throughput, least durable settings: `sync_level = off`.
    /// Good for scratch databases and benchmarking, not for data you care
    /// about.
    #[must_use]
    pub const fn fast() -> Self {
        Self {
            sync_level: SyncLevel::Off,
            ..Self::new()
        }
    }

    /// Conservative settings for resource-limited environments: rollback
    /// journal, full sync, a small cache.
    #[must_use]
    pub const fn low_power() -> Self {
        Self {
            journal_mode: JournalMode::Delete,
            sync_level: SyncLevel::Full,
            cache_size: 256,
            ..Self::new()
        }
    }

    /// Validates the fixed, open-time-only settings (page size). Called by
    /// [`crate::Store::open`] before touching the collaborator.
    pub(crate) fn validate(&self) -> Result<(), crate::Error> {
        if !self.page_size.is_power_of_two()
            || self.page_size < Self::MIN_PAGE_SIZE
            || self.page_size > Self::MAX_PAGE_SIZE
        {
            return Err(crate::Error::invalid(format!(
                "page_size must be a power of two in [{}, {}], got {}",
                Self::MIN_PAGE_SIZE,
                Self::MAX_PAGE_SIZE,
                self.page_size
            )));
        }
        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::new()
    }
}

//---------------------------------------------------------------------------------------------------- JournalMode
/// Rollback-journal vs write-ahead-log durability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum JournalMode {
    /// Rollback journal; the journal file is removed on commit.
    Delete,
    /// Write-ahead log; permits concurrent readers with one writer.
    #[default]
    Wal,
}

//---------------------------------------------------------------------------------------------------- SyncLevel
/// Disk synchronization level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SyncLevel {
    /// Never explicitly `fsync`; fastest, least durable.
    Off,
    /// `fsync` at the critical moments; safe against application crashes.
    #[default]
    Normal,
    /// `fsync` before every write; safe against power loss too.
    Full,
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec() {
        let c = Config::default();
        assert_eq!(c.journal_mode, JournalMode::Wal);
        assert_eq!(c.sync_level, SyncLevel::Normal);
        assert_eq!(c.cache_size, 2000);
        assert_eq!(c.page_size, 4096);
        assert!(!c.read_only);
        assert_eq!(c.busy_timeout_ms, 0);
        assert_eq!(c.wal_size_limit, 0);
    }

    #[test]
    fn rejects_bad_page_size() {
        let mut c = Config::default();
        c.page_size = 1000; // not a power of two
        assert!(c.validate().is_err());
        c.page_size = 256; // below minimum
        assert!(c.validate().is_err());
        c.page_size = 4096;
        assert!(c.validate().is_ok());
    }
}
