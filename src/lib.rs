//! `snkv` — an embedded, single-file, transactional key-value storage
//! engine.
//!
//! An ordered byte-string keyspace partitioned into independent column
//! families, ACID transactions in rollback-journal or write-ahead-log
//! durability modes, ordered iteration with prefix scan, per-key
//! time-to-live expiry with lazy and batch reclamation, and incremental
//! space reclamation — layered on top of SQLite's own page-oriented
//! B-tree, used here purely as the page cache / journal / B-tree
//! collaborator (`crate::pager`).
//!
//! ```no_run
//! use snkv::{Config, Store};
//!
//! let store = Store::open(None, Config::default())?;
//! let default = store.default_cf();
//! store.put(&default, b"hello", b"world")?;
//! assert_eq!(store.get(&default, b"hello")?, b"world".to_vec());
//! # Ok::<(), snkv::Error>(())
//! ```

mod checkpoint;
mod config;
mod error;
mod iter;
mod kv;
mod pager;
mod registry;
mod stats;
mod store;
mod time;
mod ttl;
mod txn;

pub use config::{Config, JournalMode, SyncLevel};
pub use error::{Error, Status};
pub use iter::Cursor;
pub use pager::CheckpointMode;
pub use stats::Stats;
pub use store::{Cf, Store};
pub use time::{Clock, SystemClock, TestClock};
pub use ttl::NO_TTL;
