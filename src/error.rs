//! Error and status types; `enum Error`, `enum Status`.
//!
//! Every public operation returns `Result<T, Error>`. [`Status`] is the
//! bare status code of §4.8, kept separate from
//! [`Error`] so callers comparing status codes against the collaborator's
//! own codes see consistent values.

//---------------------------------------------------------------------------------------------------- Import
use std::fmt;

//---------------------------------------------------------------------------------------------------- Status
/// Backend-agnostic status kind.
///
/// Mirrors the table in §4.8 (error semantics).
/// Numeric values intentionally track SQLite's primary result codes so a
/// caller comparing either set of codes observes consistent results.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum Status {
    /// Success.
    Ok = 0,
    /// Generic failure: duplicate CF, reserved name, constraint violation.
    Error = 1,
    /// External contention: another connection holds the write lock, or
    /// a WAL-incompatible reader is blocking writers.
    Busy = 5,
    /// Internal contention on this connection, reported by the
    /// collaborator itself.
    Locked = 6,
    /// Allocation failure.
    NoMem = 7,
    /// Write attempted on a read-only store.
    ReadOnly = 8,
    /// The collaborator reports structural damage.
    Corrupt = 11,
    /// Key or column family not found.
    NotFound = 12,
    /// Lock protocol violation.
    Protocol = 15,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ok => "ok",
            Self::Error => "error",
            Self::Busy => "busy",
            Self::Locked => "locked",
            Self::NoMem => "nomem",
            Self::ReadOnly => "readonly",
            Self::Corrupt => "corrupt",
            Self::NotFound => "not_found",
            Self::Protocol => "protocol",
        };
        f.write_str(s)
    }
}

//---------------------------------------------------------------------------------------------------- Error
/// The storage core's error type.
///
/// Every fallible operation in this crate returns `Result<T, Error>`.
/// There is no panicking path outside of tests and documented invariant
/// violations (e.g. calling [`crate::Key::Secondary`]-style APIs that do
/// not apply — this crate has none of those).
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// An argument was invalid: an empty key, an out-of-range page size,
    /// a column-family name that is empty, too long, or reserved.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A constraint was violated: duplicate column family, dropping the
    /// default column family, or a reserved-name collision.
    #[error("error: {0}")]
    Error(String),

    /// Contention from another connection; retried internally up to
    /// `busy_timeout_ms` before being surfaced.
    #[error("busy: {0}")]
    Busy(String),

    /// Contention on this connection, reported by the collaborator itself.
    #[error("locked: {0}")]
    Locked(String),

    /// Allocation failure reported by the collaborator.
    #[error("out of memory")]
    NoMem,

    /// A write was attempted on a read-only store or inside a read
    /// transaction.
    #[error("store is read-only")]
    ReadOnly,

    /// The collaborator reports structural damage to the database file.
    /// Fatal for the store: only rollback and close remain valid.
    #[error("database corrupt: {0}")]
    Corrupt(String),

    /// The requested key or column family does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A lock protocol violation (e.g. committing with no open
    /// transaction).
    #[error("protocol violation: {0}")]
    Protocol(String),

    /// An error surfaced by the collaborator that does not map cleanly
    /// onto one of the kinds above.
    #[error("collaborator error: {0}")]
    Collaborator(#[from] rusqlite::Error),
}

impl Error {
    /// Maps this error onto its backend-agnostic [`Status`] code.
    #[must_use]
    pub const fn status(&self) -> Status {
        match self {
            Self::InvalidArgument(_) | Self::Error(_) => Status::Error,
            Self::Busy(_) => Status::Busy,
            Self::Locked(_) => Status::Locked,
            Self::NoMem => Status::NoMem,
            Self::ReadOnly => Status::ReadOnly,
            Self::Corrupt(_) => Status::Corrupt,
            Self::NotFound(_) => Status::NotFound,
            Self::Protocol(_) => Status::Protocol,
            Self::Collaborator(_) => Status::Error,
        }
    }

    /// Shorthand for [`Error::NotFound`] with no extra context.
    pub(crate) fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    /// Shorthand for [`Error::InvalidArgument`] with no extra context.
    pub(crate) fn invalid(what: impl Into<String>) -> Self {
        Self::InvalidArgument(what.into())
    }
}

/// Classifies a raw [`rusqlite::Error`] onto the §4.8 status kinds.
///
/// `rusqlite` surfaces SQLite's primary result code via
/// [`rusqlite::Error::SqliteFailure`]; everything else (type mismatches,
/// UTF-8 errors, ...) is a collaborator-level bug and stays
/// [`Error::Collaborator`].
pub(crate) fn classify_sqlite(err: rusqlite::Error) -> Error {
    use rusqlite::ffi::ErrorCode;

    let rusqlite::Error::SqliteFailure(sqlite_err, ref msg) = err else {
        return Error::Collaborator(err);
    };

    let context = msg.clone().unwrap_or_default();
    match sqlite_err.code {
        ErrorCode::DatabaseBusy => Error::Busy(context),
        ErrorCode::DatabaseLocked => Error::Locked(context),
        ErrorCode::ReadOnly => Error::ReadOnly,
        ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase => Error::Corrupt(context),
        ErrorCode::ConstraintViolation => Error::Error(context),
        ErrorCode::OutOfMemory => Error::NoMem,
        _ => Error::Collaborator(err),
    }
}
