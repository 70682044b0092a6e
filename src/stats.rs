//! Statistics counters (§4.7).
//!
//! Monotonically increasing; incremented on the error-free path only,
//! except `n_errors` which counts any returned non-OK status.

//---------------------------------------------------------------------------------------------------- Import
use std::cell::Cell;

//---------------------------------------------------------------------------------------------------- Stats
/// A point-in-time snapshot of a store's counters, returned by
/// [`crate::Store::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Stats {
    /// Successful `put`/`put_ttl` calls.
    pub n_puts: u64,
    /// Successful `get`/`get_ttl` calls (including lazily expired hits
    /// that return `not_found`, since the lazy delete itself succeeded).
    pub n_gets: u64,
    /// Successful `delete` calls and TTL reclamations by `purge_expired`.
    pub n_deletes: u64,
    /// `Cursor::create` calls.
    pub n_iterations: u64,
    /// Any operation that returned a non-`Ok` status.
    pub n_errors: u64,
}

//---------------------------------------------------------------------------------------------------- Counters
/// Interior-mutable counters owned by the store; `&self`-friendly so they
/// compose with the rest of the store's shared, non-`&mut` API.
#[derive(Debug, Default)]
pub(crate) struct Counters {
    n_puts: Cell<u64>,
    n_gets: Cell<u64>,
    n_deletes: Cell<u64>,
    n_iterations: Cell<u64>,
    n_errors: Cell<u64>,
}

macro_rules! counter_inc {
    ($name:ident) => {
        pub(crate) fn $name(&self) {
            self.$name.set(self.$name.get() + 1);
        }
    };
}

impl Counters {
    counter_inc!(n_puts);
    counter_inc!(n_gets);
    counter_inc!(n_deletes);
    counter_inc!(n_iterations);
    counter_inc!(n_errors);

    pub(crate) fn snapshot(&self) -> Stats {
        Stats {
            n_puts: self.n_puts.get(),
            n_gets: self.n_gets.get(),
            n_deletes: self.n_deletes.get(),
            n_iterations: self.n_iterations.get(),
            n_errors: self.n_errors.get(),
        }
    }
}

//---------------------------------------------------------------------------------------------------- Tests
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let counters = Counters::default();
        counters.n_puts();
        counters.n_puts();
        counters.n_errors();
        let snap = counters.snapshot();
        assert_eq!(snap.n_puts, 2);
        assert_eq!(snap.n_errors, 1);
        assert_eq!(snap.n_gets, 0);
    }
}
