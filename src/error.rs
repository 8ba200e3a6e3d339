//! Error taxonomy for the predictor's entry points.
//!
//! The original C++ API (`include/omniscio.h`) reports failure as a bare
//! `OMNISCIO_ERROR` integer; every call site that could fail
//! (`open_start`/`close_start`/`read_start`/`write_start`'s bracketing
//! checks, `dictionary::insert`'s empty-context check, the
//! `omniscio_predict_from` stub) is named here instead, following the
//! `thiserror`-based error enums used across the example pool's other
//! workspaces.

use thiserror::Error;

/// Errors the predictor's public entry points can return. Internal grammar
/// invariant breaches (a broken digram index, a rule with zero users) are
/// not represented here — those are logic errors, not caller mistakes, and
/// surface as panics in debug builds per the invariants this crate upholds
/// internally.
#[derive(Debug, Error)]
pub enum PredictorError {
    /// A `*_start` call was issued while an operation of that type was
    /// already open, a `*_end` call was issued while none was open, or a
    /// query (`predict_next`) was issued while an operation was open.
    #[error("bracketing violation on {op}: operations must not overlap")]
    BracketingViolation { op: &'static str },

    /// A calling context with zero frames was supplied to `*_start`.
    #[error("empty call stack supplied to a tracked operation")]
    EmptyCallStack,

    /// `predict_from` is declared but not implemented, matching the
    /// original's unconditional `OMNISCIO_ERROR` return for it.
    #[error("multi-step prediction from an arbitrary symbol is not supported")]
    Unsupported,

    /// Propagated from the dict/model/log/pred file writers.
    #[error("I/O error while persisting predictor state: {0}")]
    Io(#[from] std::io::Error),

    /// An `OracleIter` was advanced after the oracle it was created from
    /// mutated, matching `oracle::iterator::invalid_iterator` in the
    /// original.
    #[error("oracle iterator used after the oracle it was created from mutated")]
    StaleIterator,
}
