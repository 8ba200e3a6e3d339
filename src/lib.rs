//! # Online I/O access prediction for parallel scientific applications
//!
//! This crate watches the sequence of file operations (`open`/`close`/
//! `read`/`write`) a process issues, identified by the calling context each
//! one was made from, and predicts what the next operation in that stream
//! is likely to be: which context will fire, what size and offset it will
//! use, how long until it happens, and with what probability.
//!
//! The predictive core is an online [Sequitur][sequitur] grammar built
//! incrementally over the stream of context symbols, the same digram-
//! uniqueness and rule-utility invariants as any Sequitur implementation,
//! extended with *predictor marks*: live grammar positions consistent with
//! the most recently observed suffix of the input, which is what lets
//! [`oracle::Oracle::predict_next`] answer in O(live predictors) rather
//! than replaying the whole history. See [`oracle`] for the detail.
//!
//! [sequitur]: https://en.wikipedia.org/wiki/Sequitur_algorithm
//!
//! ## Architecture
//!
//! - [`context`] turns a raw call stack into a bounded, hashable
//!   [`context::CallingContext`].
//! - [`dictionary`] assigns each distinct context a dense integer symbol.
//! - [`oracle`] (backed by [`grammar`] and [`symbol`]) is the grammar
//!   engine: feed it symbols, ask it what comes next.
//! - [`size_tracker`] and [`offset_tracker`] each run their own embedded
//!   oracle over size/offset values to predict those alongside the symbol.
//! - [`time_stats`] tracks the wall-clock gap between transitions.
//! - [`type_table`] remembers which operation kind each symbol belongs to.
//! - [`tracer`] wires all of the above behind the bracketing protocol
//!   (`*_start`/`*_end`) a caller drives.
//! - [`ffi`] exposes that protocol as `extern "C"` functions for a non-Rust
//!   interception shim to call into.
//! - [`config`] resolves the handful of environment variables that tune a
//!   [`tracer::Tracer`] at startup.
//!
//! ## Example
//!
//! ```
//! use omniscio_predictor::{ApiType, CallingContext, FileHandle, Tracer};
//!
//! let mut tracer = Tracer::in_memory();
//! let ctx = CallingContext::new(vec![0x1000]).unwrap();
//! let handle = FileHandle(1);
//!
//! for round in 0..3 {
//!     tracer
//!         .write_start(ctx.clone(), ApiType::Posix, handle, round * 4096, 4096)
//!         .unwrap();
//!     tracer.write_end(true).unwrap();
//! }
//!
//! let predictions = tracer.predict_next().unwrap();
//! assert!(!predictions.is_empty());
//! ```

mod config;
mod context;
mod dictionary;
mod error;
mod ffi;
mod grammar;
mod id_gen;
mod offset_tracker;
mod op;
mod oracle;
mod size_tracker;
mod symbol;
mod time_stats;
mod tracer;
mod type_table;

#[cfg(test)]
mod tests;

pub use config::Config;
pub use context::CallingContext;
pub use error::PredictorError;
pub use offset_tracker::OffsetDescriptor;
pub use op::{ApiType, FileHandle, OpType, PredictionRecord};
pub use tracer::Tracer;
