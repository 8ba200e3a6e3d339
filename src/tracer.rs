//! The tracer: the single stateful object an interception layer drives
//! through matched `*_start`/`*_end` pairs, turning a live I/O call stream
//! into next-operation predictions.
//!
//! Grounded directly in `omniscio.cpp`'s static-global tracer: one grammar
//! oracle over context symbols, one [`crate::size_tracker::SizeTracker`]
//! per symbol, one [`crate::offset_tracker::OffsetTracker`] and one
//! [`crate::time_stats::TransitionTimeStats`] entry per symbol pair, and a
//! two-state bracketing machine guarding against overlapping operations
//! (the original tracks this with a single `_started_` flag shared across
//! all four call kinds; this keeps the same shape as a two-variant enum).

use crate::config::Config;
use crate::context::CallingContext;
use crate::dictionary::Dictionary;
use crate::error::PredictorError;
use crate::offset_tracker::{OffsetDescriptor, OffsetTracker};
use crate::op::{ApiType, FileHandle, OpType, PredictionRecord};
use crate::oracle::Oracle;
use crate::size_tracker::SizeTracker;
use crate::time_stats::TransitionTimeStats;
use crate::type_table::TypeTable;
use ahash::AHashMap;
use log::{debug, warn};
use std::cell::Cell;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TracerState {
    Idle,
    InOp,
}

/// The fields of the most recently *started* operation, carried until the
/// next one starts (not the next one ends) — matching the original's
/// `_previous_sym_`/`_previous_offset_`/`_previous_size_` globals.
struct PreviousOp {
    sym: u32,
    offset: i64,
    size: i64,
}

/// Bookkeeping for the operation currently bracketed between its `_start`
/// and `_end` call.
struct PendingOp {
    sym: u32,
    handle: Option<FileHandle>,
    log_prefix: String,
}

/// Online I/O access predictor: wires a [`Dictionary`], a grammar
/// [`Oracle`] over context symbols, and the size/offset/time side tables
/// together behind the bracketing protocol an interception shim drives.
pub struct Tracer {
    enabled: bool,
    state: TracerState,
    dictionary: Dictionary,
    oracle: Oracle<u32>,
    sizes: AHashMap<u32, SizeTracker>,
    offsets: AHashMap<(u32, u32), OffsetTracker>,
    times: TransitionTimeStats,
    types: TypeTable,
    previous: Option<PreviousOp>,
    prev_end_secs: Option<f64>,
    epoch: Instant,
    current: Option<PendingOp>,
    operations_log: Option<File>,
    model_path: Option<PathBuf>,
    pred_path: Option<PathBuf>,
    /// Set for the duration of a `_start`/`_end` body so that any I/O the
    /// tracer performs on its own behalf (writing the dictionary or
    /// operations log) cannot recurse back into tracing itself if an
    /// interception shim happens to wrap those writes too.
    suppress_self_tracing: Cell<bool>,
}

fn digit_width(n: u32) -> usize {
    if n <= 1 {
        1
    } else {
        ((n as f64).log10().floor() as usize) + 1
    }
}

fn kind_name(kind: OpType) -> &'static str {
    match kind {
        OpType::Open => "open_start",
        OpType::Close => "close_start",
        OpType::Read => "read_start",
        OpType::Write => "write_start",
    }
}

fn log_offset_size(kind: OpType, offset: i64, size: i64) -> String {
    match kind {
        OpType::Open => " _".to_string(),
        OpType::Close => " _ _".to_string(),
        OpType::Read | OpType::Write => format!(" {offset} {size}"),
    }
}

impl Tracer {
    /// Builds a tracer that performs no file I/O of its own: used by tests
    /// and benchmarks that only care about the predictions, not the
    /// on-disk artifacts.
    pub fn in_memory() -> Self {
        Self {
            enabled: true,
            state: TracerState::Idle,
            dictionary: Dictionary::new(),
            oracle: Oracle::new(),
            sizes: AHashMap::default(),
            offsets: AHashMap::default(),
            times: TransitionTimeStats::new(),
            types: TypeTable::new(),
            previous: None,
            prev_end_secs: None,
            epoch: Instant::now(),
            current: None,
            operations_log: None,
            model_path: None,
            pred_path: None,
            suppress_self_tracing: Cell::new(false),
        }
    }

    /// Opens the `…dict`/`…model`/`…log`/`…pred` output files for this rank
    /// under `config.directory`, named `omniscio.<epoch>.<rank>.<ext>` the
    /// same way the original does after its MPI epoch broadcast (performed
    /// by the caller here, since MPI itself is out of scope for this
    /// crate). Does nothing but record that it is disabled when
    /// `config.disabled` is set.
    pub fn init(
        config: &Config,
        rank: u32,
        world_size: u32,
        epoch_unix_secs: u64,
    ) -> Result<Self, PredictorError> {
        let mut tracer = Self::in_memory();
        tracer.enabled = !config.disabled;
        if !tracer.enabled {
            return Ok(tracer);
        }

        let width = digit_width(world_size);
        let prefix = config
            .directory
            .join(format!("omniscio.{epoch_unix_secs}.{rank:0width$}"));

        tracer
            .dictionary
            .open(&PathBuf::from(format!("{}.dict", prefix.display())))?;
        tracer.model_path = Some(PathBuf::from(format!("{}.model", prefix.display())));
        tracer.pred_path = Some(PathBuf::from(format!("{}.pred", prefix.display())));
        tracer.operations_log = Some(File::create(format!("{}.log", prefix.display()))?);

        debug!("tracer initialized for rank {rank}/{world_size}, writing under {}", prefix.display());
        Ok(tracer)
    }

    fn now_secs(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64()
    }

    fn begin(
        &mut self,
        kind: OpType,
        api: ApiType,
        ctx: CallingContext,
        offset: i64,
        size: i64,
        handle: Option<FileHandle>,
    ) -> Result<(), PredictorError> {
        if self.state == TracerState::InOp {
            warn!("bracketing violation: {} issued while an operation was already open", kind_name(kind));
            return Err(PredictorError::BracketingViolation {
                op: kind_name(kind),
            });
        }

        self.suppress_self_tracing.set(true);
        let sym = self.dictionary.insert(&ctx);
        self.suppress_self_tracing.set(false);
        let sym = sym?;

        let start_secs = self.now_secs();

        self.oracle.input(sym);
        self.types.record(sym, kind);

        if let (Some(prev), Some(prev_end)) = (&self.previous, self.prev_end_secs) {
            self.times.observe(prev.sym, sym, start_secs - prev_end);
        }

        self.sizes
            .entry(sym)
            .or_insert_with(SizeTracker::new)
            .input(size.max(0) as u64);

        if let Some(prev) = &self.previous {
            let descriptor = OffsetDescriptor::classify(prev.offset, prev.size, offset);
            self.offsets
                .entry((prev.sym, sym))
                .or_insert_with(OffsetTracker::new)
                .input(descriptor);
        }

        self.previous = Some(PreviousOp { sym, offset, size });

        let log_prefix = format!(
            "{start_secs} {sym} {kind} {api}{}",
            log_offset_size(kind, offset, size)
        );
        self.current = Some(PendingOp {
            sym,
            handle,
            log_prefix,
        });
        self.state = TracerState::InOp;
        Ok(())
    }

    fn end(&mut self, op_name: &'static str, success: bool, handle: Option<FileHandle>) -> Result<(), PredictorError> {
        if self.state != TracerState::InOp {
            warn!("bracketing violation: {op_name} issued with no operation open");
            return Err(PredictorError::BracketingViolation { op: op_name });
        }
        let pending = self.current.take().expect("InOp implies a pending op");
        let end_secs = self.now_secs();
        let handle = handle.or(pending.handle);
        let handle_str = handle
            .map(|h| h.0.to_string())
            .unwrap_or_else(|| "_".to_string());

        self.suppress_self_tracing.set(true);
        if let Some(w) = self.operations_log.as_mut() {
            writeln!(
                w,
                "{} {} {} {}",
                pending.log_prefix, handle_str, success as u8, end_secs
            )?;
            w.flush()?;
        }
        self.suppress_self_tracing.set(false);

        self.prev_end_secs = Some(end_secs);
        self.state = TracerState::Idle;
        Ok(())
    }

    pub fn open_start(
        &mut self,
        ctx: CallingContext,
        api: ApiType,
    ) -> Result<(), PredictorError> {
        if !self.enabled || self.suppress_self_tracing.get() {
            return Ok(());
        }
        self.begin(OpType::Open, api, ctx, 0, 0, None)
    }

    pub fn open_end(&mut self, success: bool, handle: FileHandle) -> Result<(), PredictorError> {
        if !self.enabled || self.suppress_self_tracing.get() {
            return Ok(());
        }
        self.end("open_end", success, Some(handle))
    }

    pub fn close_start(
        &mut self,
        ctx: CallingContext,
        api: ApiType,
        handle: FileHandle,
    ) -> Result<(), PredictorError> {
        if !self.enabled || self.suppress_self_tracing.get() {
            return Ok(());
        }
        self.begin(OpType::Close, api, ctx, 0, 0, Some(handle))
    }

    pub fn close_end(&mut self, success: bool) -> Result<(), PredictorError> {
        if !self.enabled || self.suppress_self_tracing.get() {
            return Ok(());
        }
        self.end("close_end", success, None)
    }

    pub fn read_start(
        &mut self,
        ctx: CallingContext,
        api: ApiType,
        handle: FileHandle,
        offset: i64,
        size: i64,
    ) -> Result<(), PredictorError> {
        if !self.enabled || self.suppress_self_tracing.get() {
            return Ok(());
        }
        self.begin(OpType::Read, api, ctx, offset, size, Some(handle))
    }

    pub fn read_end(&mut self, success: bool) -> Result<(), PredictorError> {
        if !self.enabled || self.suppress_self_tracing.get() {
            return Ok(());
        }
        self.end("read_end", success, None)
    }

    pub fn write_start(
        &mut self,
        ctx: CallingContext,
        api: ApiType,
        handle: FileHandle,
        offset: i64,
        size: i64,
    ) -> Result<(), PredictorError> {
        if !self.enabled || self.suppress_self_tracing.get() {
            return Ok(());
        }
        self.begin(OpType::Write, api, ctx, offset, size, Some(handle))
    }

    pub fn write_end(&mut self, success: bool) -> Result<(), PredictorError> {
        if !self.enabled || self.suppress_self_tracing.get() {
            return Ok(());
        }
        self.end("write_end", success, None)
    }

    /// Predicts the operation(s) expected to follow the current position in
    /// the stream. Empty when there is not yet enough history, or when
    /// tracing is disabled.
    pub fn predict_next(&self) -> Result<Vec<PredictionRecord>, PredictorError> {
        if self.state == TracerState::InOp {
            return Err(PredictorError::BracketingViolation { op: "predict_next" });
        }
        if !self.enabled {
            return Ok(Vec::new());
        }

        let candidates = self.oracle.predict_next();
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let probability = 1.0 / candidates.len() as f64;
        let prev = self.previous.as_ref();
        let mut out = Vec::with_capacity(candidates.len());
        for next_sym in candidates {
            let size = self.sizes.get(&next_sym).map(SizeTracker::predict);
            let offset = prev.and_then(|p| {
                self.offsets
                    .get(&(p.sym, next_sym))
                    .map(|t| t.predict().resolve(p.offset, p.size))
            });
            let predicted_delay = prev.and_then(|p| self.times.adapted(p.sym, next_sym));

            out.push(PredictionRecord {
                symbol: next_sym,
                probability,
                op_type: self.types.get(next_sym),
                size,
                offset,
                predicted_delay,
            });
        }
        Ok(out)
    }

    /// Speculative multi-step lookahead from an arbitrary point in the
    /// stream. Not supported by the online grammar this crate builds — see
    /// `DESIGN.md` for why this stays a stub rather than a best-effort
    /// approximation.
    pub fn predict_from(&self, _index: usize, _count: usize) -> Result<Vec<PredictionRecord>, PredictorError> {
        Err(PredictorError::Unsupported)
    }

    /// Appends one line per prediction to the `…pred` file, if one is open.
    pub fn log_predictions(&mut self, predictions: &[PredictionRecord]) -> Result<(), PredictorError> {
        if !self.enabled {
            return Ok(());
        }
        let Some(path) = self.pred_path.clone() else {
            return Ok(());
        };
        let mut w = OpenOptions::new().create(true).append(true).open(path)?;
        for p in predictions {
            writeln!(
                w,
                "{} {:?} {:?} {:?} {:?} {:.6}",
                p.symbol, p.op_type, p.size, p.offset, p.predicted_delay, p.probability
            )?;
        }
        Ok(())
    }

    /// Flushes the dictionary and operations log, and writes the grammar
    /// model dump. Idempotent: calling it again once disabled is a no-op.
    pub fn finalize(&mut self) -> Result<(), PredictorError> {
        if !self.enabled {
            return Ok(());
        }
        self.dictionary.close()?;
        if let Some(path) = &self.model_path {
            let mut f = File::create(path)?;
            write!(f, "{}", self.oracle.render_rules())?;
        }
        if let Some(w) = self.operations_log.as_mut() {
            w.flush()?;
        }
        self.enabled = false;
        debug!("tracer finalized: {} distinct symbols observed", self.dictionary.len());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(n: u64) -> CallingContext {
        CallingContext::new(vec![n]).unwrap()
    }

    #[test]
    fn bracketing_rejects_overlapping_starts() {
        let mut tracer = Tracer::in_memory();
        tracer
            .write_start(ctx(1), ApiType::Posix, FileHandle(1), 0, 16)
            .unwrap();
        let err = tracer
            .write_start(ctx(1), ApiType::Posix, FileHandle(1), 0, 16)
            .unwrap_err();
        assert!(matches!(err, PredictorError::BracketingViolation { .. }));
    }

    #[test]
    fn bracketing_rejects_end_without_start() {
        let mut tracer = Tracer::in_memory();
        let err = tracer.write_end(true).unwrap_err();
        assert!(matches!(err, PredictorError::BracketingViolation { .. }));
    }

    #[test]
    fn predict_next_is_empty_before_any_repetition() {
        let mut tracer = Tracer::in_memory();
        tracer
            .write_start(ctx(1), ApiType::Posix, FileHandle(1), 0, 16)
            .unwrap();
        tracer.write_end(true).unwrap();
        assert!(tracer.predict_next().unwrap().is_empty());
    }

    #[test]
    fn predict_next_rejects_call_while_in_op() {
        let mut tracer = Tracer::in_memory();
        tracer
            .write_start(ctx(1), ApiType::Posix, FileHandle(1), 0, 16)
            .unwrap();
        let err = tracer.predict_next().unwrap_err();
        assert!(matches!(err, PredictorError::BracketingViolation { .. }));
    }

    #[test]
    fn periodic_sequential_writes_predict_size_and_offset() {
        let mut tracer = Tracer::in_memory();
        let contexts = [ctx(1), ctx(2)];
        let mut offset = 0i64;
        for _ in 0..6 {
            for c in &contexts {
                tracer
                    .write_start(c.clone(), ApiType::Posix, FileHandle(1), offset, 4096)
                    .unwrap();
                tracer.write_end(true).unwrap();
                offset += 4096;
            }
        }
        let predictions = tracer.predict_next().unwrap();
        assert!(!predictions.is_empty());
        let p = &predictions[0];
        assert_eq!(p.op_type, Some(OpType::Write));
        assert_eq!(p.size, Some(4096));
    }

    #[test]
    fn finalize_is_idempotent() {
        let mut tracer = Tracer::in_memory();
        tracer.finalize().unwrap();
        tracer.finalize().unwrap();
    }

    #[test]
    fn suppressed_self_tracing_does_not_advance_the_grammar() {
        // Simulates an interception shim that wraps the tracer's own
        // dictionary/log writes: while suppressed, entry points must be a
        // pure no-op rather than feeding the call back into the oracle.
        let mut tracer = Tracer::in_memory();
        tracer
            .write_start(ctx(1), ApiType::Posix, FileHandle(1), 0, 16)
            .unwrap();
        tracer.write_end(true).unwrap();

        let oracle_len_before = tracer.oracle.len();
        let dict_len_before = tracer.dictionary.len();

        tracer.suppress_self_tracing.set(true);
        tracer
            .write_start(ctx(2), ApiType::Posix, FileHandle(2), 0, 16)
            .unwrap();
        tracer.write_end(true).unwrap();
        tracer.suppress_self_tracing.set(false);

        assert_eq!(tracer.oracle.len(), oracle_len_before);
        assert_eq!(tracer.dictionary.len(), dict_len_before);
    }

    #[test]
    fn disabled_tracer_is_a_no_op() {
        let config = Config {
            disabled: true,
            ..Config::default()
        };
        let mut tracer = Tracer::init(&config, 0, 1, 0).unwrap();

        assert!(tracer
            .write_start(ctx(1), ApiType::Posix, FileHandle(1), 0, 16)
            .is_ok());
        assert!(tracer.write_end(true).is_ok());
        assert!(tracer.predict_next().unwrap().is_empty());
        assert!(tracer.operations_log.is_none());
        assert!(tracer.model_path.is_none());
        assert_eq!(tracer.dictionary.len(), 0);

        tracer.finalize().unwrap();
    }
}
