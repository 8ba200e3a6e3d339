//! Calling contexts: the ordered sequence of caller return addresses that
//! identifies *where* in the application an I/O call was issued from.
//!
//! Capturing the stack itself (unwinding, symbol demangling) is the
//! interception layer's job and stays out of scope here, matching the
//! original's `trace.cpp` (kept only as a reference for the depth bound —
//! `trace t(256)` in `omniscio.cpp`). This module just models the sequence
//! once the caller has produced it.

/// Maximum number of return addresses kept per calling context, matching
/// the `trace(256)` bound used throughout `omniscio.cpp`'s `*_start` entry
/// points.
pub const MAX_CONTEXT_DEPTH: usize = 256;

/// An ordered, non-empty sequence of caller return addresses.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CallingContext(Vec<u64>);

impl CallingContext {
    /// Builds a calling context from caller-supplied return addresses,
    /// truncating to [`MAX_CONTEXT_DEPTH`] frames (closest frames first).
    ///
    /// Returns `None` for an empty sequence — an empty call stack is
    /// always a caller error (`PredictorError::EmptyCallStack`).
    pub fn new(frames: impl Into<Vec<u64>>) -> Option<Self> {
        let mut frames = frames.into();
        if frames.is_empty() {
            return None;
        }
        frames.truncate(MAX_CONTEXT_DEPTH);
        Some(Self(frames))
    }

    pub fn frames(&self) -> &[u64] {
        &self.0
    }

    /// Renders the context as space-separated hex addresses, the format
    /// persisted to the `…dict` file.
    pub fn render(&self) -> String {
        self.0
            .iter()
            .map(|f| format!("{f:x}"))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_context() {
        assert!(CallingContext::new(Vec::<u64>::new()).is_none());
    }

    #[test]
    fn truncates_to_max_depth() {
        let frames: Vec<u64> = (0..300).collect();
        let ctx = CallingContext::new(frames).unwrap();
        assert_eq!(ctx.frames().len(), MAX_CONTEXT_DEPTH);
    }

    #[test]
    fn renders_as_hex() {
        let ctx = CallingContext::new(vec![0x1a, 0x2b]).unwrap();
        assert_eq!(ctx.render(), "1a 2b");
    }
}
