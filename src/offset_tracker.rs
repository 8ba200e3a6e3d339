//! Per-transition offset tracker: predicts where the next read/write will
//! land relative to the one before it, keyed by the `(previous symbol,
//! next symbol)` pair.
//!
//! Grounded on the original `offsets.hpp`'s `offset_op`/`simple_offset`/
//! `gram_offset`/`follow_offset` hierarchy and on [`crate::size_tracker`]'s
//! monotone ladder (`dylanjwolff-sequitur-rs`'s `grammar`/`sequitur` engine
//! is reused the same way, through [`crate::oracle::Oracle`]). Unlike the
//! size ladder this one only has three rungs and never drops back to
//! `Grammar` once it reaches `Follow`.

use crate::oracle::Oracle;
use ahash::AHashMap;
use std::cmp::Ordering;

/// How an observed offset relates to the position the previous operation on
/// the same symbol pair left off at (`previous_offset + previous_size`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OffsetDescriptor {
    /// Exactly where the previous operation ended: sequential access.
    Following,
    /// A fixed byte offset (seeks back to a constant position, e.g. a header).
    Absolute(i64),
    /// An offset relative to the following position (a constant stride).
    Relative(i64),
}

impl OffsetDescriptor {
    /// Classifies an observed offset against the position the previous
    /// operation on this pair left off at.
    pub(crate) fn classify(prev_offset: i64, prev_size: i64, observed: i64) -> Self {
        let following = prev_offset + prev_size;
        if observed == following {
            OffsetDescriptor::Following
        } else if observed == 0 {
            OffsetDescriptor::Absolute(0)
        } else {
            OffsetDescriptor::Relative(observed - following)
        }
    }

    /// Resolves this descriptor back into a concrete byte offset, given the
    /// position the previous operation left off at.
    pub fn resolve(&self, prev_offset: i64, prev_size: i64) -> i64 {
        let following = prev_offset + prev_size;
        match self {
            OffsetDescriptor::Following => following,
            OffsetDescriptor::Absolute(v) => *v,
            OffsetDescriptor::Relative(v) => following + v,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            OffsetDescriptor::Following => 0,
            OffsetDescriptor::Absolute(_) => 1,
            OffsetDescriptor::Relative(_) => 2,
        }
    }
}

impl PartialOrd for OffsetDescriptor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for OffsetDescriptor {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.rank().cmp(&other.rank()) {
            Ordering::Equal => {
                let value = |d: &Self| match d {
                    OffsetDescriptor::Absolute(v) | OffsetDescriptor::Relative(v) => *v,
                    OffsetDescriptor::Following => 0,
                };
                value(self).cmp(&value(other))
            }
            other => other,
        }
    }
}

const GRAMMAR_TO_FOLLOW_THRESHOLD: usize = 24;

enum State {
    Simple {
        descriptor: OffsetDescriptor,
        occurrences: u64,
    },
    Grammar(GrammarOffset),
    /// The pair has seen enough distinct offset patterns that tracking them
    /// individually stopped paying for itself; always predict `Following`.
    Follow,
}

/// Tracks the sequence of offset descriptors observed for one `(previous
/// symbol, next symbol)` pair and predicts the next one.
pub(crate) struct OffsetTracker(State);

impl OffsetTracker {
    pub(crate) fn new() -> Self {
        Self(State::Simple {
            descriptor: OffsetDescriptor::Following,
            occurrences: 0,
        })
    }

    pub(crate) fn input(&mut self, descriptor: OffsetDescriptor) {
        match &mut self.0 {
            State::Simple {
                descriptor: d,
                occurrences,
            } if *occurrences == 0 => {
                *d = descriptor;
                *occurrences = 1;
            }
            State::Simple {
                descriptor: d,
                occurrences,
            } => {
                if *d == descriptor {
                    *occurrences += 1;
                } else {
                    let mut grammar = GrammarOffset::from_simple(*d, *occurrences);
                    grammar.input(descriptor);
                    self.0 = State::Grammar(grammar);
                }
            }
            State::Grammar(grammar) => {
                grammar.input(descriptor);
                if grammar.occ_map.len() > GRAMMAR_TO_FOLLOW_THRESHOLD {
                    self.0 = State::Follow;
                }
            }
            State::Follow => {}
        }
    }

    pub(crate) fn predict(&self) -> OffsetDescriptor {
        match &self.0 {
            State::Simple { descriptor, .. } => *descriptor,
            State::Grammar(grammar) => grammar.predict(),
            State::Follow => OffsetDescriptor::Following,
        }
    }
}

/// Offset descriptors observed so far, re-expressed as a symbol stream fed
/// to an [`Oracle`] so a repeating access pattern (e.g. a strided scan) can
/// be predicted instead of just the most frequent descriptor.
struct GrammarOffset {
    offset_ids: AHashMap<OffsetDescriptor, u32>,
    occ_map: AHashMap<OffsetDescriptor, u64>,
    symbols_offset: AHashMap<u32, OffsetDescriptor>,
    next_symbol: u32,
    last: OffsetDescriptor,
    oracle: Oracle<u32>,
}

impl GrammarOffset {
    fn from_simple(descriptor: OffsetDescriptor, occurrences: u64) -> Self {
        let mut offset_ids = AHashMap::default();
        let mut symbols_offset = AHashMap::default();
        let mut occ_map = AHashMap::default();
        offset_ids.insert(descriptor, 0u32);
        symbols_offset.insert(0u32, descriptor);
        occ_map.insert(descriptor, occurrences);

        let mut oracle = Oracle::new();
        for _ in 0..occurrences {
            oracle.input(0u32);
        }

        Self {
            offset_ids,
            occ_map,
            symbols_offset,
            next_symbol: 1,
            last: descriptor,
            oracle,
        }
    }

    fn input(&mut self, descriptor: OffsetDescriptor) {
        self.last = descriptor;
        let symbol = match self.offset_ids.get(&descriptor) {
            Some(&s) => {
                *self.occ_map.get_mut(&descriptor).unwrap() += 1;
                s
            }
            None => {
                let s = self.next_symbol;
                self.next_symbol += 1;
                self.offset_ids.insert(descriptor, s);
                self.symbols_offset.insert(s, descriptor);
                self.occ_map.insert(descriptor, 1);
                s
            }
        };
        self.oracle.input(symbol);
    }

    /// Predicts the next descriptor only when the oracle narrows it down to
    /// exactly one candidate; otherwise falls back to whatever was observed
    /// last, mirroring the original `gram_offset::predict`.
    fn predict(&self) -> OffsetDescriptor {
        match self.oracle.predict_next().as_slice() {
            [only] => self.symbols_offset[only],
            _ => self.last,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_stride_predicts_following_by_default() {
        let tracker = OffsetTracker::new();
        assert_eq!(tracker.predict(), OffsetDescriptor::Following);
    }

    #[test]
    fn repeated_offset_keeps_predicting_it() {
        let mut tracker = OffsetTracker::new();
        for _ in 0..5 {
            tracker.input(OffsetDescriptor::Relative(4096));
        }
        assert_eq!(tracker.predict(), OffsetDescriptor::Relative(4096));
    }

    #[test]
    fn classify_detects_contiguous_access() {
        let descriptor = OffsetDescriptor::classify(0, 4096, 4096);
        assert_eq!(descriptor, OffsetDescriptor::Following);
        assert_eq!(descriptor.resolve(0, 4096), 4096);
    }

    #[test]
    fn classify_detects_fixed_header_rewind() {
        let descriptor = OffsetDescriptor::classify(4096, 4096, 0);
        assert_eq!(descriptor, OffsetDescriptor::Absolute(0));
        assert_eq!(descriptor.resolve(4096, 4096), 0);
    }

    #[test]
    fn many_distinct_offsets_fall_back_to_following() {
        let mut tracker = OffsetTracker::new();
        for i in 0..30i64 {
            tracker.input(OffsetDescriptor::Relative(i));
        }
        assert_eq!(tracker.predict(), OffsetDescriptor::Following);
    }
}
