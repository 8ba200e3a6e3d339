//! Running statistics over the wall-clock gap between two operations,
//! keyed by the `(previous symbol, next symbol)` pair.
//!
//! The online mean/variance update is Welford's algorithm, ported verbatim
//! from the original `stats<T>` template in `stats/stats.hpp`. The "adapted
//! mean" blending a short sliding window with the long-run mean is this
//! crate's own resolution of an open question the distilled specification
//! left unanswered (see `DESIGN.md`): recent transitions should count for
//! more than the lifetime average without discarding history entirely.

use ahash::AHashMap;
use std::collections::VecDeque;

const WINDOW: usize = 8;

#[derive(Debug, Clone)]
struct Stat {
    count: u64,
    mean: f64,
    variance: f64,
    min: f64,
    max: f64,
    window: VecDeque<f64>,
}

impl Stat {
    fn new(x: f64) -> Self {
        let mut window = VecDeque::with_capacity(WINDOW);
        window.push_back(x);
        Self {
            count: 1,
            mean: x,
            variance: 0.0,
            min: x,
            max: x,
            window,
        }
    }

    /// `stats<T>::push` from the original: a single-pass update of the
    /// running mean and variance.
    fn observe(&mut self, x: f64) {
        let n = self.count as f64;
        self.variance += self.mean * self.mean;
        self.mean = (n * self.mean + x) / (n + 1.0);
        self.variance = (n * self.variance + x * x) / (n + 1.0) - self.mean * self.mean;
        self.count += 1;
        self.min = self.min.min(x);
        self.max = self.max.max(x);

        if self.window.len() == WINDOW {
            self.window.pop_front();
        }
        self.window.push_back(x);
    }

    fn adapted_mean(&self) -> f64 {
        let window_mean = self.window.iter().sum::<f64>() / self.window.len() as f64;
        0.5 * window_mean + 0.5 * self.mean
    }
}

/// Per-transition delay statistics, keyed by the symbol pair the transition
/// was observed on.
pub(crate) struct TransitionTimeStats {
    table: AHashMap<(u32, u32), Stat>,
}

impl TransitionTimeStats {
    pub(crate) fn new() -> Self {
        Self {
            table: AHashMap::default(),
        }
    }

    pub(crate) fn observe(&mut self, prev: u32, next: u32, elapsed_secs: f64) {
        match self.table.get_mut(&(prev, next)) {
            Some(stat) => stat.observe(elapsed_secs),
            None => {
                self.table.insert((prev, next), Stat::new(elapsed_secs));
            }
        }
    }

    /// Predicted delay before `next` follows `prev`: a blend of the recent
    /// window and the all-time mean, or `None` if the pair was never seen.
    pub(crate) fn adapted(&self, prev: u32, next: u32) -> Option<f64> {
        self.table.get(&(prev, next)).map(Stat::adapted_mean)
    }

    #[cfg(test)]
    fn mean(&self, prev: u32, next: u32) -> Option<f64> {
        self.table.get(&(prev, next)).map(|s| s.mean)
    }

    #[cfg(test)]
    fn count(&self, prev: u32, next: u32) -> u64 {
        self.table.get(&(prev, next)).map(|s| s.count).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unseen_pair_has_no_prediction() {
        let stats = TransitionTimeStats::new();
        assert_eq!(stats.adapted(1, 2), None);
    }

    #[test]
    fn single_observation_mean_is_the_observation() {
        let mut stats = TransitionTimeStats::new();
        stats.observe(1, 2, 0.5);
        assert_eq!(stats.mean(1, 2), Some(0.5));
        assert_eq!(stats.count(1, 2), 1);
    }

    #[test]
    fn constant_delay_converges_to_itself() {
        let mut stats = TransitionTimeStats::new();
        for _ in 0..20 {
            stats.observe(1, 2, 1.0);
        }
        let adapted = stats.adapted(1, 2).unwrap();
        assert!((adapted - 1.0).abs() < 1e-9, "adapted = {adapted}");
    }

    #[test]
    fn different_pairs_are_tracked_independently() {
        let mut stats = TransitionTimeStats::new();
        stats.observe(1, 2, 1.0);
        stats.observe(3, 4, 9.0);
        assert_eq!(stats.mean(1, 2), Some(1.0));
        assert_eq!(stats.mean(3, 4), Some(9.0));
    }
}
