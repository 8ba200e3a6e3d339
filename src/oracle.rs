//! The grammar oracle: an online Sequitur grammar over calling-context
//! symbols, augmented with *predictor marks* so the next symbol can be
//! guessed without replaying the whole input.
//!
//! Grounded in `dylanjwolff-sequitur-rs`'s `grammar`/`sequitur` pair (the
//! compression engine and its invariants) and in the original C++
//! `sequitur::oracle`/`sequitur::symbols` classes (the predictor-mark
//! extension itself, which the teacher does not implement). The two-pass
//! shadow-then-commit structure of `compute_next_predictors`/
//! `update_predictors` is kept; the per-node shadow fields of the original
//! (raw pointers on an intrusive list) are replaced by a `PredictorShadow`
//! side table keyed by `DefaultKey`, since a `SlotMap` arena has no room to
//! bolt on algorithm-local scratch fields directly onto a node.
//!
//! Predictor state itself — `is_predictor`, `predictors` — lives on
//! [`crate::symbol::SymbolNode`] as a genuine *set* of simultaneously-live
//! positions (ported from `symbols::is_predictor`/`symbols::predictors`),
//! not a single cursor: a rule can be entered from several contexts at
//! once, and re-seeding after the grammar forgets everything can promote
//! more than one occurrence in a single step. `root` plays the role of the
//! original's `oracle::root` — a virtual reference to rule 0 registered as
//! rule 0's own permanent user, so propagation through `become_predictor_up`
//! reaches it the same way it reaches any other context that uses rule 0.

use crate::error::PredictorError;
use crate::grammar::Grammar;
use crate::symbol::{Symbol, SymbolHash, SymbolNode};
use ahash::{AHashMap, AHashSet};
use slotmap::DefaultKey;
use std::hash::Hash;

/// Per-node scratch state for one `compute_next_predictors`/
/// `update_predictors` pass (`symbols::next_is_predictor`/
/// `next_predictors`/`next_new_predictor`/`next_stay_predictor` in the
/// original, pulled off the node and into a side table since `SymbolNode`
/// has no room for pass-local scratch fields).
#[derive(Debug, Default)]
struct PredictorShadow {
    next_new_predictor: AHashSet<DefaultKey>,
    next_stay_predictor: AHashSet<DefaultKey>,
    next_is_predictor: bool,
    next_return: u8,
}

/// An online grammar oracle over a stream of `T` symbols.
pub(crate) struct Oracle<T> {
    grammar: Grammar<T>,
    /// Virtual `RuleRef` to rule 0, registered as rule 0's sole permanent
    /// user. The apex every predictor mark eventually propagates to.
    root: DefaultKey,
    sequence_end: DefaultKey,
    length: usize,
    version: u64,
    shadow: AHashMap<DefaultKey, PredictorShadow>,
}

impl<T: Hash + Eq + Clone> Oracle<T> {
    pub(crate) fn new() -> Self {
        let mut grammar = Grammar::new();
        let rule_id = grammar.id_gen.get();
        debug_assert_eq!(rule_id, 0, "first rule is always rule 0");

        let tail_key = grammar.symbols.insert(SymbolNode::new(Symbol::RuleTail));
        let head_key = grammar.symbols.insert(SymbolNode::new(Symbol::RuleHead {
            rule_id,
            count: 0,
            tail: tail_key,
            users: AHashSet::default(),
        }));
        grammar.symbols[head_key].next = Some(tail_key);
        grammar.symbols[tail_key].prev = Some(head_key);
        grammar.rule_index.insert(rule_id, head_key);

        let root = grammar
            .symbols
            .insert(SymbolNode::new(Symbol::RuleRef { rule_id }));
        if let Symbol::RuleHead { count, users, .. } = &mut grammar.symbols[head_key].symbol {
            *count += 1;
            users.insert(root);
        }

        Self {
            grammar,
            root,
            sequence_end: tail_key,
            length: 0,
            version: 0,
            shadow: AHashMap::default(),
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.length
    }

    pub(crate) fn version(&self) -> u64 {
        self.version
    }

    /// Exposes the underlying grammar arena for invariant checks in the
    /// property-test suite (digram uniqueness, rule utility). Not needed by
    /// production code, which only ever drives the oracle through `input`/
    /// `predict_next`.
    #[cfg(test)]
    pub(crate) fn grammar(&self) -> &Grammar<T> {
        &self.grammar
    }

    /// A versioned, read-only walk of the grammar in fully expanded
    /// (decompressed) terminal order, captured at this instant
    /// (`oracle::iterator`).
    #[cfg_attr(not(test), allow(dead_code))]
    pub(crate) fn iter(&self) -> OracleIter<'_, T> {
        OracleIter::new(self)
    }

    /// Feeds one symbol into the grammar, maintaining both the Sequitur
    /// invariants and the live predictor set.
    pub(crate) fn input(&mut self, value: T) {
        self.advance(&value);

        let mut node = SymbolNode::new(Symbol::Value(value.clone()));
        node.owner = Some(0);
        let new_key = self.grammar.symbols.insert(node);
        let tail_key = self.sequence_end;
        let prev_key = self.grammar.symbols[tail_key].prev;

        self.grammar.symbols[new_key].next = Some(tail_key);
        self.grammar.symbols[new_key].prev = prev_key;
        self.grammar.symbols[tail_key].prev = Some(new_key);
        if let Some(prev) = prev_key {
            self.grammar.symbols[prev].next = Some(new_key);
        }

        self.length += 1;

        if self.length > 1 {
            if let Some(prev) = prev_key {
                if !matches!(self.grammar.symbols[prev].symbol, Symbol::RuleHead { .. }) {
                    self.grammar.link_made(prev);
                }
            }
        }

        // `link_made` may have folded the node just inserted into a rule,
        // freeing its arena slot and replacing it (and whatever it folded
        // with) with a single `RuleRef` earlier in the sequence — `new_key`
        // itself can no longer be trusted here. Folding only ever absorbs
        // *earlier* symbols into a rule, though, so whatever unit now sits
        // immediately before the sequence tail still ends with the value
        // just input; that unit's key is the one worth remembering.
        let current_key = self
            .grammar
            .symbols
            .get(tail_key)
            .and_then(|n| n.prev)
            .expect("sequence has at least one symbol right after insertion");

        // Re-seed once the root itself stops being a predictor
        // (`oracle::input`'s `if(! root->is_pred())` branch): scan every
        // rule body for a prior occurrence of whatever now sits at
        // `current_key` (a raw value match, or — if this input just got
        // folded into a rule — a match against another instance of that
        // same rule), promote any hit, then advance once more so the
        // freshly promoted positions consume the occurrence they were
        // seeded from and point at what follows it instead.
        if !self.grammar.symbols[self.root].is_predictor {
            let matching = self.grammar.symbols[current_key].symbol.clone_symbol();
            self.grammar.find_new_predictors(current_key, &matching);
            self.advance(&value);
        }

        self.version += 1;
    }

    /// Runs one shadow-then-commit pass of `compute_next_predictors`/
    /// `update_predictors` rooted at `self.root`, matching against `value`.
    fn advance(&mut self, value: &T) {
        self.shadow.clear();
        self.compute_next_predictors(self.root, value);
        self.update_predictors(self.root);
    }

    /// Shadow pass (`symbols::compute_next_predictors`). Returns one of:
    /// - `0`: this position no longer predicts anything.
    /// - `1`: this position stays a predictor.
    /// - `2`: this position just matched and has nothing further to watch
    ///   for at this nesting level (its parent should look past it).
    /// - `3`: a mix of `1` and `2` from different children of the same
    ///   non-terminal (the bits are accumulated with bitwise-or, exactly as
    ///   in the original — there is no separate "case 3").
    fn compute_next_predictors(&mut self, key: DefaultKey, value: &T) -> u8 {
        if let Some(cached) = self.shadow.get(&key) {
            return cached.next_return;
        }
        if !self.grammar.symbols[key].is_predictor {
            return 0;
        }

        if let Symbol::Value(v) = &self.grammar.symbols[key].symbol {
            let matched = v == value;
            self.grammar.predictions.remove(&key);
            let shadow = PredictorShadow {
                next_return: if matched { 2 } else { 0 },
                ..Default::default()
            };
            let ret = shadow.next_return;
            self.shadow.insert(key, shadow);
            return ret;
        }

        // Non-terminal (or the root anchor): recurse into current children.
        let children: Vec<DefaultKey> = self.grammar.symbols[key].predictors.iter().copied().collect();
        let mut shadow = PredictorShadow::default();
        let mut next_return = 0u8;

        for child in children {
            let r = self.compute_next_predictors(child, value);
            match r {
                0 => {}
                1 => {
                    shadow.next_stay_predictor.insert(child);
                    next_return |= 1;
                }
                2 => {
                    if self.child_next_is_guard(child) {
                        next_return |= 2;
                    } else {
                        let succ = self.grammar.symbols[child].next.unwrap();
                        shadow.next_new_predictor.insert(succ);
                        next_return |= 1;
                    }
                }
                3 => {
                    next_return |= 1;
                    shadow.next_stay_predictor.insert(child);
                    if self.child_next_is_guard(child) {
                        next_return |= 2;
                    } else {
                        let succ = self.grammar.symbols[child].next.unwrap();
                        shadow.next_new_predictor.insert(succ);
                    }
                }
                _ => unreachable!("compute_next_predictors only returns 0..=3"),
            }
        }

        shadow.next_is_predictor =
            !(shadow.next_stay_predictor.is_empty() && shadow.next_new_predictor.is_empty());
        shadow.next_return = next_return;
        self.shadow.insert(key, shadow);
        next_return
    }

    fn child_next_is_guard(&self, child: DefaultKey) -> bool {
        match self.grammar.symbols[child].next {
            Some(next) => matches!(self.grammar.symbols[next].symbol, Symbol::RuleTail),
            None => true,
        }
    }

    /// Commit pass (`symbols::update_predictors`). Recurses into the
    /// *current* children before overwriting them, so a shared child
    /// already committed via one parent short-circuits (the shadow entry
    /// is consumed on first visit) instead of being processed twice.
    fn update_predictors(&mut self, key: DefaultKey) {
        if !self.grammar.symbols[key].is_predictor {
            return;
        }
        let Some(shadow) = self.shadow.remove(&key) else {
            return;
        };

        let children: Vec<DefaultKey> = self.grammar.symbols[key].predictors.iter().copied().collect();
        for child in children {
            self.update_predictors(child);
        }

        for &new_pred in &shadow.next_new_predictor {
            self.grammar.become_predictor_down_left(new_pred);
        }

        self.grammar.symbols[key].is_predictor = shadow.next_is_predictor;
        if shadow.next_is_predictor {
            let mut set = shadow.next_new_predictor;
            set.extend(shadow.next_stay_predictor);
            self.grammar.symbols[key].predictors = set;
        } else {
            self.grammar.symbols[key].predictors.clear();
            self.grammar.predictions.remove(&key);
        }
    }

    /// Distinct terminal values predicted to follow next, deduplicated.
    pub(crate) fn predict_next(&self) -> Vec<T> {
        let mut seen = AHashSet::default();
        let mut out = Vec::new();
        for &key in &self.grammar.predictions {
            let Some(node) = self.grammar.symbols.get(key) else {
                continue;
            };
            if let Symbol::Value(v) = &node.symbol {
                let hash = SymbolHash::from_symbol(&Symbol::Value(v.clone()));
                if seen.insert(hash) {
                    out.push(v.clone());
                }
            }
        }
        out
    }

    /// Textual grammar dump in the original's `[<id>] -> <body>` form, one
    /// rule per line, ordered by rule id. Used for the `…model` file.
    pub(crate) fn render_rules(&self) -> String
    where
        T: std::fmt::Display,
    {
        let mut ids: Vec<_> = self.grammar.rule_index.keys().copied().collect();
        ids.sort_unstable();

        let mut out = String::new();
        for id in ids {
            let head = self.grammar.rule_index[&id];
            out.push_str(&format!("[{id}] ->"));
            let mut current = self.grammar.symbols[head].next;
            while let Some(key) = current {
                match &self.grammar.symbols[key].symbol {
                    Symbol::Value(v) => out.push_str(&format!(" {v}")),
                    Symbol::RuleRef { rule_id } => out.push_str(&format!(" [{rule_id}]")),
                    Symbol::RuleTail => break,
                    Symbol::RuleHead { .. } => unreachable!("rule body cannot contain a head"),
                }
                current = self.grammar.symbols[key].next;
            }
            out.push('\n');
        }
        out
    }
}

impl<T: Hash + Eq + Clone> Default for Oracle<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Walks the oracle's grammar in fully expanded terminal order, descending
/// into rule references as it goes. Captures `version` at construction and
/// fails on the next call once the oracle has mutated (`oracle::iterator`,
/// whose `invalid_iterator` exception becomes a `Result` here).
pub(crate) struct OracleIter<'a, T> {
    oracle: &'a Oracle<T>,
    version: u64,
    stack: Vec<DefaultKey>,
}

impl<'a, T: Hash + Eq + Clone> OracleIter<'a, T> {
    fn new(oracle: &'a Oracle<T>) -> Self {
        let mut stack = Vec::new();
        if let Some(&head) = oracle.grammar.rule_index.get(&0) {
            Self::push_if_live(oracle, &mut stack, oracle.grammar.symbols[head].next);
        }
        Self {
            oracle,
            version: oracle.version,
            stack,
        }
    }

    fn push_if_live(oracle: &Oracle<T>, stack: &mut Vec<DefaultKey>, key: Option<DefaultKey>) {
        if let Some(key) = key {
            if !matches!(oracle.grammar.symbols[key].symbol, Symbol::RuleTail) {
                stack.push(key);
            }
        }
    }

    /// Returns the next terminal value in expansion order, `Ok(None)` once
    /// exhausted, or `Err` if the oracle mutated since this iterator was
    /// created.
    pub(crate) fn next(&mut self) -> Result<Option<T>, PredictorError> {
        if self.version != self.oracle.version {
            return Err(PredictorError::StaleIterator);
        }

        loop {
            let Some(key) = self.stack.pop() else {
                return Ok(None);
            };
            match &self.oracle.grammar.symbols[key].symbol {
                Symbol::Value(v) => {
                    Self::push_if_live(self.oracle, &mut self.stack, self.oracle.grammar.symbols[key].next);
                    return Ok(Some(v.clone()));
                }
                Symbol::RuleRef { rule_id } => {
                    Self::push_if_live(self.oracle, &mut self.stack, self.oracle.grammar.symbols[key].next);
                    if let Some(&head) = self.oracle.grammar.rule_index.get(rule_id) {
                        let first = self.oracle.grammar.symbols[head].next;
                        Self::push_if_live(self.oracle, &mut self.stack, first);
                    }
                }
                Symbol::RuleHead { .. } | Symbol::RuleTail => {
                    // Not reachable by chasing `next` from a body position;
                    // skip rather than panic on an otherwise-malformed walk.
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_oracle_predicts_nothing() {
        let oracle: Oracle<u32> = Oracle::new();
        assert!(oracle.predict_next().is_empty());
    }

    #[test]
    fn first_occurrence_has_no_prediction() {
        let mut oracle = Oracle::new();
        oracle.input(7u32);
        assert!(oracle.predict_next().is_empty());
    }

    #[test]
    fn periodic_stream_predicts_the_repeating_successor() {
        // a, b, a, b, a, b, ... once the pattern repeats the oracle should
        // start predicting 'b' right after an 'a' and vice versa.
        let mut oracle = Oracle::new();
        for &v in &[1u32, 2, 1, 2, 1, 2, 1] {
            oracle.input(v);
        }
        let predicted = oracle.predict_next();
        assert!(!predicted.is_empty(), "a periodic stream should yield a prediction");
        assert!(predicted.contains(&2));
    }

    #[test]
    fn version_advances_on_every_input() {
        let mut oracle = Oracle::new();
        let v0 = oracle.version();
        oracle.input(1u32);
        assert!(oracle.version() > v0);
    }

    #[test]
    fn iterator_replays_the_input_in_order() {
        let mut oracle = Oracle::new();
        for &v in &[1u32, 2, 3, 1, 2, 3] {
            oracle.input(v);
        }
        let mut iter = oracle.iter();
        let mut collected = Vec::new();
        while let Some(v) = iter.next().unwrap() {
            collected.push(v);
        }
        assert_eq!(collected, vec![1, 2, 3, 1, 2, 3]);
    }

    #[test]
    fn iterator_goes_stale_after_a_mutation() {
        let mut oracle = Oracle::new();
        oracle.input(1u32);
        let mut iter = oracle.iter();
        oracle.input(2u32);
        assert!(matches!(iter.next(), Err(PredictorError::StaleIterator)));
    }
}
