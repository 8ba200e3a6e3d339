use crate::id_gen::IdGenerator;
use crate::symbol::{Symbol, SymbolHash, SymbolNode};
use ahash::AHashMap as HashMap;
use ahash::AHashSet as HashSet;
use slotmap::{DefaultKey, SlotMap};
use std::collections::hash_map::Entry;
use std::hash::Hash;

/// A bundle of mutable references to all grammar fields.
///
/// This struct enables simultaneous mutable access to different fields,
/// working around Rust's borrow checker limitations with trait methods.
/// The algorithm is implemented as methods on this struct.
pub(crate) struct GrammarFields<'a, T> {
    pub symbols: &'a mut SlotMap<DefaultKey, SymbolNode<T>>,
    pub digram_index: &'a mut HashMap<(SymbolHash, SymbolHash), DefaultKey>,
    pub rule_index: &'a mut HashMap<u32, DefaultKey>,
    pub id_gen: &'a mut IdGenerator,
    /// Terminal leaf positions currently predicted (`oracle::predictions`).
    /// Lives here, not on the oracle, because it is mutated from the same
    /// fold/inline operations that mutate `is_predictor`/`predictors`.
    pub predictions: &'a mut HashSet<DefaultKey>,
}

/// Trait for types that provide grammar storage.
///
/// This trait enables zero-cost code sharing between the main oracle's
/// grammar and the embedded grammars the size/offset trackers each keep.
pub(crate) trait GrammarOps<T> {
    fn fields(&mut self) -> GrammarFields<'_, T>;
}

/// Owned grammar storage: the arena of symbol nodes plus the two indices
/// and the rule-id allocator that [`GrammarFields`] borrows from.
///
/// Every grammar instance this crate embeds (the main calling-context
/// stream, and the small inner grammars kept by the size and offset
/// trackers) is one of these.
#[derive(Debug)]
pub(crate) struct Grammar<T> {
    pub(crate) symbols: SlotMap<DefaultKey, SymbolNode<T>>,
    pub(crate) digram_index: HashMap<(SymbolHash, SymbolHash), DefaultKey>,
    pub(crate) rule_index: HashMap<u32, DefaultKey>,
    pub(crate) id_gen: IdGenerator,
    pub(crate) predictions: HashSet<DefaultKey>,
}

impl<T> Grammar<T> {
    pub(crate) fn new() -> Self {
        Self {
            symbols: SlotMap::new(),
            digram_index: HashMap::default(),
            rule_index: HashMap::default(),
            id_gen: IdGenerator::new(),
            predictions: HashSet::default(),
        }
    }
}

impl<T> GrammarOps<T> for Grammar<T> {
    #[inline(always)]
    fn fields(&mut self) -> GrammarFields<'_, T> {
        GrammarFields {
            symbols: &mut self.symbols,
            digram_index: &mut self.digram_index,
            rule_index: &mut self.rule_index,
            id_gen: &mut self.id_gen,
            predictions: &mut self.predictions,
        }
    }
}

impl<T: Hash + Eq + Clone> Grammar<T> {
    #[inline]
    pub(crate) fn link_made(&mut self, first_key: DefaultKey) {
        self.fields().link_made(first_key)
    }

    #[inline]
    pub(crate) fn expand_rule_if_necessary(&mut self, potential_rule: DefaultKey) {
        self.fields().expand_rule_if_necessary(potential_rule)
    }

    #[inline]
    pub(crate) fn become_predictor_down_left(&mut self, key: DefaultKey) {
        self.fields().become_predictor_down_left(key)
    }

    #[inline]
    pub(crate) fn become_predictor_down_right(&mut self, key: DefaultKey) {
        self.fields().become_predictor_down_right(key)
    }

    #[inline]
    pub(crate) fn become_predictor_up(&mut self, key: DefaultKey, child: DefaultKey) {
        self.fields().become_predictor_up(key, child)
    }

    #[inline]
    pub(crate) fn find_new_predictors(&mut self, skip: DefaultKey, matching: &Symbol<T>) {
        self.fields().find_new_predictors(skip, matching)
    }
}

impl<'a, T: Hash + Eq + Clone> GrammarFields<'a, T> {
    // ========================================================================
    // Digram Operations
    // ========================================================================

    /// Finds an existing digram or adds it to the index.
    ///
    /// Returns Some(key) if a non-overlapping match exists, None otherwise.
    #[inline]
    pub fn find_and_add_digram(
        &mut self,
        first: DefaultKey,
        second: DefaultKey,
    ) -> Option<DefaultKey> {
        debug_assert!(
            self.symbols[first].next == Some(second),
            "Digram must be consecutive symbols"
        );

        // Don't create digrams starting/ending with sentinel nodes
        if is_sequence_start(&self.symbols[first].symbol)
            || is_sequence_end(&self.symbols[second].symbol)
        {
            return None;
        }

        // Create hash pair for lookup
        let first_hash = SymbolHash::from_symbol(&self.symbols[first].symbol);
        let second_hash = SymbolHash::from_symbol(&self.symbols[second].symbol);

        match self.digram_index.entry((first_hash, second_hash)) {
            Entry::Vacant(e) => {
                // New digram, add to index
                e.insert(first);
                None
            }
            Entry::Occupied(mut e) => {
                let other_first = *e.get();

                // Check if it's the same digram (pointing to itself)
                if other_first == first {
                    return None;
                }

                // Check if the key is still valid (might have been removed)
                if !self.symbols.contains_key(other_first) {
                    // Stale entry, update it
                    e.insert(first);
                    return None;
                }

                let other_second = self.symbols[other_first]
                    .next
                    .expect("Digram first should have next");

                // Check for overlap: digrams sharing a symbol
                if other_second == first || other_first == second {
                    return None;
                }

                // Verify full equality (hash collision check)
                let symbols_equal = self.symbols[first]
                    .symbol
                    .equals(&self.symbols[other_first].symbol)
                    && self.symbols[second]
                        .symbol
                        .equals(&self.symbols[other_second].symbol);

                if symbols_equal {
                    Some(other_first)
                } else {
                    // Hash collision - treat as no match
                    None
                }
            }
        }
    }

    /// Removes a digram from the index if it points to the given location.
    #[inline]
    pub fn remove_digram_from_index(&mut self, first: DefaultKey) {
        // Don't try to remove invalid digrams
        if is_sequence_start(&self.symbols[first].symbol) {
            return;
        }

        let Some(second) = self.symbols[first].next else {
            return;
        };

        if is_sequence_end(&self.symbols[second].symbol) {
            return;
        }

        // Create hash key
        let first_hash = SymbolHash::from_symbol(&self.symbols[first].symbol);
        let second_hash = SymbolHash::from_symbol(&self.symbols[second].symbol);

        // Only remove if it points to this exact location
        if let Entry::Occupied(e) = self.digram_index.entry((first_hash, second_hash)) {
            if *e.get() == first {
                e.remove();
            }
        }
    }

    // ========================================================================
    // Rule Operations
    // ========================================================================

    /// Checks if a digram is a complete rule (surrounded by RuleHead and RuleTail).
    ///
    /// Returns Some(RuleHead key) if the digram forms a complete rule.
    #[inline]
    pub fn get_complete_rule(&self, first: DefaultKey) -> Option<DefaultKey> {
        let second = self.symbols[first].next?;

        // Check if preceded by RuleHead
        let prev = self.symbols[first].prev?;
        if !matches!(self.symbols[prev].symbol, Symbol::RuleHead { .. }) {
            return None;
        }

        // Check if followed by RuleTail
        let after_second = self.symbols[second].next?;
        if !matches!(self.symbols[after_second].symbol, Symbol::RuleTail) {
            return None;
        }

        // Verify they're part of the same rule
        if let Symbol::RuleHead { tail, .. } = self.symbols[prev].symbol {
            if tail == after_second {
                return Some(prev);
            }
        }

        None
    }

    /// Creates a new rule from two digram occurrences.
    ///
    /// Returns the keys where the new RuleRefs were inserted.
    pub fn swap_for_new_rule(
        &mut self,
        match1: DefaultKey,
        match2: DefaultKey,
    ) -> (DefaultKey, DefaultKey) {
        debug_assert!(
            self.symbols[match1].next.is_some(),
            "match1 should have next"
        );
        debug_assert!(
            self.symbols[match2].next.is_some(),
            "match2 should have next"
        );
        debug_assert_ne!(match1, match2, "match1 and match2 should be different");

        let match1_second = self.symbols[match1].next.unwrap();

        // Clone the symbols we need before mutating
        let first_symbol = self.symbols[match1].symbol.clone_symbol();
        let second_symbol = self.symbols[match1_second].symbol.clone_symbol();

        // Create new rule
        let rule_id = self.id_gen.get();

        // Create RuleTail
        let tail_key = self.symbols.insert(SymbolNode::new(Symbol::RuleTail));

        // Create RuleHead
        let head_key = self.symbols.insert(SymbolNode::new(Symbol::RuleHead {
            rule_id,
            count: 0,
            tail: tail_key,
            users: HashSet::default(),
        }));

        // Insert the cloned symbols into the rule
        let rule_first = self.symbols.insert(SymbolNode::new(first_symbol));
        let rule_second = self.symbols.insert(SymbolNode::new(second_symbol));
        self.symbols[rule_first].owner = Some(rule_id);
        self.symbols[rule_second].owner = Some(rule_id);

        // Link rule structure: head -> first -> second -> tail
        self.symbols[head_key].next = Some(rule_first);
        self.symbols[rule_first].prev = Some(head_key);
        self.symbols[rule_first].next = Some(rule_second);
        self.symbols[rule_second].prev = Some(rule_first);
        self.symbols[rule_second].next = Some(tail_key);
        self.symbols[tail_key].prev = Some(rule_second);

        // Update digram index to point to rule's copy
        self.remove_digram_from_index(match1);
        self.remove_digram_from_index(match2);

        let first_hash = SymbolHash::from_symbol(&self.symbols[rule_first].symbol);
        let second_hash = SymbolHash::from_symbol(&self.symbols[rule_second].symbol);
        self.digram_index
            .insert((first_hash, second_hash), rule_first);

        // Add rule to rule index
        self.rule_index.insert(rule_id, head_key);

        // Increment counts if the symbols in the rule are RuleRefs
        self.increment_if_rule(rule_first);
        self.increment_if_rule(rule_second);

        // Replace both occurrences with RuleRefs
        let loc1 = self.swap_for_existing_rule(match1, head_key);
        let loc2 = self.swap_for_existing_rule(match2, head_key);

        (loc1, loc2)
    }

    /// Replaces a digram with an existing rule reference.
    ///
    /// Returns the key of the newly inserted RuleRef.
    pub fn swap_for_existing_rule(
        &mut self,
        first: DefaultKey,
        rule_head: DefaultKey,
    ) -> DefaultKey {
        let second = self.symbols[first]
            .next
            .expect("first should have next in digram");

        debug_assert!(
            matches!(self.symbols[rule_head].symbol, Symbol::RuleHead { .. }),
            "rule_head must be a RuleHead"
        );

        let before_digram = self.symbols[first].prev;
        let after_digram = self.symbols[second].next;
        let digram_owner = self.symbols[first].owner;

        // Remove surrounding digrams from index
        if let Some(prev) = before_digram {
            self.remove_digram_from_index(prev);
        }
        self.remove_digram_from_index(second);

        // Decrement counts if symbols are RuleRefs
        self.decrement_if_rule(first);
        self.decrement_if_rule(second);

        // Get rule_id from RuleHead
        let rule_id = if let Symbol::RuleHead { rule_id, .. } = self.symbols[rule_head].symbol {
            rule_id
        } else {
            unreachable!();
        };

        // Create new RuleRef symbol
        let new_rule_key = self
            .symbols
            .insert(SymbolNode::new(Symbol::RuleRef { rule_id }));
        self.symbols[new_rule_key].owner = digram_owner;

        // Link new RuleRef into the sequence
        self.symbols[new_rule_key].prev = before_digram;
        self.symbols[new_rule_key].next = after_digram;

        if let Some(prev) = before_digram {
            self.symbols[prev].next = Some(new_rule_key);
        }
        if let Some(next) = after_digram {
            self.symbols[next].prev = Some(new_rule_key);
        }

        // Increment rule count
        self.increment_rule_count(rule_head, new_rule_key);

        // The rule body's first two symbols, which `first`/`second` are
        // about to be folded into — captured before removal so the
        // predictor migration below (ported from `symbols::substitute`)
        // can reach them.
        let rule_first = self.symbols[rule_head]
            .next
            .expect("RuleHead should have next");
        let rule_second = self.symbols[rule_first]
            .next
            .expect("Rule first should have next");

        let owner_users: Vec<DefaultKey> = digram_owner
            .and_then(|id| self.rule_index.get(&id).copied())
            .map(|head| match &self.symbols[head].symbol {
                Symbol::RuleHead { users, .. } => users.iter().copied().collect(),
                _ => Vec::new(),
            })
            .unwrap_or_default();
        self.migrate_predictor_on_substitute(first, new_rule_key, rule_first, &owner_users);
        self.migrate_predictor_on_substitute(second, new_rule_key, rule_second, &owner_users);

        // Remove the old digram symbols
        self.symbols.remove(first);
        self.symbols.remove(second);

        self.expand_rule_if_necessary(rule_first);
        self.expand_rule_if_necessary(rule_second);

        new_rule_key
    }

    /// Ported from `symbols::substitute`'s predictor-mark handling: if
    /// `old_key` (one half of the digram being folded into a rule
    /// reference) was itself a predictor, the new reference inherits the
    /// mark, the rule body's own copy of that symbol becomes a predictor in
    /// its place, and every occurrence elsewhere that had pointed at
    /// `old_key` is repointed at `new_key`.
    fn migrate_predictor_on_substitute(
        &mut self,
        old_key: DefaultKey,
        new_key: DefaultKey,
        rule_body_key: DefaultKey,
        owner_users: &[DefaultKey],
    ) {
        if !self.symbols[old_key].is_predictor {
            return;
        }

        self.symbols[new_key].is_predictor = true;
        for &user in owner_users {
            if self.symbols[user].predictors.remove(&old_key) {
                self.symbols[user].predictors.insert(new_key);
            }
        }

        let inherited: Vec<DefaultKey> = self.symbols[old_key].predictors.iter().copied().collect();
        self.symbols[rule_body_key].predictors.extend(inherited);
        self.symbols[rule_body_key].is_predictor = true;
        if matches!(self.symbols[rule_body_key].symbol, Symbol::Value(_)) {
            self.predictions.insert(rule_body_key);
        }
        self.symbols[new_key].predictors.insert(rule_body_key);
    }

    /// Expands a rule inline if it's only used once (rule utility constraint).
    pub fn expand_rule_if_necessary(&mut self, potential_rule: DefaultKey) {
        // Only RuleRef symbols can be expanded
        let Symbol::RuleRef { rule_id } = self.symbols[potential_rule].symbol else {
            return;
        };

        // Get the rule head
        let Some(&rule_head) = self.rule_index.get(&rule_id) else {
            return;
        };

        // Check rule count
        let count = if let Symbol::RuleHead { count, .. } = self.symbols[rule_head].symbol {
            count
        } else {
            unreachable!();
        };

        debug_assert!(count > 0, "Rule count should never be 0");

        if count != 1 {
            return; // Rule is used more than once, keep it
        }

        // Rule is only used once, expand it inline
        let rule_first = self.symbols[rule_head]
            .next
            .expect("RuleHead should have next");
        let rule_tail = if let Symbol::RuleHead { tail, .. } = self.symbols[rule_head].symbol {
            tail
        } else {
            unreachable!();
        };

        let rule_last = self.symbols[rule_tail]
            .prev
            .expect("RuleTail should have prev");

        // Get surrounding symbols
        let before_rule = self.symbols[potential_rule].prev;
        let after_rule = self.symbols[potential_rule].next;
        let host_owner = self.symbols[potential_rule].owner;

        // Predictor-mark migration (ported from `symbols::expand`): if the
        // reference being inlined was itself a predictor, whatever pointed
        // at it now points directly at its children, one nesting level
        // removed.
        if self.symbols[potential_rule].is_predictor {
            let owner_users: Vec<DefaultKey> = host_owner
                .and_then(|id| self.rule_index.get(&id).copied())
                .map(|head| match &self.symbols[head].symbol {
                    Symbol::RuleHead { users, .. } => users.iter().copied().collect(),
                    _ => Vec::new(),
                })
                .unwrap_or_default();
            let inherited: Vec<DefaultKey> = self.symbols[potential_rule]
                .predictors
                .iter()
                .copied()
                .collect();
            for &user in &owner_users {
                if self.symbols[user].predictors.remove(&potential_rule) {
                    self.symbols[user].predictors.extend(inherited.iter().copied());
                }
            }
        }

        // Reassign ownership of the moved body symbols to the host rule
        // (ported from `symbols::expand`'s owner-reassignment loop) —
        // internal `next` links between rule_first and rule_last are never
        // touched by the unlinking below, so this walk stays valid
        // regardless of when it runs relative to it.
        let mut cur = Some(rule_first);
        while let Some(key) = cur {
            self.symbols[key].owner = host_owner;
            if key == rule_last {
                break;
            }
            cur = self.symbols[key].next;
        }

        // Remove digrams pointing into this area
        if let Some(prev) = before_rule {
            self.remove_digram_from_index(prev);
        }
        self.remove_digram_from_index(potential_rule);

        // Remove rule from indices
        self.rule_index.remove(&rule_id);
        self.id_gen.free(rule_id);

        // Unlink rule head and tail
        self.symbols[rule_head].next = None;
        self.symbols[rule_first].prev = None;
        self.symbols[rule_last].next = None;
        self.symbols[rule_tail].prev = None;

        // Remove head and tail
        self.symbols.remove(rule_head);
        self.symbols.remove(rule_tail);

        // Link rule contents into original sequence
        self.symbols[rule_first].prev = before_rule;
        self.symbols[rule_last].next = after_rule;

        if let Some(prev) = before_rule {
            self.symbols[prev].next = Some(rule_first);
        }
        if let Some(next) = after_rule {
            self.symbols[next].prev = Some(rule_last);
        }

        // Remove the RuleRef symbol
        self.symbols.remove(potential_rule);

        // Check new digrams formed
        if let Some(prev) = before_rule {
            if !is_sequence_start(&self.symbols[prev].symbol) {
                self.link_made(prev);
            }
        }

        // Check digram at rule_last if valid
        if let Some(after) = after_rule {
            if !is_sequence_end(&self.symbols[after].symbol) {
                self.link_made(rule_last);
            }
        }
    }

    /// Core algorithm: Called when two symbols are linked.
    ///
    /// Checks for digram duplicates and creates/reuses rules as needed.
    #[inline]
    pub fn link_made(&mut self, first_key: DefaultKey) {
        debug_assert!(
            self.symbols[first_key].next.is_some(),
            "link_made called on symbol without next"
        );

        let second_key = self.symbols[first_key].next.unwrap();

        // Try to find existing digram or add to index
        if let Some(match_key) = self.find_and_add_digram(first_key, second_key) {
            // Check if the match is a complete rule
            if let Some(rule_head_key) = self.get_complete_rule(match_key) {
                // Replace with existing rule
                let new_key = self.swap_for_existing_rule(first_key, rule_head_key);
                self.check_new_links(new_key);
            } else {
                // Create new rule from both occurrences
                let (loc1, loc2) = self.swap_for_new_rule(first_key, match_key);
                self.check_new_links_pair(loc1, loc2);
            }
        }
    }

    /// Checks newly formed links after rule insertion.
    #[inline]
    pub fn check_new_links(&mut self, rule_key: DefaultKey) {
        // Check if key is still valid
        if !self.symbols.contains_key(rule_key) {
            return;
        }

        // Check digram before rule_key
        if let Some(prev) = self.symbols[rule_key].prev {
            if !is_sequence_start(&self.symbols[prev].symbol) {
                self.link_made(prev);
            }
        }

        // Re-check validity after link_made might have changed things
        if !self.symbols.contains_key(rule_key) {
            return;
        }

        // Check digram starting at rule_key
        if let Some(next) = self.symbols[rule_key].next {
            if !is_sequence_end(&self.symbols[next].symbol)
                && !is_sequence_start(&self.symbols[rule_key].symbol)
            {
                self.link_made(rule_key);
            }
        }
    }

    /// Checks newly formed links after two rule insertions.
    #[inline]
    pub fn check_new_links_pair(&mut self, rule1: DefaultKey, rule2: DefaultKey) {
        // Check at rule1
        if let Some(next) = self.symbols[rule1].next {
            if !is_sequence_end(&self.symbols[next].symbol)
                && !is_sequence_start(&self.symbols[rule1].symbol)
            {
                self.link_made(rule1);
            }
        }

        // Check at rule2
        if let Some(next) = self.symbols[rule2].next {
            if !is_sequence_end(&self.symbols[next].symbol)
                && !is_sequence_start(&self.symbols[rule2].symbol)
            {
                self.link_made(rule2);
            }
        }

        // Check before rule2
        if let Some(prev) = self.symbols[rule2].prev {
            if prev != rule1 && !is_sequence_start(&self.symbols[prev].symbol) {
                self.link_made(prev);
            }
        }

        // Check before rule1
        if let Some(prev) = self.symbols[rule1].prev {
            if prev != rule2 && !is_sequence_start(&self.symbols[prev].symbol) {
                self.link_made(prev);
            }
        }
    }

    // ========================================================================
    // Helper methods
    // ========================================================================

    /// Increments the count of a rule if the symbol is a RuleRef.
    #[inline]
    fn increment_if_rule(&mut self, key: DefaultKey) {
        if let Symbol::RuleRef { rule_id } = self.symbols[key].symbol {
            if let Some(&head_key) = self.rule_index.get(&rule_id) {
                self.increment_rule_count(head_key, key);
            }
        }
    }

    /// Decrements the count of a rule if the symbol is a RuleRef.
    #[inline]
    fn decrement_if_rule(&mut self, key: DefaultKey) {
        if let Symbol::RuleRef { rule_id } = self.symbols[key].symbol {
            if let Some(&head_key) = self.rule_index.get(&rule_id) {
                self.decrement_rule_count(head_key, key);
            }
        }
    }

    /// Increments a rule's reference count and registers `user_key` as one
    /// of its users (`rules::reuse` in the original).
    #[inline]
    fn increment_rule_count(&mut self, head_key: DefaultKey, user_key: DefaultKey) {
        if let Symbol::RuleHead { count, users, .. } = &mut self.symbols[head_key].symbol {
            *count += 1;
            users.insert(user_key);
        }
    }

    /// Decrements a rule's reference count and drops `user_key` from its
    /// users (`rules::deuse` in the original).
    #[inline]
    fn decrement_rule_count(&mut self, head_key: DefaultKey, user_key: DefaultKey) {
        if let Symbol::RuleHead { count, users, .. } = &mut self.symbols[head_key].symbol {
            debug_assert!(*count > 0, "Cannot decrement count below 0");
            *count -= 1;
            users.remove(&user_key);
        }
    }

    // ========================================================================
    // Predictor-mark propagation
    // ========================================================================

    /// Descends towards the left edge of whatever `key` refers to, marking
    /// every node on the path as a predictor (`symbols::become_predictor_down_left`).
    /// Used when a node's successor becomes the next thing to watch for.
    pub fn become_predictor_down_left(&mut self, key: DefaultKey) {
        self.symbols[key].is_predictor = true;
        if let Symbol::RuleRef { rule_id } = self.symbols[key].symbol {
            let Some(&head) = self.rule_index.get(&rule_id) else {
                return;
            };
            let first = self.symbols[head]
                .next
                .expect("rule body is never empty");
            self.symbols[key].predictors.insert(first);
            self.become_predictor_down_left(first);
        } else {
            self.predictions.insert(key);
        }
    }

    /// Descends towards the right edge of whatever `key` refers to, marking
    /// every node on the path as a predictor (`symbols::become_predictor_down_right`).
    /// Used when a completed occurrence of `key`'s rule is found elsewhere:
    /// the useful prediction is whatever comes after that occurrence ends,
    /// which bubbles up naturally once the rightmost leaf is matched.
    pub fn become_predictor_down_right(&mut self, key: DefaultKey) {
        self.symbols[key].is_predictor = true;
        if let Symbol::RuleRef { rule_id } = self.symbols[key].symbol {
            let Some(&head) = self.rule_index.get(&rule_id) else {
                return;
            };
            let tail = match self.symbols[head].symbol {
                Symbol::RuleHead { tail, .. } => tail,
                _ => unreachable!(),
            };
            let last = self.symbols[tail].prev.expect("rule body is never empty");
            self.symbols[key].predictors.insert(last);
            self.become_predictor_down_right(last);
        } else {
            self.predictions.insert(key);
        }
    }

    /// Propagates a predictor mark up through every context that
    /// instantiates the rule owning `key`, stopping once a node with no
    /// owner (the root anchor) is reached (`symbols::become_predictor_up`).
    pub fn become_predictor_up(&mut self, key: DefaultKey, child: DefaultKey) {
        if self.symbols[key].predictors.contains(&child) {
            return;
        }
        self.symbols[key].predictors.insert(child);
        self.symbols[key].is_predictor = true;

        let Some(owner_id) = self.symbols[key].owner else {
            return;
        };
        let Some(&head) = self.rule_index.get(&owner_id) else {
            return;
        };
        let users: Vec<DefaultKey> = match &self.symbols[head].symbol {
            Symbol::RuleHead { users, .. } => users.iter().copied().collect(),
            _ => Vec::new(),
        };
        for user in users {
            self.become_predictor_up(user, key);
        }
    }

    /// Re-seeds the predictor set by scanning every rule body for a node
    /// whose symbol matches `matching` (by raw value, i.e. terminal value
    /// equality or same-rule-instance identity), skipping `skip`, promoting
    /// any hit and propagating it upward through the hit's owner's users
    /// (`oracle::find_new_predictors` + `symbols::find_potential_predictors`).
    pub fn find_new_predictors(&mut self, skip: DefaultKey, matching: &Symbol<T>) {
        let rule_ids: Vec<u32> = self.rule_index.keys().copied().collect();
        for rule_id in rule_ids {
            self.find_potential_predictors_in_rule(rule_id, skip, matching);
        }
    }

    fn find_potential_predictors_in_rule(
        &mut self,
        rule_id: u32,
        skip: DefaultKey,
        matching: &Symbol<T>,
    ) {
        let Some(&head) = self.rule_index.get(&rule_id) else {
            return;
        };
        let mut cur = self.symbols[head].next;
        while let Some(key) = cur {
            if matches!(self.symbols[key].symbol, Symbol::RuleTail) {
                break;
            }
            cur = self.symbols[key].next;

            if key == skip {
                continue;
            }
            if !self.symbols[key].symbol.equals(matching) {
                continue;
            }

            self.become_predictor_down_right(key);
            let Some(owner_id) = self.symbols[key].owner else {
                continue;
            };
            let Some(&owner_head) = self.rule_index.get(&owner_id) else {
                continue;
            };
            let users: Vec<DefaultKey> = match &self.symbols[owner_head].symbol {
                Symbol::RuleHead { users, .. } => users.iter().copied().collect(),
                _ => Vec::new(),
            };
            for user in users {
                self.become_predictor_up(user, key);
            }
        }
    }
}

/// Checks if a symbol marks the start of a rule body.
#[inline(always)]
pub(crate) fn is_sequence_start<T>(symbol: &Symbol<T>) -> bool {
    matches!(symbol, Symbol::RuleHead { .. })
}

/// Checks if a symbol marks the end of a rule body.
#[inline(always)]
pub(crate) fn is_sequence_end<T>(symbol: &Symbol<T>) -> bool {
    matches!(symbol, Symbol::RuleTail)
}
