//! Records the operation kind each context symbol was first seen with, so a
//! prediction can report `OPEN`/`CLOSE`/`READ`/`WRITE` without replaying
//! history. Invariant #6 (a symbol's operation kind never changes) is
//! checked in debug builds rather than enforced, matching how the other
//! trackers in this crate treat their own consistency assumptions.

use crate::op::OpType;
use ahash::AHashMap;

pub(crate) struct TypeTable(AHashMap<u32, OpType>);

impl TypeTable {
    pub(crate) fn new() -> Self {
        Self(AHashMap::default())
    }

    pub(crate) fn record(&mut self, symbol: u32, kind: OpType) {
        match self.0.get(&symbol) {
            Some(existing) => debug_assert_eq!(
                *existing, kind,
                "symbol {symbol} observed with operation kind {kind} after being recorded as {existing}"
            ),
            None => {
                self.0.insert(symbol, kind);
            }
        }
    }

    pub(crate) fn get(&self, symbol: u32) -> Option<OpType> {
        self.0.get(&symbol).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unknown_symbol_has_no_type() {
        let table = TypeTable::new();
        assert_eq!(table.get(1), None);
    }

    #[test]
    fn records_the_first_kind_seen() {
        let mut table = TypeTable::new();
        table.record(1, OpType::Read);
        assert_eq!(table.get(1), Some(OpType::Read));
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn panics_on_kind_mismatch_in_debug_builds() {
        let mut table = TypeTable::new();
        table.record(1, OpType::Read);
        table.record(1, OpType::Write);
    }
}
