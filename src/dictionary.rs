//! Context dictionary: a trie over calling contexts that assigns each
//! distinct context a small, dense, monotonically increasing symbol id.
//!
//! Grounded in the original's `dictionary<T,I>` (`dictionary.hpp`): a trie
//! keyed by the context's frames, `insert` only ever walking down and
//! appending, an id minted exactly once per distinct sequence, and an
//! append-only `…dict` file that records only the newly minted entries
//! (`i > last_written`). The original's raw tree of `node` structs becomes
//! a flat `Vec`-backed arena here — the dictionary never removes entries,
//! so the generational-index machinery `grammar.rs` needs isn't warranted.

use crate::context::CallingContext;
use crate::error::PredictorError;
use ahash::AHashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

struct Node {
    children: AHashMap<u64, usize>,
    symbol: Option<u32>,
}

impl Node {
    fn new() -> Self {
        Self {
            children: AHashMap::default(),
            symbol: None,
        }
    }
}

/// Maps distinct calling contexts to dense symbol ids, `0` reserved as the
/// "no previous symbol" sentinel so the first real context is assigned `1`.
pub struct Dictionary {
    nodes: Vec<Node>,
    next_id: u32,
    writer: Option<BufWriter<File>>,
    last_written: u32,
}

impl Dictionary {
    pub fn new() -> Self {
        Self {
            nodes: vec![Node::new()],
            next_id: 1,
            writer: None,
            last_written: 0,
        }
    }

    /// Opens the append-only `…dict` persistence file. Errors propagate as
    /// `PredictorError::Io`.
    pub fn open(&mut self, path: &Path) -> Result<(), PredictorError> {
        let file = File::create(path)?;
        self.writer = Some(BufWriter::new(file));
        Ok(())
    }

    /// Flushes and detaches the persistence file, if any was opened.
    pub fn close(&mut self) -> Result<(), PredictorError> {
        if let Some(mut w) = self.writer.take() {
            w.flush()?;
        }
        Ok(())
    }

    /// Inserts a calling context, returning its symbol (reusing the
    /// existing one if the context was seen before). Fails only if `ctx`
    /// somehow carries zero frames (guarded already by
    /// [`CallingContext::new`], but checked again defensively at the API
    /// boundary).
    pub fn insert(&mut self, ctx: &CallingContext) -> Result<u32, PredictorError> {
        if ctx.frames().is_empty() {
            return Err(PredictorError::EmptyCallStack);
        }

        let mut current = 0usize;
        for &frame in ctx.frames() {
            current = match self.nodes[current].children.get(&frame) {
                Some(&child) => child,
                None => {
                    let child = self.nodes.len();
                    self.nodes.push(Node::new());
                    self.nodes[current].children.insert(frame, child);
                    child
                }
            };
        }

        if let Some(symbol) = self.nodes[current].symbol {
            return Ok(symbol);
        }

        let symbol = self.next_id;
        self.next_id += 1;
        self.nodes[current].symbol = Some(symbol);

        if symbol > self.last_written {
            if let Some(w) = self.writer.as_mut() {
                writeln!(w, "[{symbol}]:{}", ctx.render())?;
            }
            self.last_written = symbol;
        }

        Ok(symbol)
    }

    pub fn len(&self) -> usize {
        (self.next_id - 1) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.next_id == 1
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_context_reuses_symbol() {
        let mut dict = Dictionary::new();
        let ctx = CallingContext::new(vec![1, 2, 3]).unwrap();
        let a = dict.insert(&ctx).unwrap();
        let b = dict.insert(&ctx).unwrap();
        assert_eq!(a, b);
        assert_eq!(a, 1);
    }

    #[test]
    fn distinct_contexts_get_distinct_symbols() {
        let mut dict = Dictionary::new();
        let a = dict.insert(&CallingContext::new(vec![1, 2]).unwrap()).unwrap();
        let b = dict.insert(&CallingContext::new(vec![1, 3]).unwrap()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn shared_prefix_shares_trie_nodes_but_not_symbols() {
        let mut dict = Dictionary::new();
        let a = dict
            .insert(&CallingContext::new(vec![1, 2, 3]).unwrap())
            .unwrap();
        let b = dict.insert(&CallingContext::new(vec![1, 2]).unwrap()).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn symbols_start_at_one() {
        let mut dict = Dictionary::new();
        assert!(dict.is_empty());
        let first = dict.insert(&CallingContext::new(vec![42]).unwrap()).unwrap();
        assert_eq!(first, 1);
        assert_eq!(dict.len(), 1);
    }
}
