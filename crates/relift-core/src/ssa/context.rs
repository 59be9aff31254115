//! Per-function SSA bookkeeping.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::ir::{Body, ContainerId, ExprId};

/// A location name plus SSA subscript, e.g. `eax_3` or `*((esp_0 - 8))_1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DefKey {
    pub name: String,
    pub idx: u32,
}

impl DefKey {
    pub fn new(name: impl Into<String>, idx: u32) -> Self {
        DefKey {
            name: name.into(),
            idx,
        }
    }
}

impl std::fmt::Display for DefKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}_{}", self.name, self.idx)
    }
}

/// SSA construction and optimization state for one function.
///
/// `defs` is insertion-ordered; passes iterate a snapshot of its keys and
/// may mutate the map while doing so, but must never iterate it live.
#[derive(Debug)]
pub struct SsaContext {
    /// Every definition, keyed by name and subscript.
    pub defs: IndexMap<DefKey, ExprId>,
    /// Next subscript per name (0 is reserved for the entry state).
    pub count: FxHashMap<String, u32>,
    /// Subscript stacks used during the renaming walk.
    pub stack: FxHashMap<String, Vec<u32>>,
    /// Container holding synthesized entry-state definitions for locations
    /// used before any definition exists.
    pub uninit: ContainerId,
    /// `(save, restore)` definition pairs proven to preserve a location
    /// across the function.
    pub preserved: Vec<(ExprId, ExprId)>,
}

impl SsaContext {
    pub fn new(uninit: ContainerId) -> Self {
        SsaContext {
            defs: IndexMap::new(),
            count: FxHashMap::default(),
            stack: FxHashMap::default(),
            uninit,
            preserved: Vec::new(),
        }
    }

    /// The key a definition is (or would be) registered under.
    pub fn key_of(body: &Body, def: ExprId) -> Option<DefKey> {
        let name = body.base_name(def)?;
        Some(DefKey::new(name, body.expr(def).idx.unwrap_or(0)))
    }

    /// Drops the entry whose value is `def`, if any.
    pub fn remove_by_value(&mut self, def: ExprId) {
        if let Some(key) = self
            .defs
            .iter()
            .find(|(_, &v)| v == def)
            .map(|(k, _)| k.clone())
        {
            self.defs.shift_remove(&key);
        }
    }

    /// Re-points entries after structural edits moved definition identity
    /// from one node to another (see `Body::take_def_moves`).
    pub fn apply_def_moves(&mut self, moves: Vec<(ExprId, ExprId)>) {
        for (old, new) in moves {
            for v in self.defs.values_mut() {
                if *v == old {
                    *v = new;
                }
            }
            for pair in self.preserved.iter_mut() {
                if pair.0 == old {
                    pair.0 = new;
                }
                if pair.1 == old {
                    pair.1 = new;
                }
            }
        }
    }
}
