//! Deduplicated emission pool for automaton state sets.
//!
//! Generated scanners store composite next-state sets in one flattened
//! array and address them by offset. The pool hands out `(start, end)`
//! spans into that array: the first request for a set appends it to the
//! emission-order list and advances the running offset; later requests for
//! an equal set return the recorded span. Downstream code indexes the
//! ordered list positionally, so emission order is part of the contract.

use std::collections::HashMap;

use super::StateId;

#[derive(Debug, Default)]
pub struct StateSetPool {
    spans: HashMap<Vec<StateId>, (u32, u32)>,
    ordered: Vec<Vec<StateId>>,
    last_index: u32,
}

impl StateSetPool {
    pub fn new() -> Self {
        StateSetPool::default()
    }

    /// The `(start, end)` span of `set` in the flattened emission array,
    /// allocating it on first use.
    pub fn indices_for(&mut self, set: &[StateId]) -> (u32, u32) {
        debug_assert!(!set.is_empty(), "cannot emit an empty state set");
        if let Some(&span) = self.spans.get(set) {
            return span;
        }
        let span = (self.last_index, self.last_index + set.len() as u32 - 1);
        self.last_index += set.len() as u32;
        self.spans.insert(set.to_vec(), span);
        self.ordered.push(set.to_vec());
        span
    }

    /// Finalized sets in first-use order.
    pub fn ordered(&self) -> &[Vec<StateId>] {
        &self.ordered
    }

    /// Total length of the flattened emission array.
    pub fn flattened_len(&self) -> u32 {
        self.last_index
    }
}
