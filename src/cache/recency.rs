//! Recency Sequence Module
//!
//! Ordered key list used by the LRU decorators to pick eviction victims.

use std::collections::VecDeque;

// == Recency Sequence ==
/// Keys ordered by last use.
///
/// - Head (index 0) = least recently used
/// - Tail = most recently used
#[derive(Debug, Default, Clone)]
pub struct RecencySequence {
    order: VecDeque<String>,
}

impl RecencySequence {
    /// Creates a new empty sequence.
    pub fn new() -> Self {
        Self::default()
    }

    // == Append ==
    /// Appends a key at the tail without checking for duplicates.
    pub fn append(&mut self, key: impl Into<String>) {
        self.order.push_back(key.into());
    }

    /// Returns the key at `index`, head first.
    pub fn get(&self, index: usize) -> Option<&str> {
        self.order.get(index).map(String::as_str)
    }

    /// Removes and returns the key at `index`.
    pub fn remove_at(&mut self, index: usize) -> Option<String> {
        self.order.remove(index)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Least recently used key.
    pub fn head(&self) -> Option<&str> {
        self.get(0)
    }

    /// Position of `key`, if tracked.
    pub fn position(&self, key: &str) -> Option<usize> {
        self.order.iter().position(|k| k == key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.position(key).is_some()
    }

    // == Remove ==
    /// Removes `key` wherever it is. Returns whether it was tracked.
    pub fn remove(&mut self, key: &str) -> bool {
        match self.position(key) {
            Some(index) => self.remove_at(index).is_some(),
            None => false,
        }
    }

    // == Touch ==
    /// Moves `key` to the tail, appending it if it was not tracked.
    pub fn touch(&mut self, key: &str) {
        self.remove(key);
        self.append(key);
    }

    /// Keys from least to most recently used.
    pub fn keys(&self) -> Vec<String> {
        self.order.iter().cloned().collect()
    }
}
