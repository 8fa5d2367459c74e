//! Bounded recency buffer of delivered item identifiers.

use std::collections::VecDeque;

/// Remembers the last `capacity` delivered identifiers, oldest evicted first.
///
/// Owned by exactly one worker and rebuilt empty whenever a worker starts.
#[derive(Debug, Clone)]
pub struct DedupWindow {
    items: VecDeque<String>,
    capacity: usize,
}

impl DedupWindow {
    /// Create an empty window. Capacity is clamped to at least one slot.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Record a delivered identifier, evicting the oldest when full.
    pub fn add(&mut self, id: impl Into<String>) {
        if self.items.len() == self.capacity {
            self.items.pop_front();
        }
        self.items.push_back(id.into());
    }

    /// Whether `id` is among the retained identifiers.
    pub fn contains(&self, id: &str) -> bool {
        self.items.iter().any(|item| item == id)
    }

    /// Retained identifiers, oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
