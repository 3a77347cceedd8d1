//! bounded ring of recent roots

use std::collections::VecDeque;

use crate::{Hash, Result, TreeError};

/// the last `capacity` roots, newest at the back
///
/// the current root always counts as one of the `capacity` entries, so a
/// root stays known for `capacity - 1` further insertions.
#[derive(Clone, Debug)]
pub struct RootHistory {
    roots: VecDeque<Hash>,
    capacity: usize,
}

impl RootHistory {
    /// start a history containing only `genesis`
    pub fn new(capacity: usize, genesis: Hash) -> Result<Self> {
        if capacity == 0 {
            return Err(TreeError::EmptyHistory);
        }
        let mut roots = VecDeque::with_capacity(capacity);
        roots.push_back(genesis);
        Ok(Self { roots, capacity })
    }

    /// record a new current root, evicting the oldest once full
    pub fn push(&mut self, root: Hash) {
        if self.roots.len() == self.capacity {
            self.roots.pop_front();
        }
        self.roots.push_back(root);
    }

    /// most recent root
    pub fn current(&self) -> Hash {
        // never empty: constructed with genesis and only pops before a push
        self.roots.back().copied().unwrap_or_default()
    }

    pub fn contains(&self, root: &Hash) -> bool {
        // newest first, most lookups hit recent roots
        self.roots.iter().rev().any(|r| r == root)
    }

    pub fn len(&self) -> usize {
        self.roots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.roots.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// roots from newest to oldest
    pub fn iter(&self) -> impl Iterator<Item = &Hash> {
        self.roots.iter().rev()
    }
}
