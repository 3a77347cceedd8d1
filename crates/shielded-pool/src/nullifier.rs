//! nullifiers - spent markers for notes
//!
//! a nullifier is derived from the commitment, its tree position and the
//! owner's signature over both. publishing it marks the note spent without
//! saying which leaf it came from.

use std::collections::HashSet;

use crate::note::Commitment;
use crate::NULLIFIER_DOMAIN;

bytes32!(
    /// unique spend tag of a note
    Nullifier
);

impl Nullifier {
    /// nf = H(domain || commitment || index || signature)
    pub fn derive(commitment: &Commitment, index: u64, signature: &[u8; 32]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(NULLIFIER_DOMAIN);
        hasher.update(&commitment.0);
        hasher.update(&index.to_le_bytes());
        hasher.update(signature);
        Self(*hasher.finalize().as_bytes())
    }
}

/// every nullifier the pool has accepted, entries are never removed
#[derive(Clone, Debug, Default)]
pub struct NullifierSet {
    spent: HashSet<Nullifier>,
}

impl NullifierSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, nullifier: &Nullifier) -> bool {
        self.spent.contains(nullifier)
    }

    /// first spent nullifier in `nullifiers`, if any
    pub fn first_spent<'a>(&self, nullifiers: impl IntoIterator<Item = &'a Nullifier>) -> Option<Nullifier> {
        nullifiers.into_iter().find(|nf| self.contains(nf)).copied()
    }

    /// returns false if the nullifier was already present
    pub fn insert(&mut self, nullifier: Nullifier) -> bool {
        self.spent.insert(nullifier)
    }

    pub fn len(&self) -> usize {
        self.spent.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spent.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Nullifier> {
        self.spent.iter()
    }
}
