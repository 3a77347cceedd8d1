//! commitment tree for the shielded pool
//!
//! fixed-height, append-only merkle tree of 32-byte note commitments.
//! keeps a bounded ring of recent roots so proofs built against a root
//! that was current a few insertions ago still verify.
//!
//! ```text
//!   level H            root
//!                    /      \
//!   level 1        n0        n1 ... (zeros[1] where empty)
//!                 /  \      /  \
//!   level 0     c0    c1  c2   z    (z = canonical zero leaf)
//! ```

pub mod history;
pub mod tree;

pub use history::RootHistory;
pub use tree::{MerklePath, MerkleTree};

use thiserror::Error;

/// 32-byte tree node
pub type Hash = [u8; 32];

/// tallest supported tree (2^32 leaves)
pub const MAX_HEIGHT: usize = 32;

/// domain separator for interior nodes
pub const NODE_DOMAIN: &[u8] = b"shielded-pool.merkle.node.v1";
/// domain separator for the canonical empty leaf
pub const ZERO_DOMAIN: &[u8] = b"shielded-pool.merkle.zero.v1";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("merkle tree is full: capacity {capacity}, requested {requested}")]
    TreeFull { capacity: u64, requested: u64 },

    #[error("leaf index {index} out of range (tree has {len} leaves)")]
    IndexOutOfRange { index: u64, len: u64 },

    #[error("batch of {len} leaves exceeds arity {arity}")]
    BatchTooLarge { len: usize, arity: usize },

    #[error("invalid tree height {0}, expected 1..={MAX_HEIGHT}")]
    InvalidHeight(usize),

    #[error("root history must hold at least one root")]
    EmptyHistory,
}

pub type Result<T> = std::result::Result<T, TreeError>;

/// hash two children into their parent
pub fn hash_siblings(left: &Hash, right: &Hash) -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(NODE_DOMAIN);
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// canonical zero commitment used for unused batch slots and empty leaves
pub fn zero_leaf() -> Hash {
    let mut hasher = blake3::Hasher::new();
    hasher.update(ZERO_DOMAIN);
    *hasher.finalize().as_bytes()
}

/// roots of empty subtrees, `zeros[i]` for a subtree of height `i`
pub fn zeros(height: usize) -> Vec<Hash> {
    let mut zeros = Vec::with_capacity(height + 1);
    zeros.push(zero_leaf());
    for level in 0..height {
        let below = zeros[level];
        zeros.push(hash_siblings(&below, &below));
    }
    zeros
}
