//! incremental merkle tree
//!
//! stores every populated node so inclusion witnesses can be read off
//! directly. empty positions resolve to the precomputed zero subtree roots.

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::{hash_siblings, zero_leaf, zeros, Hash, Result, RootHistory, TreeError, MAX_HEIGHT};

/// below this many nodes a layer is hashed sequentially
#[cfg(feature = "parallel")]
const PARALLEL_THRESHOLD: usize = 1024;

/// sibling hashes from leaf to root
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MerklePath {
    /// position of the leaf
    pub index: u64,
    /// siblings, `siblings[0]` is next to the leaf
    pub siblings: Vec<Hash>,
}

impl MerklePath {
    /// fold the leaf up the path
    pub fn compute_root(&self, leaf: &Hash) -> Hash {
        let mut current = *leaf;
        let mut pos = self.index;

        for sibling in &self.siblings {
            current = if pos & 1 == 0 {
                hash_siblings(&current, sibling)
            } else {
                hash_siblings(sibling, &current)
            };
            pos >>= 1;
        }

        current
    }

    /// verify that `leaf` sits at `self.index` under `root`
    pub fn verify(&self, leaf: &Hash, root: &Hash) -> bool {
        // a path longer than the index space would alias positions
        if self.siblings.len() < 64 && self.index >> self.siblings.len() != 0 {
            return false;
        }
        self.compute_root(leaf) == *root
    }
}

/// append-only tree of fixed height with root history
#[derive(Clone, Debug)]
pub struct MerkleTree {
    height: usize,
    /// `layers[0]` holds the leaves, `layers[height]` the root once non-empty
    layers: Vec<Vec<Hash>>,
    /// empty-subtree roots per level
    zeros: Vec<Hash>,
    history: RootHistory,
}

impl MerkleTree {
    /// empty tree; the empty root is the first entry of the history
    pub fn new(height: usize, history_size: usize) -> Result<Self> {
        if height == 0 || height > MAX_HEIGHT {
            return Err(TreeError::InvalidHeight(height));
        }
        let zeros = zeros(height);
        let history = RootHistory::new(history_size, zeros[height])?;
        Ok(Self {
            height,
            layers: vec![Vec::new(); height + 1],
            zeros,
            history,
        })
    }

    /// rebuild a tree from its full leaf sequence (e.g. replayed from events)
    ///
    /// the history of the rebuilt tree only knows the final root.
    pub fn from_leaves(height: usize, history_size: usize, leaves: &[Hash]) -> Result<Self> {
        let mut tree = Self::new(height, history_size)?;
        if leaves.is_empty() {
            return Ok(tree);
        }
        let capacity = tree.capacity();
        if leaves.len() as u64 > capacity {
            return Err(TreeError::TreeFull {
                capacity,
                requested: leaves.len() as u64,
            });
        }

        tree.layers[0] = leaves.to_vec();
        for level in 0..height {
            let zero = tree.zeros[level];
            let next = hash_layer(&tree.layers[level], &zero);
            tree.layers[level + 1] = next;
        }
        let root = tree.root();
        tree.history = RootHistory::new(history_size, root)?;
        Ok(tree)
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// maximum number of leaves, `2^height`
    pub fn capacity(&self) -> u64 {
        1u64 << self.height
    }

    /// number of leaves inserted so far (also the next free index)
    pub fn len(&self) -> u64 {
        self.layers[0].len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.layers[0].is_empty()
    }

    pub fn root(&self) -> Hash {
        self.layers[self.height]
            .first()
            .copied()
            .unwrap_or(self.zeros[self.height])
    }

    pub fn history(&self) -> &RootHistory {
        &self.history
    }

    /// true for the current root and the previous `K - 1` roots
    pub fn is_known_root(&self, root: &Hash) -> bool {
        self.history.contains(root)
    }

    /// append leaves in order at the next free indices, producing one new root
    pub fn insert(&mut self, leaves: &[Hash]) -> Result<Hash> {
        if leaves.is_empty() {
            return Ok(self.root());
        }
        let requested = self.len() + leaves.len() as u64;
        if requested > self.capacity() {
            return Err(TreeError::TreeFull {
                capacity: self.capacity(),
                requested,
            });
        }

        for leaf in leaves {
            self.append(*leaf);
        }

        let root = self.root();
        self.history.push(root);
        Ok(root)
    }

    /// insert a batch padded with zero leaves up to `arity`
    pub fn insert_batch(&mut self, leaves: &[Hash], arity: usize) -> Result<Hash> {
        if leaves.len() > arity {
            return Err(TreeError::BatchTooLarge {
                len: leaves.len(),
                arity,
            });
        }
        let zero = zero_leaf();
        let mut batch = leaves.to_vec();
        batch.resize(arity, zero);
        self.insert(&batch)
    }

    pub fn leaf(&self, index: u64) -> Option<Hash> {
        self.layers[0].get(usize::try_from(index).ok()?).copied()
    }

    /// position of the first occurrence of `leaf`
    pub fn index_of(&self, leaf: &Hash) -> Option<u64> {
        self.layers[0]
            .iter()
            .position(|l| l == leaf)
            .map(|i| i as u64)
    }

    /// inclusion path for the leaf at `index` against the current root
    pub fn witness(&self, index: u64) -> Result<MerklePath> {
        let len = self.len();
        if index >= len {
            return Err(TreeError::IndexOutOfRange { index, len });
        }

        let mut siblings = Vec::with_capacity(self.height);
        let mut pos = index as usize;
        for level in 0..self.height {
            let sibling = self.layers[level]
                .get(pos ^ 1)
                .copied()
                .unwrap_or(self.zeros[level]);
            siblings.push(sibling);
            pos >>= 1;
        }

        Ok(MerklePath { index, siblings })
    }

    /// push one leaf and refresh its ancestors
    fn append(&mut self, leaf: Hash) {
        self.layers[0].push(leaf);
        let mut pos = self.layers[0].len() - 1;

        for level in 0..self.height {
            let parent_pos = pos >> 1;
            let left = self.layers[level][parent_pos << 1];
            let right = self.layers[level]
                .get((parent_pos << 1) | 1)
                .copied()
                .unwrap_or(self.zeros[level]);
            let parent = hash_siblings(&left, &right);

            let above = &mut self.layers[level + 1];
            if parent_pos < above.len() {
                above[parent_pos] = parent;
            } else {
                above.push(parent);
            }
            pos = parent_pos;
        }
    }
}

/// hash a layer pairwise into the next, padding an odd tail with `zero`
fn hash_layer(layer: &[Hash], zero: &Hash) -> Vec<Hash> {
    let pair = |chunk: &[Hash]| hash_siblings(&chunk[0], chunk.get(1).unwrap_or(zero));

    #[cfg(feature = "parallel")]
    {
        if layer.len() >= PARALLEL_THRESHOLD {
            return layer.par_chunks(2).map(pair).collect();
        }
    }

    layer.chunks(2).map(pair).collect()
}
