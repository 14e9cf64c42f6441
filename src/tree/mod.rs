//! Poseidon Commitment Tree
//!
//! Append-only binary Merkle tree of depth 20 over the BN254 scalar field,
//! with Poseidon as the inner hash and the field zero as the empty-leaf
//! value. The incremental insert keeps the latest left-child hash per level
//! (`filled_subtrees`), so each insertion is O(depth); all computed nodes are
//! retained per level so membership proofs are pure lookups.
//!
//! The tree mirrors the on-chain contract exactly: a locally computed root is
//! byte-identical to what the chain produces for the same leaf sequence.

use ark_bn254::Fr;
use ark_ff::Zero;
use light_poseidon::{Poseidon, PoseidonHasher};
use thiserror::Error;

use crate::types::Field;

/// Tree depth; capacity is 2^20 leaves.
pub const TREE_DEPTH: usize = 20;

/// Shared handle serializing tree access across the watcher, the transfer
/// pipeline, and the API readers.
pub type SharedTree = std::sync::Arc<tokio::sync::RwLock<CommitmentTree>>;

/// Maximum number of leaves.
pub const MAX_LEAVES: u64 = 1 << TREE_DEPTH;

/// Tree errors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("commitment tree is full ({MAX_LEAVES} leaves)")]
    Full,

    #[error("leaf index {index} out of range (leaf count {leaf_count})")]
    OutOfRange { index: u64, leaf_count: u64 },

    #[error("poseidon hash failed: {0}")]
    Hash(String),
}

/// Membership proof for a single leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleProof {
    pub leaf_index: u64,
    /// Sibling hashes, leaf level first
    pub siblings: Vec<Field>,
    /// 0 when the path node is the left child at that level, 1 when right
    pub directions: Vec<u8>,
    /// Root the proof commits to
    pub root: Field,
}

/// The in-memory commitment tree.
///
/// Not internally synchronized; the kernel wraps it in a lock so that
/// insertions from the watcher and the transfer pipeline serialize.
pub struct CommitmentTree {
    hasher: Poseidon<Fr>,
    /// Per-level empty subtree hashes, z[0..=TREE_DEPTH]
    zeros: Vec<Fr>,
    /// Latest left-child hash seen per level
    filled_subtrees: Vec<Fr>,
    /// All computed nodes: levels[0] = leaves, levels[TREE_DEPTH] = [root]
    levels: Vec<Vec<Fr>>,
    leaf_count: u64,
}

impl CommitmentTree {
    /// Build an empty tree, precomputing the empty-subtree hash chain
    /// `z[i] = Poseidon(z[i-1], z[i-1])`.
    pub fn new() -> Result<Self, TreeError> {
        let mut hasher =
            Poseidon::<Fr>::new_circom(2).map_err(|e| TreeError::Hash(e.to_string()))?;

        let mut zeros = Vec::with_capacity(TREE_DEPTH + 1);
        zeros.push(Fr::zero());
        for level in 1..=TREE_DEPTH {
            let below = zeros[level - 1];
            let z = hasher
                .hash(&[below, below])
                .map_err(|e| TreeError::Hash(e.to_string()))?;
            zeros.push(z);
        }

        let filled_subtrees = zeros[..TREE_DEPTH].to_vec();

        Ok(Self {
            hasher,
            zeros,
            filled_subtrees,
            levels: vec![Vec::new(); TREE_DEPTH + 1],
            leaf_count: 0,
        })
    }

    /// Append a commitment, returning its assigned leaf index.
    pub fn insert(&mut self, commitment: Field) -> Result<u64, TreeError> {
        if self.leaf_count == MAX_LEAVES {
            return Err(TreeError::Full);
        }

        let leaf_index = self.leaf_count;
        let mut current = commitment.to_fr();
        let mut index = leaf_index;

        set_node(&mut self.levels[0], index as usize, current);

        for level in 0..TREE_DEPTH {
            current = if index & 1 == 0 {
                self.filled_subtrees[level] = current;
                self.hash_pair(current, self.zeros[level])?
            } else {
                self.hash_pair(self.filled_subtrees[level], current)?
            };
            index >>= 1;
            set_node(&mut self.levels[level + 1], index as usize, current);
        }

        self.leaf_count += 1;
        Ok(leaf_index)
    }

    /// The current root; the empty-tree root is z[TREE_DEPTH].
    pub fn root(&self) -> Field {
        let root = self
            .levels[TREE_DEPTH]
            .first()
            .copied()
            .unwrap_or(self.zeros[TREE_DEPTH]);
        Field::from_fr(&root)
    }

    /// Membership proof for the leaf at `leaf_index`.
    pub fn proof(&self, leaf_index: u64) -> Result<MerkleProof, TreeError> {
        if leaf_index >= self.leaf_count {
            return Err(TreeError::OutOfRange {
                index: leaf_index,
                leaf_count: self.leaf_count,
            });
        }

        let mut siblings = Vec::with_capacity(TREE_DEPTH);
        let mut directions = Vec::with_capacity(TREE_DEPTH);
        let mut index = leaf_index as usize;

        for level in 0..TREE_DEPTH {
            let sibling = self.levels[level]
                .get(index ^ 1)
                .copied()
                .unwrap_or(self.zeros[level]);
            siblings.push(Field::from_fr(&sibling));
            directions.push((index & 1) as u8);
            index >>= 1;
        }

        Ok(MerkleProof {
            leaf_index,
            siblings,
            directions,
            root: self.root(),
        })
    }

    pub fn leaf_count(&self) -> u64 {
        self.leaf_count
    }

    /// The leaf value at `leaf_index`, if present.
    pub fn leaf(&self, leaf_index: u64) -> Option<Field> {
        if leaf_index >= self.leaf_count {
            return None;
        }
        self.levels[0]
            .get(leaf_index as usize)
            .map(Field::from_fr)
    }

    fn hash_pair(&mut self, left: Fr, right: Fr) -> Result<Fr, TreeError> {
        self.hasher
            .hash(&[left, right])
            .map_err(|e| TreeError::Hash(e.to_string()))
    }
}

fn set_node(level: &mut Vec<Fr>, index: usize, value: Fr) {
    if index < level.len() {
        level[index] = value;
    } else {
        // Insertion order guarantees contiguous indices, so this is a push.
        level.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(byte: u8) -> Field {
        Field::from_be_bytes([byte; 32]).unwrap()
    }

    /// Walk a proof back up to its root with a fresh hasher.
    fn reconstruct_root(proof: &MerkleProof, leaf: Field) -> Field {
        let mut hasher = Poseidon::<Fr>::new_circom(2).unwrap();
        let mut current = leaf.to_fr();
        for (sibling, direction) in proof.siblings.iter().zip(&proof.directions) {
            current = if *direction == 0 {
                hasher.hash(&[current, sibling.to_fr()]).unwrap()
            } else {
                hasher.hash(&[sibling.to_fr(), current]).unwrap()
            };
        }
        Field::from_fr(&current)
    }

    #[test]
    fn test_empty_tree() {
        let tree = CommitmentTree::new().unwrap();
        assert_eq!(tree.leaf_count(), 0);

        // root of the empty tree is the level-20 zero hash
        let mut hasher = Poseidon::<Fr>::new_circom(2).unwrap();
        let mut z = Fr::zero();
        for _ in 0..TREE_DEPTH {
            z = hasher.hash(&[z, z]).unwrap();
        }
        assert_eq!(tree.root(), Field::from_fr(&z));

        assert_eq!(
            tree.proof(0),
            Err(TreeError::OutOfRange {
                index: 0,
                leaf_count: 0
            })
        );
    }

    #[test]
    fn test_single_insert() {
        let mut tree = CommitmentTree::new().unwrap();
        let c = field(0x01);

        let index = tree.insert(c).unwrap();
        assert_eq!(index, 0);
        assert_eq!(tree.leaf_count(), 1);
        assert_eq!(tree.leaf(0), Some(c));

        let proof = tree.proof(0).unwrap();
        assert_eq!(proof.root, tree.root());
        assert_eq!(reconstruct_root(&proof, c), tree.root());
    }

    #[test]
    fn test_proofs_consistent_for_all_leaves() {
        let mut tree = CommitmentTree::new().unwrap();
        let leaves: Vec<Field> = (1u8..=5).map(field).collect();
        for leaf in &leaves {
            tree.insert(*leaf).unwrap();
        }

        for (i, leaf) in leaves.iter().enumerate() {
            let proof = tree.proof(i as u64).unwrap();
            assert_eq!(proof.root, tree.root());
            assert_eq!(reconstruct_root(&proof, *leaf), tree.root());
            assert_eq!(proof.siblings.len(), TREE_DEPTH);
            assert_eq!(proof.directions.len(), TREE_DEPTH);
        }
    }

    #[test]
    fn test_identical_sequences_agree() {
        let mut a = CommitmentTree::new().unwrap();
        let mut b = CommitmentTree::new().unwrap();
        for byte in [0x0a, 0x0b, 0x0c] {
            a.insert(field(byte)).unwrap();
            b.insert(field(byte)).unwrap();
        }
        assert_eq!(a.root(), b.root());
        assert_eq!(a.proof(1), b.proof(1));
    }

    #[test]
    fn test_insertion_order_changes_root() {
        let mut a = CommitmentTree::new().unwrap();
        let mut b = CommitmentTree::new().unwrap();
        a.insert(field(0x0a)).unwrap();
        a.insert(field(0x0b)).unwrap();
        b.insert(field(0x0b)).unwrap();
        b.insert(field(0x0a)).unwrap();
        assert_ne!(a.root(), b.root());
    }

    #[test]
    fn test_root_changes_on_each_insert() {
        let mut tree = CommitmentTree::new().unwrap();
        let r0 = tree.root();
        tree.insert(field(0x0a)).unwrap();
        let r1 = tree.root();
        tree.insert(field(0x0b)).unwrap();
        let r2 = tree.root();
        assert_ne!(r0, r1);
        assert_ne!(r1, r2);
    }
}
