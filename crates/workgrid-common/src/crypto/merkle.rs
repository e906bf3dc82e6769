//! Merkle Tree for the completion audit trail
//!
//! Binary Merkle tree using BLAKE3. A level with an odd node count pairs its
//! last node with itself. Roots of earlier tree sizes remain reproducible
//! with [`MerkleTree::root_at`], so a record's inclusion can be checked
//! against the root that was current when it was appended.

use serde::{Deserialize, Serialize};

/// Hash size in bytes (BLAKE3 output)
pub const HASH_SIZE: usize = 32;

/// Merkle proof containing sibling hashes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MerkleProof {
    /// Leaf index in the tree
    pub leaf_index: u64,
    /// Sibling hashes from leaf to root
    pub siblings: Vec<[u8; HASH_SIZE]>,
    /// Root hash this proof validates against
    pub root: [u8; HASH_SIZE],
}

impl MerkleProof {
    /// Verify the proof for a given leaf hash
    pub fn verify(&self, leaf_hash: &[u8; HASH_SIZE]) -> bool {
        MerkleTree::verify_proof(leaf_hash, &self.siblings, self.leaf_index, &self.root)
    }
}

/// Append-only binary Merkle tree
#[derive(Debug, Clone, Default)]
pub struct MerkleTree {
    leaves: Vec<[u8; HASH_SIZE]>,
}

impl MerkleTree {
    /// Create a new empty Merkle tree
    pub fn new() -> Self {
        Self { leaves: Vec::new() }
    }

    /// Create a tree from existing leaf hashes
    pub fn from_leaves(leaves: Vec<[u8; HASH_SIZE]>) -> Self {
        Self { leaves }
    }

    /// Get number of leaves
    pub fn leaf_count(&self) -> u64 {
        self.leaves.len() as u64
    }

    /// Append a new leaf, returning its index
    pub fn append(&mut self, leaf_hash: [u8; HASH_SIZE]) -> u64 {
        self.leaves.push(leaf_hash);
        self.leaves.len() as u64 - 1
    }

    /// Get current root hash
    pub fn root(&self) -> Option<[u8; HASH_SIZE]> {
        self.root_at(self.leaf_count())
    }

    /// Root of the tree as it was when it held `size` leaves
    pub fn root_at(&self, size: u64) -> Option<[u8; HASH_SIZE]> {
        if size == 0 || size > self.leaf_count() {
            return None;
        }
        let levels = build_levels(&self.leaves[..size as usize]);
        levels.last().and_then(|top| top.first().copied())
    }

    /// Generate proof for a leaf at the given index
    pub fn generate_proof(&self, leaf_index: u64) -> Option<MerkleProof> {
        if leaf_index >= self.leaf_count() {
            return None;
        }

        let levels = build_levels(&self.leaves);
        let root = levels.last()?.first().copied()?;

        let mut siblings = Vec::with_capacity(levels.len().saturating_sub(1));
        let mut index = leaf_index as usize;
        for level in &levels[..levels.len() - 1] {
            let sibling_index = if index % 2 == 0 { index + 1 } else { index - 1 };
            // Odd level: the last node is paired with itself
            let sibling = level.get(sibling_index).unwrap_or(&level[index]);
            siblings.push(*sibling);
            index /= 2;
        }

        Some(MerkleProof {
            leaf_index,
            siblings,
            root,
        })
    }

    /// Static method to verify a Merkle proof
    pub fn verify_proof(
        leaf_hash: &[u8; HASH_SIZE],
        siblings: &[[u8; HASH_SIZE]],
        leaf_index: u64,
        expected_root: &[u8; HASH_SIZE],
    ) -> bool {
        let mut current = *leaf_hash;
        let mut index = leaf_index;

        for sibling in siblings {
            current = if index % 2 == 0 {
                hash_pair(&current, sibling)
            } else {
                hash_pair(sibling, &current)
            };
            index /= 2;
        }

        current == *expected_root
    }
}

fn build_levels(leaves: &[[u8; HASH_SIZE]]) -> Vec<Vec<[u8; HASH_SIZE]>> {
    let mut levels = vec![leaves.to_vec()];
    while levels.last().map_or(false, |level| level.len() > 1) {
        let prev = &levels[levels.len() - 1];
        let next = prev
            .chunks(2)
            .map(|pair| hash_pair(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
        levels.push(next);
    }
    levels
}

/// Hash two child nodes to create parent
#[inline]
pub fn hash_pair(left: &[u8; HASH_SIZE], right: &[u8; HASH_SIZE]) -> [u8; HASH_SIZE] {
    let mut hasher = blake3::Hasher::new();
    hasher.update(left);
    hasher.update(right);
    *hasher.finalize().as_bytes()
}

/// Hash data to create leaf hash
#[inline]
pub fn hash_leaf(data: &[u8]) -> [u8; HASH_SIZE] {
    *blake3::hash(data).as_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_pair() {
        let left = [1u8; HASH_SIZE];
        let right = [2u8; HASH_SIZE];

        // Order matters
        assert_ne!(hash_pair(&left, &right), hash_pair(&right, &left));
    }

    #[test]
    fn test_empty_tree() {
        let tree = MerkleTree::new();
        assert_eq!(tree.leaf_count(), 0);
        assert!(tree.root().is_none());
        assert!(tree.generate_proof(0).is_none());
    }

    #[test]
    fn test_single_leaf_root_is_leaf() {
        let mut tree = MerkleTree::new();
        let leaf = hash_leaf(b"only");
        tree.append(leaf);
        assert_eq!(tree.root(), Some(leaf));
        assert!(tree.generate_proof(0).unwrap().verify(&leaf));
    }

    #[test]
    fn test_proofs_for_every_leaf() {
        for count in 1..=9u8 {
            let leaves: Vec<_> = (0..count).map(|i| hash_leaf(&[i])).collect();
            let tree = MerkleTree::from_leaves(leaves.clone());

            for (i, leaf) in leaves.iter().enumerate() {
                let proof = tree.generate_proof(i as u64).unwrap();
                assert!(proof.verify(leaf), "leaf {} of {}", i, count);
                assert!(!proof.verify(&hash_leaf(b"wrong")));
            }
        }
    }

    #[test]
    fn test_root_at_earlier_size() {
        let mut tree = MerkleTree::new();
        tree.append(hash_leaf(b"a"));
        tree.append(hash_leaf(b"b"));
        let root_two = tree.root().unwrap();

        tree.append(hash_leaf(b"c"));
        assert_ne!(tree.root().unwrap(), root_two);
        assert_eq!(tree.root_at(2), Some(root_two));
        assert_eq!(tree.root_at(4), None);
    }
}
