//! Content-addressed hexary Merkle trie.
//!
//! Nodes are stored by the keccak256 of their canonical encoding, so the
//! store is append-only and deduplicating: committing a new version of the
//! state only adds the nodes along the changed paths, and identical subtrees
//! across versions share storage. A trie root therefore is a complete,
//! verifiable commitment to its contents.

use crate::StateError;
use cairn_primitives::{constants::EMPTY_ROOT, encode, keccak256, H256};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A node of the trie.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Node {
    /// Terminal node holding a value at the remaining key path.
    Leaf {
        /// Remaining key nibbles below the parent.
        path: Vec<u8>,
        /// The stored value.
        value: Vec<u8>,
    },
    /// A shared path segment compressing a single-child run.
    Extension {
        /// The shared key nibbles.
        path: Vec<u8>,
        /// The node below the segment.
        child: H256,
    },
    /// A 16-way fan-out.
    Branch {
        /// One slot per nibble.
        children: [Option<H256>; 16],
        /// Value terminating exactly at this node, if any.
        value: Option<Vec<u8>>,
    },
}

impl Node {
    /// The hashes of all nodes directly referenced by this node.
    pub fn child_hashes(&self) -> Vec<H256> {
        match self {
            Node::Leaf { .. } => Vec::new(),
            Node::Extension { child, .. } => vec![*child],
            Node::Branch { children, .. } => children.iter().flatten().copied().collect(),
        }
    }
}

/// Expands a byte key into its nibble path.
pub(crate) fn to_nibbles(key: &[u8]) -> Vec<u8> {
    let mut nibbles = Vec::with_capacity(key.len() * 2);
    for byte in key {
        nibbles.push(byte >> 4);
        nibbles.push(byte & 0x0f);
    }
    nibbles
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

/// The shared, append-only store of trie nodes.
///
/// Holds the encoded form so content verification and serving node data to
/// peers are byte-exact.
#[derive(Debug, Default)]
pub struct NodeStore {
    nodes: RwLock<HashMap<H256, Vec<u8>>>,
}

impl NodeStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct nodes stored.
    pub fn len(&self) -> usize {
        self.nodes.read().len()
    }

    /// Whether the store holds no nodes.
    pub fn is_empty(&self) -> bool {
        self.nodes.read().is_empty()
    }

    /// Whether a node with this content hash is present.
    pub fn contains(&self, hash: &H256) -> bool {
        self.nodes.read().contains_key(hash)
    }

    /// The encoded bytes of a node, for serving to peers.
    pub fn raw(&self, hash: &H256) -> Option<Vec<u8>> {
        self.nodes.read().get(hash).cloned()
    }

    /// Stores a node, returning its content hash.
    pub fn insert_node(&self, node: &Node) -> H256 {
        let bytes = encode(node);
        let hash = keccak256(&bytes);
        self.nodes.write().entry(hash).or_insert(bytes);
        hash
    }

    /// Stores already-encoded node bytes received from a peer.
    ///
    /// The bytes must decode to a [`Node`]; the returned hash is the content
    /// hash callers compare against the hash they requested.
    pub fn insert_raw(&self, bytes: Vec<u8>) -> Result<H256, StateError> {
        let _: Node =
            bincode::deserialize(&bytes).map_err(|e| StateError::Decode(e.to_string()))?;
        let hash = keccak256(&bytes);
        self.nodes.write().entry(hash).or_insert(bytes);
        Ok(hash)
    }

    /// Loads and decodes a node.
    pub fn get_node(&self, hash: &H256) -> Result<Node, StateError> {
        let bytes = self.raw(hash).ok_or(StateError::NodeMissing(*hash))?;
        bincode::deserialize(&bytes).map_err(|e| StateError::Decode(e.to_string()))
    }

    /// Reads the value at `key` in the trie rooted at `root`.
    pub fn trie_get(&self, root: H256, key: &[u8]) -> Result<Option<Vec<u8>>, StateError> {
        if root == EMPTY_ROOT {
            return Ok(None)
        }
        let mut hash = root;
        let mut path = to_nibbles(key);
        loop {
            match self.get_node(&hash)? {
                Node::Leaf { path: leaf_path, value } => {
                    return Ok((leaf_path == path).then_some(value))
                }
                Node::Extension { path: ext_path, child } => {
                    if path.starts_with(&ext_path) {
                        path.drain(..ext_path.len());
                        hash = child;
                    } else {
                        return Ok(None)
                    }
                }
                Node::Branch { children, value } => {
                    if path.is_empty() {
                        return Ok(value)
                    }
                    match children[path[0] as usize] {
                        Some(child) => {
                            path.remove(0);
                            hash = child;
                        }
                        None => return Ok(None),
                    }
                }
            }
        }
    }

    /// Writes `value` at `key` into the trie rooted at `root`, returning the
    /// new root. The old version stays intact.
    pub fn trie_insert(
        &self,
        root: H256,
        key: &[u8],
        value: Vec<u8>,
    ) -> Result<H256, StateError> {
        let node = (root != EMPTY_ROOT).then_some(root);
        self.insert_below(node, &to_nibbles(key), value)
    }

    fn insert_below(
        &self,
        node: Option<H256>,
        path: &[u8],
        value: Vec<u8>,
    ) -> Result<H256, StateError> {
        let Some(hash) = node else {
            return Ok(self.insert_node(&Node::Leaf { path: path.to_vec(), value }))
        };
        match self.get_node(&hash)? {
            Node::Leaf { path: leaf_path, value: leaf_value } => {
                if leaf_path == path {
                    return Ok(self.insert_node(&Node::Leaf { path: path.to_vec(), value }))
                }
                let common = common_prefix_len(&leaf_path, path);
                let mut children = [None; 16];
                let mut branch_value = None;

                let old_rest = &leaf_path[common..];
                if old_rest.is_empty() {
                    branch_value = Some(leaf_value);
                } else {
                    let child = self.insert_node(&Node::Leaf {
                        path: old_rest[1..].to_vec(),
                        value: leaf_value,
                    });
                    children[old_rest[0] as usize] = Some(child);
                }

                let new_rest = &path[common..];
                if new_rest.is_empty() {
                    branch_value = Some(value);
                } else {
                    let child =
                        self.insert_node(&Node::Leaf { path: new_rest[1..].to_vec(), value });
                    children[new_rest[0] as usize] = Some(child);
                }

                let branch = self.insert_node(&Node::Branch { children, value: branch_value });
                Ok(self.wrap_extension(&path[..common], branch))
            }
            Node::Extension { path: ext_path, child } => {
                let common = common_prefix_len(&ext_path, path);
                if common == ext_path.len() {
                    let new_child = self.insert_below(Some(child), &path[common..], value)?;
                    return Ok(
                        self.insert_node(&Node::Extension { path: ext_path, child: new_child })
                    )
                }

                let mut children = [None; 16];
                let mut branch_value = None;

                // The surviving tail of the split extension.
                let ext_rest = &ext_path[common..];
                let below = if ext_rest.len() == 1 {
                    child
                } else {
                    self.insert_node(&Node::Extension { path: ext_rest[1..].to_vec(), child })
                };
                children[ext_rest[0] as usize] = Some(below);

                let new_rest = &path[common..];
                if new_rest.is_empty() {
                    branch_value = Some(value);
                } else {
                    let leaf =
                        self.insert_node(&Node::Leaf { path: new_rest[1..].to_vec(), value });
                    children[new_rest[0] as usize] = Some(leaf);
                }

                let branch = self.insert_node(&Node::Branch { children, value: branch_value });
                Ok(self.wrap_extension(&path[..common], branch))
            }
            Node::Branch { mut children, value: branch_value } => {
                if path.is_empty() {
                    return Ok(self.insert_node(&Node::Branch { children, value: Some(value) }))
                }
                let idx = path[0] as usize;
                let new_child = self.insert_below(children[idx], &path[1..], value)?;
                children[idx] = Some(new_child);
                Ok(self.insert_node(&Node::Branch { children, value: branch_value }))
            }
        }
    }

    fn wrap_extension(&self, shared: &[u8], child: H256) -> H256 {
        if shared.is_empty() {
            child
        } else {
            self.insert_node(&Node::Extension { path: shared.to_vec(), child })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(byte: u8) -> [u8; 32] {
        [byte; 32]
    }

    #[test]
    fn get_from_empty_trie() {
        let store = NodeStore::new();
        assert_eq!(store.trie_get(EMPTY_ROOT, &key(1)).unwrap(), None);
    }

    #[test]
    fn insert_and_get() {
        let store = NodeStore::new();
        let root = store.trie_insert(EMPTY_ROOT, &key(1), vec![1]).unwrap();
        let root = store.trie_insert(root, &key(2), vec![2]).unwrap();
        let root = store.trie_insert(root, &key(0x21), vec![3]).unwrap();

        assert_eq!(store.trie_get(root, &key(1)).unwrap(), Some(vec![1]));
        assert_eq!(store.trie_get(root, &key(2)).unwrap(), Some(vec![2]));
        assert_eq!(store.trie_get(root, &key(0x21)).unwrap(), Some(vec![3]));
        assert_eq!(store.trie_get(root, &key(9)).unwrap(), None);
    }

    #[test]
    fn overwrite_updates_value() {
        let store = NodeStore::new();
        let root = store.trie_insert(EMPTY_ROOT, &key(1), vec![1]).unwrap();
        let root = store.trie_insert(root, &key(1), vec![9]).unwrap();
        assert_eq!(store.trie_get(root, &key(1)).unwrap(), Some(vec![9]));
    }

    #[test]
    fn root_is_insertion_order_independent() {
        let store_a = NodeStore::new();
        let store_b = NodeStore::new();
        let keys = [key(1), key(2), key(0x13), key(0x31), key(0xff)];

        let mut root_a = EMPTY_ROOT;
        for k in keys.iter() {
            root_a = store_a.trie_insert(root_a, k, k.to_vec()).unwrap();
        }
        let mut root_b = EMPTY_ROOT;
        for k in keys.iter().rev() {
            root_b = store_b.trie_insert(root_b, k, k.to_vec()).unwrap();
        }
        assert_eq!(root_a, root_b);
    }

    #[test]
    fn old_versions_stay_readable() {
        let store = NodeStore::new();
        let v1 = store.trie_insert(EMPTY_ROOT, &key(1), vec![1]).unwrap();
        let v2 = store.trie_insert(v1, &key(1), vec![2]).unwrap();

        assert_eq!(store.trie_get(v1, &key(1)).unwrap(), Some(vec![1]));
        assert_eq!(store.trie_get(v2, &key(1)).unwrap(), Some(vec![2]));
    }

    #[test]
    fn identical_content_dedups_nodes() {
        let store = NodeStore::new();
        let root_a = store.trie_insert(EMPTY_ROOT, &key(1), vec![7]).unwrap();
        let before = store.len();
        // Re-deriving the same singleton trie adds nothing.
        let root_b = store.trie_insert(EMPTY_ROOT, &key(1), vec![7]).unwrap();
        assert_eq!(root_a, root_b);
        assert_eq!(store.len(), before);
    }

    #[test]
    fn raw_roundtrip_verifies_content() {
        let store = NodeStore::new();
        let root = store.trie_insert(EMPTY_ROOT, &key(3), vec![3]).unwrap();
        let raw = store.raw(&root).unwrap();

        let other = NodeStore::new();
        let inserted = other.insert_raw(raw).unwrap();
        assert_eq!(inserted, root);

        assert!(other.insert_raw(vec![0xde, 0xad]).is_err());
    }
}
