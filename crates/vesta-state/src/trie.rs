//! Root-addressed key/value tree
//!
//! The stores only rely on the [`Trie`] contract: read a key under a root,
//! and apply a batch of changes to a root yielding a new root. [`FlatTrie`]
//! implements it by storing each version as one RLP-encoded sorted map keyed
//! by its keccak hash. The empty map always has [`EMPTY_TRIE_ROOT`].

use crate::error::{StateError, StateResult};
use crate::kv::{cf, KeyValueStore};
use parking_lot::RwLock;
use rlp::{Rlp, RlpStream};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use vesta_primitives::{keccak256, H256, EMPTY_TRIE_ROOT};

/// Changes applied by [`Trie::write_batch`]; `None` deletes the key
pub type TrieChanges = BTreeMap<Vec<u8>, Option<Vec<u8>>>;

/// Versioned key/value tree identified by root hashes
pub trait Trie: Send + Sync {
    /// Read `key` from the tree named by `root`
    fn read(&self, root: &H256, key: &[u8]) -> StateResult<Option<Vec<u8>>>;

    /// Apply `changes` on top of `root` and return the new root.
    ///
    /// The tree at `root` stays readable afterwards.
    fn write_batch(&self, root: &H256, changes: TrieChanges) -> StateResult<H256>;
}

type Node = BTreeMap<Vec<u8>, Vec<u8>>;

/// Default number of decoded nodes kept in memory
pub const DEFAULT_NODE_CACHE: usize = 256;

/// Content-addressed flat tree over a [`KeyValueStore`]
pub struct FlatTrie {
    store: Arc<dyn KeyValueStore>,
    nodes: RwLock<HashMap<H256, Arc<Node>>>,
    cache_limit: usize,
}

impl FlatTrie {
    /// Create a tree persisting into `store`
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_cache_limit(store, DEFAULT_NODE_CACHE)
    }

    /// Create a tree with a custom node cache size
    pub fn with_cache_limit(store: Arc<dyn KeyValueStore>, cache_limit: usize) -> Self {
        Self {
            store,
            nodes: RwLock::new(HashMap::new()),
            cache_limit: cache_limit.max(1),
        }
    }

    /// Every key/value pair under `root`, in key order
    pub fn entries(&self, root: &H256) -> StateResult<Vec<(Vec<u8>, Vec<u8>)>> {
        let node = self.load(root)?;
        Ok(node.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
    }

    fn load(&self, root: &H256) -> StateResult<Arc<Node>> {
        if *root == EMPTY_TRIE_ROOT {
            return Ok(Arc::new(Node::new()));
        }
        if let Some(node) = self.nodes.read().get(root) {
            return Ok(Arc::clone(node));
        }

        let raw = self
            .store
            .get(cf::TRIE, root.as_bytes())?
            .ok_or(StateError::MissingTrieNode(*root))?;
        let node = Arc::new(decode_node(&raw)?);
        self.remember(*root, Arc::clone(&node));
        Ok(node)
    }

    fn remember(&self, root: H256, node: Arc<Node>) {
        let mut nodes = self.nodes.write();
        if nodes.len() >= self.cache_limit {
            nodes.clear();
        }
        nodes.insert(root, node);
    }
}

impl Trie for FlatTrie {
    fn read(&self, root: &H256, key: &[u8]) -> StateResult<Option<Vec<u8>>> {
        Ok(self.load(root)?.get(key).cloned())
    }

    fn write_batch(&self, root: &H256, changes: TrieChanges) -> StateResult<H256> {
        if changes.is_empty() {
            return Ok(*root);
        }

        let mut node = (*self.load(root)?).clone();
        for (key, value) in changes {
            match value {
                Some(value) => node.insert(key, value),
                None => node.remove(&key),
            };
        }

        if node.is_empty() {
            return Ok(EMPTY_TRIE_ROOT);
        }

        let encoded = encode_node(&node);
        let new_root = keccak256(&encoded);
        self.store.put(cf::TRIE, new_root.as_bytes(), &encoded)?;
        self.remember(new_root, Arc::new(node));
        tracing::trace!(%root, %new_root, "trie batch written");
        Ok(new_root)
    }
}

fn encode_node(node: &Node) -> Vec<u8> {
    let mut stream = RlpStream::new_list(node.len());
    for (key, value) in node {
        stream.begin_list(2);
        stream.append(key);
        stream.append(value);
    }
    stream.out().to_vec()
}

fn decode_node(raw: &[u8]) -> StateResult<Node> {
    let rlp = Rlp::new(raw);
    let mut node = Node::new();
    for item in rlp.iter() {
        let key: Vec<u8> = item.val_at(0)?;
        let value: Vec<u8> = item.val_at(1)?;
        node.insert(key, value);
    }
    Ok(node)
}
