use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::{Rid, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::{BTreeNode, LeafNode};
use crate::index::btree::serialization::deserialize_node;
use crate::storage::buffer::{BufferPoolManager, PinnedPage};
use super::base::BPlusTree;

/// Forward scan over the leaf chain. The iterator pins its current leaf and
/// walks `next_leaf` pointers; it takes no latches between advances, so a
/// concurrent structural change may invalidate it. Single-threaded use only.
pub struct BTreeIterator<K> {
    buffer_pool: Arc<BufferPoolManager>,
    pinned: Option<PinnedPage>,
    node: Option<LeafNode<K>>,
    index: usize,
}

impl<K> BTreeIterator<K>
where
    K: Clone + Ord + DeserializeOwned,
{
    pub(crate) fn end(buffer_pool: Arc<BufferPoolManager>) -> Self {
        Self { buffer_pool, pinned: None, node: None, index: 0 }
    }

    pub(crate) fn at(
        buffer_pool: Arc<BufferPoolManager>,
        pinned: PinnedPage,
        node: LeafNode<K>,
        index: usize,
    ) -> Self {
        Self { buffer_pool, pinned: Some(pinned), node: Some(node), index }
    }

    /// True once the scan has run off the right edge of the tree
    pub fn is_end(&self) -> bool {
        self.node.is_none()
    }

    /// Release the current leaf and load the next one in the chain
    fn advance_leaf(&mut self) -> Option<()> {
        let next = self.node.as_ref()?.next_leaf;
        self.pinned = None;
        self.node = None;
        self.index = 0;
        if next == INVALID_PAGE_ID {
            return None;
        }

        let pinned = match self.buffer_pool.fetch_page_pinned(next) {
            Ok(Some(pinned)) => pinned,
            Ok(None) | Err(_) => {
                log::warn!("iterator lost leaf {} mid-scan, ending early", next);
                return None;
            }
        };
        let node = {
            let guard = pinned.read();
            match deserialize_node::<K>(&guard) {
                Ok(BTreeNode::Leaf(leaf)) => leaf,
                _ => {
                    log::warn!("iterator found non-leaf at {}, ending early", next);
                    return None;
                }
            }
        };
        self.pinned = Some(pinned);
        self.node = Some(node);
        Some(())
    }
}

impl<K> Iterator for BTreeIterator<K>
where
    K: Clone + Ord + DeserializeOwned,
{
    type Item = (K, Rid);

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let node = self.node.as_ref()?;
            if self.index < node.keys.len() {
                let item = (node.keys[self.index].clone(), node.values[self.index]);
                self.index += 1;
                return Some(item);
            }
            self.advance_leaf()?;
        }
    }
}

impl<K> BPlusTree<K>
where
    K: Clone + Ord + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Iterator positioned at the smallest key
    pub fn begin(&self) -> Result<BTreeIterator<K>, BTreeError> {
        self.descend_to_leaf(None)
    }

    /// Iterator positioned at the first key >= `key`
    pub fn begin_at(&self, key: &K) -> Result<BTreeIterator<K>, BTreeError> {
        self.descend_to_leaf(Some(key))
    }

    /// The past-the-end iterator
    pub fn end(&self) -> BTreeIterator<K> {
        BTreeIterator::end(Arc::clone(&self.buffer_pool))
    }

    /// Read-crab to the leftmost leaf (no key) or the lower-bound leaf
    fn descend_to_leaf(&self, key: Option<&K>) -> Result<BTreeIterator<K>, BTreeError> {
        let root_guard = self.root.read();
        let root_id = *root_guard;
        if root_id == INVALID_PAGE_ID {
            return Ok(self.end());
        }

        let mut pinned = self.fetch(root_id)?;
        let mut guard = pinned.read();
        drop(root_guard);

        loop {
            let node: BTreeNode<K> = deserialize_node(&guard)?;
            match node {
                BTreeNode::Leaf(leaf) => {
                    drop(guard);
                    let index = match key {
                        Some(key) => leaf.lower_bound(key),
                        None => 0,
                    };
                    let mut iter =
                        BTreeIterator::at(Arc::clone(&self.buffer_pool), pinned, leaf, index);
                    // A lower bound past the leaf's last key starts in the
                    // next leaf
                    if iter.node.as_ref().is_some_and(|n| iter.index >= n.keys.len()) {
                        let _ = iter.advance_leaf();
                    }
                    return Ok(iter);
                }
                BTreeNode::Internal(internal) => {
                    let child_id = match key {
                        Some(key) => internal.child_at(internal.child_index(key)),
                        None => internal.child_at(0),
                    };
                    let child_pinned = self.fetch(child_id)?;
                    let child_guard = child_pinned.read();
                    drop(guard);
                    guard = child_guard;
                    pinned = child_pinned;
                }
            }
        }
    }
}
