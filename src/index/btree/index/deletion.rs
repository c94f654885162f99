use parking_lot::RwLockWriteGuard;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::{PageId, PageReadGuard, PageWriteGuard, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::{BTreeNode, InternalNode};
use crate::index::btree::serialization::{deserialize_node, serialize_node};
use crate::storage::buffer::PinnedPage;
use super::base::{BPlusTree, LatchContext, WriteOp};

/// A sibling page latched for a borrow or merge. Not part of the descent
/// path; it lives only for one rebalance step. The latch drops before the
/// pin.
struct Sibling<K> {
    guard: PageWriteGuard,
    pinned: PinnedPage,
    node: BTreeNode<K>,
}

impl<K: Serialize> Sibling<K> {
    fn write_back(&mut self) -> Result<(), BTreeError> {
        serialize_node(&self.node, &mut self.guard)?;
        self.pinned.mark_dirty();
        Ok(())
    }
}

impl<K> BPlusTree<K>
where
    K: Clone + Ord + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Remove a key. Returns false when the key is not in the tree.
    pub fn remove(&self, key: &K) -> Result<bool, BTreeError> {
        if let Some(removed) = self.remove_optimistic(key)? {
            return Ok(removed);
        }
        self.remove_pessimistic(key)
    }

    /// Optimistic pass: the delete is local when the leaf stays at or above
    /// its minimum
    fn remove_optimistic(&self, key: &K) -> Result<Option<bool>, BTreeError> {
        let root_guard = self.root.read();
        let root_id = *root_guard;
        if root_id == INVALID_PAGE_ID {
            return Ok(Some(false));
        }
        let mut root_latch = Some(root_guard);
        let mut parent: Option<(PageReadGuard, PinnedPage)> = None;

        let mut pinned = self.fetch(root_id)?;
        let mut guard = pinned.read();

        loop {
            let node: BTreeNode<K> = deserialize_node(&guard)?;
            match node {
                BTreeNode::Internal(internal) => {
                    let child_id = internal.child_at(internal.child_index(key));
                    let child_pinned = self.fetch(child_id)?;
                    let child_guard = child_pinned.read();
                    let released = parent.replace((guard, pinned));
                    drop(released);
                    root_latch = None;
                    guard = child_guard;
                    pinned = child_pinned;
                }
                BTreeNode::Leaf(_) => {
                    // Swap the leaf latch read-for-write under the parent
                    // latch, as on the insert path
                    drop(guard);
                    let mut wguard = pinned.write();
                    let BTreeNode::Leaf(mut leaf) = deserialize_node(&wguard)? else {
                        return Err(BTreeError::Corrupt("leaf turned into an internal node"));
                    };
                    drop(parent.take());
                    drop(root_latch.take());

                    if leaf.get(key).is_none() {
                        return Ok(Some(false));
                    }
                    let is_root = leaf.parent_page_id == INVALID_PAGE_ID;
                    let safe = if is_root { leaf.size() > 1 } else { leaf.size() > leaf.min_size() };
                    if !safe {
                        return Ok(None);
                    }
                    leaf.remove(key);
                    serialize_node(&BTreeNode::Leaf(leaf), &mut wguard)?;
                    pinned.mark_dirty();
                    return Ok(Some(true));
                }
            }
        }
    }

    /// Pessimistic pass: write-latch the path, then borrow, merge and
    /// collapse upward as needed
    fn remove_pessimistic(&self, key: &K) -> Result<bool, BTreeError> {
        let root_guard = self.root.write();
        let root_id = *root_guard;
        if root_id == INVALID_PAGE_ID {
            return Ok(false);
        }

        let mut root_latch = Some(root_guard);
        let mut ctx = LatchContext::new();
        self.descend_pessimistic(key, WriteOp::Delete, &mut root_latch, &mut ctx, root_id)?;

        {
            let Some(entry) = ctx.path.last_mut() else {
                return Err(BTreeError::Corrupt("empty descent path"));
            };
            let BTreeNode::Leaf(leaf) = &mut entry.node else {
                return Err(BTreeError::Corrupt("descent did not end at a leaf"));
            };
            if !leaf.remove(key) {
                return Ok(false);
            }
            entry.dirty = true;
        }

        let mut level = ctx.path.len() - 1;
        loop {
            if ctx.path[level].node.parent_page_id() == INVALID_PAGE_ID {
                self.collapse_root(&mut root_latch, &mut ctx)?;
                break;
            }
            let node = &ctx.path[level].node;
            if node.size() >= node.min_size() {
                break;
            }
            self.rebalance(&mut ctx, level)?;
            level -= 1;
        }

        self.finish_context(ctx)?;
        Ok(true)
    }

    fn latch_sibling(
        &self,
        parent: &InternalNode<K>,
        idx: Option<usize>,
    ) -> Result<Option<Sibling<K>>, BTreeError> {
        let Some(idx) = idx else {
            return Ok(None);
        };
        let pinned = self.fetch(parent.children[idx])?;
        let guard = pinned.write();
        let node: BTreeNode<K> = deserialize_node(&guard)?;
        Ok(Some(Sibling { guard, pinned, node }))
    }

    /// Fix one underflowing node: borrow from a sibling that can spare an
    /// entry (left preferred), else merge with a sibling (into the left
    /// preferred). The parent loses a separator on merge; the caller
    /// re-examines it.
    fn rebalance(&self, ctx: &mut LatchContext<K>, level: usize) -> Result<(), BTreeError> {
        let mut repoints: Vec<(PageId, PageId)> = Vec::new();

        let (upper, lower) = ctx.path.split_at_mut(level);
        let Some(parent_entry) = upper.last_mut() else {
            return Err(BTreeError::Corrupt("underflowing node with no latched parent"));
        };
        let BTreeNode::Internal(parent) = &mut parent_entry.node else {
            return Err(BTreeError::Corrupt("leaf on an internal level"));
        };
        let Some(entry) = lower.first_mut() else {
            return Err(BTreeError::Corrupt("missing path entry"));
        };
        let node_id = entry.node.page_id();
        let Some(idx) = parent.children.iter().position(|&c| c == node_id) else {
            return Err(BTreeError::Corrupt("node missing from its parent"));
        };

        let mut resolved = false;

        let mut left = self.latch_sibling(parent, idx.checked_sub(1))?;
        if let Some(sib) = left.as_mut() {
            if sib.node.size() > sib.node.min_size() {
                Self::borrow_from_left(parent, idx, &mut sib.node, &mut entry.node, &mut repoints)?;
                sib.write_back()?;
                parent_entry.dirty = true;
                entry.dirty = true;
                resolved = true;
            }
        }

        let right_idx = if idx + 1 < parent.children.len() { Some(idx + 1) } else { None };
        let mut right = if resolved { None } else { self.latch_sibling(parent, right_idx)? };
        if !resolved {
            if let Some(sib) = right.as_mut() {
                if sib.node.size() > sib.node.min_size() {
                    Self::borrow_from_right(parent, idx, &mut sib.node, &mut entry.node, &mut repoints)?;
                    sib.write_back()?;
                    parent_entry.dirty = true;
                    entry.dirty = true;
                    resolved = true;
                }
            }
        }

        if !resolved {
            if let Some(mut sib) = left.take() {
                // Merge this node into its left sibling; this page dies
                Self::merge_nodes(parent, idx, &mut sib.node, &mut entry.node, &mut repoints)?;
                sib.write_back()?;
                entry.dead = true;
                ctx.deleted.push(node_id);
                parent_entry.dirty = true;
            } else if let Some(sib) = right.take() {
                // Leftmost child: merge the right sibling into this node
                let mut sib = sib;
                let sib_id = sib.node.page_id();
                Self::merge_nodes(parent, idx + 1, &mut entry.node, &mut sib.node, &mut repoints)?;
                drop(sib);
                ctx.deleted.push(sib_id);
                parent_entry.dirty = true;
                entry.dirty = true;
            } else {
                return Err(BTreeError::Corrupt("non-root node with no siblings"));
            }
        }

        drop(left);
        drop(right);
        if !repoints.is_empty() {
            self.apply_repoints(ctx, level, repoints)?;
        }
        Ok(())
    }

    /// Transfer the left sibling's last entry to the front of the deficient
    /// node and update the parent separator
    fn borrow_from_left(
        parent: &mut InternalNode<K>,
        idx: usize,
        left: &mut BTreeNode<K>,
        node: &mut BTreeNode<K>,
        repoints: &mut Vec<(PageId, PageId)>,
    ) -> Result<(), BTreeError> {
        match (left, node) {
            (BTreeNode::Leaf(left), BTreeNode::Leaf(node)) => {
                let (Some(key), Some(value)) = (left.keys.pop(), left.values.pop()) else {
                    return Err(BTreeError::Corrupt("borrow from an empty leaf"));
                };
                node.keys.insert(0, key.clone());
                node.values.insert(0, value);
                parent.keys[idx] = key;
            }
            (BTreeNode::Internal(left), BTreeNode::Internal(node)) => {
                let (Some(moved_key), Some(child)) = (left.keys.pop(), left.children.pop()) else {
                    return Err(BTreeError::Corrupt("borrow from an empty internal node"));
                };
                // The old separator descends into the node; the moved key
                // becomes the new separator
                let old_separator = std::mem::replace(&mut parent.keys[idx], moved_key);
                node.children.insert(0, child);
                node.keys.insert(1, old_separator);
                repoints.push((child, node.page_id));
            }
            _ => return Err(BTreeError::Corrupt("sibling kind mismatch")),
        }
        Ok(())
    }

    /// Transfer the right sibling's first entry to the back of the deficient
    /// node, rotating separators through the parent
    fn borrow_from_right(
        parent: &mut InternalNode<K>,
        idx: usize,
        right: &mut BTreeNode<K>,
        node: &mut BTreeNode<K>,
        repoints: &mut Vec<(PageId, PageId)>,
    ) -> Result<(), BTreeError> {
        match (right, node) {
            (BTreeNode::Leaf(right), BTreeNode::Leaf(node)) => {
                let key = right.keys.remove(0);
                let value = right.values.remove(0);
                node.keys.push(key);
                node.values.push(value);
                parent.keys[idx + 1] = right.keys[0].clone();
            }
            (BTreeNode::Internal(right), BTreeNode::Internal(node)) => {
                let child = right.children.remove(0);
                let old_separator = std::mem::replace(&mut parent.keys[idx + 1], right.keys.remove(1));
                node.keys.push(old_separator);
                node.children.push(child);
                repoints.push((child, node.page_id));
            }
            _ => return Err(BTreeError::Corrupt("sibling kind mismatch")),
        }
        Ok(())
    }

    /// Concatenate the node at parent slot `right_idx` onto its left
    /// neighbor and drop its separator from the parent. The caller decides
    /// which page dies.
    fn merge_nodes(
        parent: &mut InternalNode<K>,
        right_idx: usize,
        left: &mut BTreeNode<K>,
        right: &mut BTreeNode<K>,
        repoints: &mut Vec<(PageId, PageId)>,
    ) -> Result<(), BTreeError> {
        match (left, right) {
            (BTreeNode::Leaf(left), BTreeNode::Leaf(right)) => {
                left.keys.append(&mut right.keys);
                left.values.append(&mut right.values);
                left.next_leaf = right.next_leaf;
            }
            (BTreeNode::Internal(left), BTreeNode::Internal(right)) => {
                // The separator becomes a real key of the merged node, in
                // place of the right node's sentinel
                let separator = parent.keys[right_idx].clone();
                left.keys.push(separator);
                left.keys.extend(right.keys.drain(..).skip(1));
                for child in right.children.drain(..) {
                    repoints.push((child, left.page_id));
                    left.children.push(child);
                }
            }
            _ => return Err(BTreeError::Corrupt("sibling kind mismatch")),
        }
        parent.remove_at(right_idx);
        Ok(())
    }

    /// Shrink the tree at the top: an internal root with a single child
    /// hands the root role to that child; an empty root leaf empties the
    /// tree.
    fn collapse_root(
        &self,
        root_latch: &mut Option<RwLockWriteGuard<'_, PageId>>,
        ctx: &mut LatchContext<K>,
    ) -> Result<(), BTreeError> {
        let (old_root_id, new_root) = match &ctx.path[0].node {
            BTreeNode::Internal(root) if root.size() == 1 => (root.page_id, Some(root.children[0])),
            BTreeNode::Leaf(root) if root.size() == 0 => (root.page_id, None),
            _ => return Ok(()),
        };

        let Some(latch) = root_latch.as_mut() else {
            // A collapsing root is never safe, so its latch must still be held
            return Err(BTreeError::Corrupt("root collapse without the root latch"));
        };

        match new_root {
            Some(child_id) => {
                self.apply_repoints(ctx, 0, vec![(child_id, INVALID_PAGE_ID)])?;
                **latch = child_id;
                self.update_root_record(child_id)?;
                log::debug!(
                    "index {}: root {} collapsed into {}",
                    self.index_name,
                    old_root_id,
                    child_id
                );
            }
            None => {
                **latch = INVALID_PAGE_ID;
                self.update_root_record(INVALID_PAGE_ID)?;
                log::debug!("index {}: tree emptied, root {} freed", self.index_name, old_root_id);
            }
        }

        ctx.path[0].dead = true;
        ctx.deleted.push(old_root_id);
        Ok(())
    }
}
