use parking_lot::RwLockWriteGuard;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::{PageId, PageReadGuard, Rid, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::{BTreeNode, InternalNode, LeafNode};
use crate::index::btree::serialization::{deserialize_node, serialize_node};
use crate::storage::buffer::PinnedPage;
use super::base::{BPlusTree, LatchContext, WriteOp};

impl<K> BPlusTree<K>
where
    K: Clone + Ord + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Insert a key/value pair. Returns false when the key already exists;
    /// duplicate keys are not supported.
    pub fn insert(&self, key: K, value: Rid) -> Result<bool, BTreeError> {
        if let Some(done) = self.insert_optimistic(&key, value)? {
            return Ok(done);
        }
        self.insert_pessimistic(key, value)
    }

    /// Optimistic pass: read-latch down, write-latch only the leaf. Gives up
    /// (returns `None`) when the leaf could split.
    fn insert_optimistic(&self, key: &K, value: Rid) -> Result<Option<bool>, BTreeError> {
        let root_guard = self.root.read();
        let root_id = *root_guard;
        if root_id == INVALID_PAGE_ID {
            // Tree creation changes the root id; that needs the write latch
            return Ok(None);
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
                    // Child latched: the current page becomes the parent and
                    // the previous parent (or the root latch) is released
                    let released = parent.replace((guard, pinned));
                    drop(released);
                    root_latch = None;
                    guard = child_guard;
                    pinned = child_pinned;
                }
                BTreeNode::Leaf(_) => {
                    // Swap the leaf's read latch for a write latch. The
                    // parent latch (or the root latch when the leaf is the
                    // root) is still held, so the leaf's key range cannot
                    // shift between the two latches.
                    drop(guard);
                    let mut wguard = pinned.write();
                    let BTreeNode::Leaf(mut leaf) = deserialize_node(&wguard)? else {
                        return Err(BTreeError::Corrupt("leaf turned into an internal node"));
                    };
                    drop(parent.take());
                    drop(root_latch.take());

                    if leaf.get(key).is_some() {
                        return Ok(Some(false));
                    }
                    if leaf.size() >= leaf.max_size - 1 {
                        // The insert could split this leaf; retry with the
                        // full path latched
                        return Ok(None);
                    }
                    leaf.insert(key.clone(), value);
                    serialize_node(&BTreeNode::Leaf(leaf), &mut wguard)?;
                    pinned.mark_dirty();
                    return Ok(Some(true));
                }
            }
        }
    }

    /// Pessimistic pass: write-latch the whole path, split upward as needed
    fn insert_pessimistic(&self, key: K, value: Rid) -> Result<bool, BTreeError> {
        let mut root_guard = self.root.write();
        let root_id = *root_guard;
        if root_id == INVALID_PAGE_ID {
            return self.start_new_tree(&mut root_guard, key, value);
        }

        let mut root_latch = Some(root_guard);
        let mut ctx = LatchContext::new();
        self.descend_pessimistic(&key, WriteOp::Insert, &mut root_latch, &mut ctx, root_id)?;

        {
            let Some(entry) = ctx.path.last_mut() else {
                return Err(BTreeError::Corrupt("empty descent path"));
            };
            let BTreeNode::Leaf(leaf) = &mut entry.node else {
                return Err(BTreeError::Corrupt("descent did not end at a leaf"));
            };
            if !leaf.insert(key.clone(), value) {
                return Ok(false); // duplicate; everything releases clean
            }
            entry.dirty = true;
        }

        let mut level = ctx.path.len() - 1;
        loop {
            let needs_split = match &ctx.path[level].node {
                BTreeNode::Leaf(leaf) => leaf.size() >= leaf.max_size,
                BTreeNode::Internal(internal) => internal.size() > internal.max_size,
            };
            if !needs_split {
                break;
            }

            let mut right_pinned = self.new_pinned()?;
            let right_id = right_pinned.id();

            let (mut right_node, separator) = match &mut ctx.path[level].node {
                BTreeNode::Leaf(leaf) => {
                    let right = leaf.split(right_id);
                    let sep = right.keys[0].clone();
                    (BTreeNode::Leaf(right), sep)
                }
                BTreeNode::Internal(internal) => {
                    let right = internal.split(right_id);
                    let sep = right.keys[0].clone();
                    (BTreeNode::Internal(right), sep)
                }
            };
            ctx.path[level].dirty = true;

            // Children moved to the right sibling now live under it
            if let BTreeNode::Internal(right_internal) = &right_node {
                let moved: Vec<(PageId, PageId)> =
                    right_internal.children.iter().map(|&c| (c, right_id)).collect();
                self.apply_repoints(&mut ctx, level, moved)?;
            }

            if level == 0 {
                // The split node is the root: grow the tree by one level
                self.grow_root(&mut root_latch, &mut ctx, right_pinned, right_node, separator)?;
                break;
            }

            let parent_entry = &mut ctx.path[level - 1];
            let BTreeNode::Internal(parent) = &mut parent_entry.node else {
                return Err(BTreeError::Corrupt("leaf on an internal level"));
            };
            right_node.set_parent_page_id(parent.page_id);
            parent.insert_child(separator, right_id);
            parent_entry.dirty = true;

            {
                let mut guard = right_pinned.write();
                serialize_node(&right_node, &mut guard)?;
            }
            right_pinned.mark_dirty();
            drop(right_pinned);

            level -= 1;
        }

        self.finish_context(ctx)?;
        Ok(true)
    }

    /// First insert into an empty tree: the new leaf becomes the root
    fn start_new_tree(
        &self,
        root_guard: &mut RwLockWriteGuard<'_, PageId>,
        key: K,
        value: Rid,
    ) -> Result<bool, BTreeError> {
        let mut pinned = self.new_pinned()?;
        let page_id = pinned.id();

        let mut leaf = LeafNode::new(page_id, INVALID_PAGE_ID, self.leaf_max_size);
        leaf.insert(key, value);
        {
            let mut guard = pinned.write();
            serialize_node(&BTreeNode::Leaf(leaf), &mut guard)?;
        }
        pinned.mark_dirty();

        **root_guard = page_id;
        self.update_root_record(page_id)?;
        log::debug!("index {}: new root leaf {}", self.index_name, page_id);
        Ok(true)
    }

    /// Root split: allocate a new internal root over the old root and its
    /// new right sibling
    fn grow_root(
        &self,
        root_latch: &mut Option<RwLockWriteGuard<'_, PageId>>,
        ctx: &mut LatchContext<K>,
        mut right_pinned: PinnedPage,
        mut right_node: BTreeNode<K>,
        separator: K,
    ) -> Result<(), BTreeError> {
        let Some(root_latch) = root_latch.as_mut() else {
            // A splitting root is never safe, so its latch must still be held
            return Err(BTreeError::Corrupt("root split without the root latch"));
        };
        let mut new_root_pinned = self.new_pinned()?;
        let new_root_id = new_root_pinned.id();
        let right_id = right_pinned.id();
        let left_id = ctx.path[0].node.page_id();

        ctx.path[0].node.set_parent_page_id(new_root_id);
        ctx.path[0].dirty = true;
        right_node.set_parent_page_id(new_root_id);

        let mut new_root = InternalNode::new(new_root_id, INVALID_PAGE_ID, self.internal_max_size);
        new_root.keys = vec![separator.clone(), separator];
        new_root.children = vec![left_id, right_id];

        {
            let mut guard = right_pinned.write();
            serialize_node(&right_node, &mut guard)?;
        }
        right_pinned.mark_dirty();
        {
            let mut guard = new_root_pinned.write();
            serialize_node(&BTreeNode::Internal(new_root), &mut guard)?;
        }
        new_root_pinned.mark_dirty();

        **root_latch = new_root_id;
        self.update_root_record(new_root_id)?;
        log::debug!(
            "index {}: root split, new root {} over {} and {}",
            self.index_name,
            new_root_id,
            left_id,
            right_id
        );
        Ok(())
    }
}
