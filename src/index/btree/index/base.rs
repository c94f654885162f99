use std::marker::PhantomData;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::common::types::{PageId, PageWriteGuard, Rid, HEADER_PAGE_ID, INVALID_PAGE_ID};
use crate::index::btree::error::BTreeError;
use crate::index::btree::node::BTreeNode;
use crate::index::btree::serialization::{deserialize_node, serialize_node};
use crate::storage::buffer::{BufferPoolManager, PinnedPage};
use crate::storage::page::HeaderPage;

/// A unique-key B+tree index over buffer-pool pages.
///
/// Readers and writers crab down the tree: a child is latched before its
/// parent is released, and writers fall back from an optimistic leaf-only
/// pass to a pessimistic full-path pass when the leaf might split or
/// underflow. The `root` RwLock guards the root page id itself and is the
/// top of every descent.
pub struct BPlusTree<K> {
    pub(crate) index_name: String,
    pub(crate) buffer_pool: Arc<BufferPoolManager>,
    pub(crate) root: RwLock<PageId>,
    pub(crate) leaf_max_size: usize,
    pub(crate) internal_max_size: usize,
    pub(crate) _phantom: PhantomData<K>,
}

/// One write-latched page on the pessimistic descent path. The deserialized
/// node is mutated in memory and written back through the still-held guard
/// when the operation finishes. Field order matters: the latch drops before
/// the pin.
pub(crate) struct PathEntry<K> {
    pub guard: PageWriteGuard,
    pub pinned: PinnedPage,
    pub node: BTreeNode<K>,
    pub dirty: bool,
    /// The page was merged away; skip the write-back and deallocate later
    pub dead: bool,
}

/// The ordered latch set of one write operation. Guards and pins release on
/// drop on every exit path; pages emptied by merges are deallocated only
/// after the whole set is down.
pub(crate) struct LatchContext<K> {
    pub path: Vec<PathEntry<K>>,
    pub deleted: Vec<PageId>,
}

impl<K> LatchContext<K> {
    pub fn new() -> Self {
        Self { path: Vec::new(), deleted: Vec::new() }
    }

    /// Drop every currently held ancestor latch and pin (all clean)
    pub fn release_path(&mut self) {
        self.path.clear();
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum WriteOp {
    Insert,
    Delete,
}

impl<K> BPlusTree<K>
where
    K: Clone + Ord + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static,
{
    /// Open (or register) the named index, restoring its root from the
    /// header page
    pub fn new(
        index_name: impl Into<String>,
        buffer_pool: Arc<BufferPoolManager>,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Self, BTreeError> {
        assert!(leaf_max_size >= 2, "leaf nodes need room for at least two entries");
        assert!(internal_max_size >= 3, "internal nodes need room for at least three children");
        let index_name = index_name.into();

        let mut pinned = buffer_pool
            .fetch_page_pinned(HEADER_PAGE_ID)?
            .ok_or(BTreeError::PoolExhausted)?;
        let root = {
            let mut guard = pinned.write();
            match HeaderPage::get_root(&guard, &index_name)? {
                Some(root) => root,
                None => {
                    HeaderPage::set_root(&mut guard, &index_name, INVALID_PAGE_ID)?;
                    INVALID_PAGE_ID
                }
            }
        };
        pinned.mark_dirty();

        Ok(Self {
            index_name,
            buffer_pool: Arc::clone(&buffer_pool),
            root: RwLock::new(root),
            leaf_max_size,
            internal_max_size,
            _phantom: PhantomData,
        })
    }

    pub fn name(&self) -> &str {
        &self.index_name
    }

    pub fn get_root_page_id(&self) -> PageId {
        *self.root.read()
    }

    pub fn is_empty(&self) -> bool {
        self.get_root_page_id() == INVALID_PAGE_ID
    }

    /// Point lookup. Returns every value stored under the key; with unique
    /// keys that is zero or one record id.
    pub fn get_value(&self, key: &K) -> Result<Vec<Rid>, BTreeError> {
        let root_guard = self.root.read();
        let root_id = *root_guard;
        if root_id == INVALID_PAGE_ID {
            return Ok(Vec::new());
        }

        let mut pinned = self.fetch(root_id)?;
        let mut guard = pinned.read();
        // Root child is latched; the root latch can go
        drop(root_guard);

        loop {
            let node: BTreeNode<K> = deserialize_node(&guard)?;
            match node {
                BTreeNode::Leaf(leaf) => {
                    return Ok(leaf.get(key).map(|rid| vec![rid]).unwrap_or_default());
                }
                BTreeNode::Internal(internal) => {
                    let child_id = internal.child_at(internal.child_index(key));
                    let child_pinned = self.fetch(child_id)?;
                    let child_guard = child_pinned.read();
                    drop(guard);
                    guard = child_guard;
                    pinned = child_pinned;
                }
            }
        }
    }

    pub(crate) fn fetch(&self, page_id: PageId) -> Result<PinnedPage, BTreeError> {
        self.buffer_pool
            .fetch_page_pinned(page_id)?
            .ok_or(BTreeError::PoolExhausted)
    }

    pub(crate) fn new_pinned(&self) -> Result<PinnedPage, BTreeError> {
        self.buffer_pool
            .new_page_pinned()?
            .ok_or(BTreeError::PoolExhausted)
    }

    /// Persist a root change into the header page record for this index.
    /// Callers hold the root latch, so the record tracks the variable.
    pub(crate) fn update_root_record(&self, root: PageId) -> Result<(), BTreeError> {
        let mut pinned = self.fetch(HEADER_PAGE_ID)?;
        {
            let mut guard = pinned.write();
            HeaderPage::set_root(&mut guard, &self.index_name, root)?;
        }
        pinned.mark_dirty();
        Ok(())
    }

    /// Pessimistic descent: write-latch every page from the root down,
    /// releasing all ancestors (and the root latch) as soon as a node is
    /// safe for the operation.
    pub(crate) fn descend_pessimistic<'a>(
        &'a self,
        key: &K,
        op: WriteOp,
        root_latch: &mut Option<RwLockWriteGuard<'a, PageId>>,
        ctx: &mut LatchContext<K>,
        root_id: PageId,
    ) -> Result<(), BTreeError> {
        let mut current = root_id;
        loop {
            let pinned = self.fetch(current)?;
            let guard = pinned.write();
            let node: BTreeNode<K> = deserialize_node(&guard)?;

            let is_root = node.parent_page_id() == INVALID_PAGE_ID;
            let safe = match op {
                WriteOp::Insert => node.is_safe_for_insert(),
                WriteOp::Delete => node.is_safe_for_delete(is_root),
            };
            if safe {
                ctx.release_path();
                *root_latch = None;
            }

            let next = match &node {
                BTreeNode::Internal(internal) => Some(internal.child_at(internal.child_index(key))),
                BTreeNode::Leaf(_) => None,
            };
            ctx.path.push(PathEntry { guard, pinned, node, dirty: false, dead: false });

            match next {
                Some(child) => current = child,
                None => return Ok(()),
            }
        }
    }

    /// Write back every mutated node, drop all latches and pins in path
    /// order, then deallocate pages emptied by the operation.
    pub(crate) fn finish_context(&self, mut ctx: LatchContext<K>) -> Result<(), BTreeError> {
        for mut entry in ctx.path.drain(..) {
            if entry.dirty && !entry.dead {
                serialize_node(&entry.node, &mut entry.guard)?;
                entry.pinned.mark_dirty();
            }
        }
        for page_id in ctx.deleted.drain(..) {
            match self.buffer_pool.delete_page(page_id) {
                Ok(true) => {}
                Ok(false) => log::warn!("page {} still pinned, leaking its id", page_id),
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Point the given children at a new parent. A child that sits on the
    /// latched path right below `level` is patched in place; any other child
    /// gets a short write latch of its own.
    pub(crate) fn apply_repoints(
        &self,
        ctx: &mut LatchContext<K>,
        level: usize,
        repoints: Vec<(PageId, PageId)>,
    ) -> Result<(), BTreeError> {
        for (child_id, new_parent) in repoints {
            if let Some(entry) = ctx.path.get_mut(level + 1) {
                if !entry.dead && entry.node.page_id() == child_id {
                    entry.node.set_parent_page_id(new_parent);
                    entry.dirty = true;
                    continue;
                }
            }
            let mut pinned = self.fetch(child_id)?;
            {
                let mut guard = pinned.write();
                let mut node: BTreeNode<K> = deserialize_node(&guard)?;
                node.set_parent_page_id(new_parent);
                serialize_node(&node, &mut guard)?;
            }
            pinned.mark_dirty();
        }
        Ok(())
    }

    /// Verify the structural invariants: parent links, per-node size
    /// bounds, key ordering within and across nodes, and uniform leaf depth.
    pub fn check_integrity(&self) -> Result<(), BTreeError> {
        let root_id = self.get_root_page_id();
        if root_id == INVALID_PAGE_ID {
            return Ok(());
        }
        let mut leaf_depths = Vec::new();
        self.check_node(root_id, INVALID_PAGE_ID, 0, &mut leaf_depths)?;
        if leaf_depths.windows(2).any(|w| w[0] != w[1]) {
            return Err(BTreeError::Corrupt("leaves at different depths"));
        }

        // The leaf chain must produce strictly increasing keys
        let mut prev: Option<K> = None;
        for (key, _) in self.begin()? {
            if let Some(p) = &prev {
                if *p >= key {
                    return Err(BTreeError::Corrupt("leaf chain out of order"));
                }
            }
            prev = Some(key);
        }
        Ok(())
    }

    /// Returns (min_key, max_key) of the subtree
    fn check_node(
        &self,
        page_id: PageId,
        expected_parent: PageId,
        depth: usize,
        leaf_depths: &mut Vec<usize>,
    ) -> Result<(K, K), BTreeError> {
        let pinned = self.fetch(page_id)?;
        let node: BTreeNode<K> = {
            let guard = pinned.read();
            deserialize_node(&guard)?
        };
        drop(pinned);

        if node.parent_page_id() != expected_parent {
            return Err(BTreeError::Corrupt("bad parent pointer"));
        }
        let is_root = expected_parent == INVALID_PAGE_ID;

        match node {
            BTreeNode::Leaf(leaf) => {
                leaf_depths.push(depth);
                if leaf.keys.is_empty() {
                    return Err(BTreeError::Corrupt("empty leaf"));
                }
                if leaf.keys.len() >= leaf.max_size {
                    return Err(BTreeError::Corrupt("overfull leaf"));
                }
                if !is_root && leaf.keys.len() < leaf.min_size() {
                    return Err(BTreeError::Corrupt("underfull leaf"));
                }
                if leaf.keys.windows(2).any(|w| w[0] >= w[1]) {
                    return Err(BTreeError::Corrupt("leaf keys out of order"));
                }
                let min = leaf.keys[0].clone();
                let max = leaf.keys[leaf.keys.len() - 1].clone();
                Ok((min, max))
            }
            BTreeNode::Internal(internal) => {
                if internal.keys.len() != internal.children.len() {
                    return Err(BTreeError::Corrupt("internal key/child count mismatch"));
                }
                if internal.size() > internal.max_size {
                    return Err(BTreeError::Corrupt("overfull internal node"));
                }
                if !is_root && internal.size() < internal.min_size() {
                    return Err(BTreeError::Corrupt("underfull internal node"));
                }
                if is_root && internal.size() < 2 {
                    return Err(BTreeError::Corrupt("root internal with fewer than two children"));
                }

                let mut subtree_min: Option<K> = None;
                let mut prev_max: Option<K> = None;
                for (i, &child) in internal.children.iter().enumerate() {
                    let (child_min, child_max) =
                        self.check_node(child, internal.page_id, depth + 1, leaf_depths)?;
                    if i >= 1 {
                        // keys[i] is the smallest key reachable through children[i]
                        if internal.keys[i] != child_min {
                            return Err(BTreeError::Corrupt("separator is not the child's min key"));
                        }
                        if let Some(pm) = &prev_max {
                            if *pm >= child_min {
                                return Err(BTreeError::Corrupt("overlapping child key ranges"));
                            }
                        }
                    }
                    if subtree_min.is_none() {
                        subtree_min = Some(child_min);
                    }
                    prev_max = Some(child_max);
                }

                match (subtree_min, prev_max) {
                    (Some(min), Some(max)) => Ok((min, max)),
                    _ => Err(BTreeError::Corrupt("internal node without children")),
                }
            }
        }
    }
}
