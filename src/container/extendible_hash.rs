use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::Mutex;

/// Concurrent extendible hash table, used among other things as the buffer
/// pool's page table.
///
/// The directory is a vector of shared bucket references of length
/// 2^global_depth; a key hashes to the directory slot selected by its low
/// `global_depth` bits. A full bucket is split by doubling the directory when
/// needed and partitioning the bucket's entries on the next hash bit.
///
/// One table-level mutex serializes all operations. Insertion never fails:
/// the directory grows until the target bucket has room.
pub struct ExtendibleHashTable<K, V> {
    bucket_size: usize,
    dir: Mutex<Directory<K, V>>,
}

struct Directory<K, V> {
    global_depth: usize,
    num_buckets: usize,
    slots: Vec<Arc<Mutex<Bucket<K, V>>>>,
}

struct Bucket<K, V> {
    depth: usize,
    items: Vec<(K, V)>,
}

impl<K, V> Bucket<K, V> {
    fn new(depth: usize) -> Self {
        Self { depth, items: Vec::new() }
    }
}

impl<K, V> ExtendibleHashTable<K, V>
where
    K: Hash + Eq + Clone,
    V: Clone,
{
    pub fn new(bucket_size: usize) -> Self {
        assert!(bucket_size > 0, "bucket size must be positive");
        let dir = Directory {
            global_depth: 0,
            num_buckets: 1,
            slots: vec![Arc::new(Mutex::new(Bucket::new(0)))],
        };
        Self { bucket_size, dir: Mutex::new(dir) }
    }

    fn hash(key: &K) -> u64 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    fn index_of(key: &K, global_depth: usize) -> usize {
        let mask = (1u64 << global_depth) - 1;
        (Self::hash(key) & mask) as usize
    }

    pub fn find(&self, key: &K) -> Option<V> {
        let dir = self.dir.lock();
        let bucket = dir.slots[Self::index_of(key, dir.global_depth)].lock();
        bucket.items.iter().find(|(k, _)| k == key).map(|(_, v)| v.clone())
    }

    pub fn remove(&self, key: &K) -> bool {
        let dir = self.dir.lock();
        let mut bucket = dir.slots[Self::index_of(key, dir.global_depth)].lock();
        match bucket.items.iter().position(|(k, _)| k == key) {
            Some(pos) => {
                bucket.items.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Insert a key/value pair, overwriting the value if the key is present.
    /// Splits the target bucket (growing the directory when local depth has
    /// caught up with global depth) until the pair fits.
    pub fn insert(&self, key: K, value: V) {
        let mut dir = self.dir.lock();

        // Update in place if the key already exists
        {
            let mut bucket = dir.slots[Self::index_of(&key, dir.global_depth)].lock();
            if let Some(pos) = bucket.items.iter().position(|(k, _)| k == &key) {
                bucket.items[pos].1 = value;
                return;
            }
        }

        loop {
            let index = Self::index_of(&key, dir.global_depth);
            let target = Arc::clone(&dir.slots[index]);
            {
                let mut bucket = target.lock();
                if bucket.items.len() < self.bucket_size {
                    bucket.items.push((key, value));
                    return;
                }
            }
            self.split_bucket(&mut dir, &target);
        }
    }

    /// Split one full bucket into two buckets of depth `local_depth + 1`,
    /// doubling the directory first when the bucket already has global depth.
    fn split_bucket(&self, dir: &mut Directory<K, V>, target: &Arc<Mutex<Bucket<K, V>>>) {
        let local_depth = target.lock().depth;

        if local_depth == dir.global_depth {
            // Double the directory: the new upper half mirrors the lower half
            let old_len = dir.slots.len();
            for i in 0..old_len {
                let slot = Arc::clone(&dir.slots[i]);
                dir.slots.push(slot);
            }
            dir.global_depth += 1;
        }

        // Partition the old bucket's entries on the next hash bit
        let mask = 1u64 << local_depth;
        let zero = Arc::new(Mutex::new(Bucket::new(local_depth + 1)));
        let one = Arc::new(Mutex::new(Bucket::new(local_depth + 1)));
        for (k, v) in target.lock().items.drain(..) {
            if Self::hash(&k) & mask != 0 {
                one.lock().items.push((k, v));
            } else {
                zero.lock().items.push((k, v));
            }
        }
        dir.num_buckets += 1;

        // Repoint every slot that referenced the old bucket
        for i in 0..dir.slots.len() {
            if Arc::ptr_eq(&dir.slots[i], target) {
                dir.slots[i] = if i as u64 & mask != 0 {
                    Arc::clone(&one)
                } else {
                    Arc::clone(&zero)
                };
            }
        }
    }

    pub fn global_depth(&self) -> usize {
        self.dir.lock().global_depth
    }

    pub fn local_depth(&self, dir_index: usize) -> usize {
        self.dir.lock().slots[dir_index].lock().depth
    }

    pub fn num_buckets(&self) -> usize {
        self.dir.lock().num_buckets
    }

    /// Number of key/value pairs currently stored
    pub fn len(&self) -> usize {
        let dir = self.dir.lock();
        let mut seen: Vec<*const Mutex<Bucket<K, V>>> = Vec::new();
        let mut total = 0;
        for slot in &dir.slots {
            let ptr = Arc::as_ptr(slot);
            if !seen.contains(&ptr) {
                seen.push(ptr);
                total += slot.lock().items.len();
            }
        }
        total
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
