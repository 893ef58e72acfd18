//! Inode identity and the kernel's view of live nodes.
//!
//! Inode numbers are not allocated: they are the FNV-1a 64 hash of the
//! node's canonical path, so a path keeps its inode across remounts and
//! across cache refreshes. The table below only tracks which nodes the
//! kernel currently holds references to.

use crate::node::VirtualNode;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::hash::Hasher;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// The root inode number (FUSE convention).
pub const ROOT_INODE: u64 = 1;

/// Stable inode number for a canonical absolute path.
///
/// FNV-1a 64 over the UTF-8 bytes of `path`. Distinct paths can collide;
/// that risk is accepted. The root is never hashed, it is always
/// [`ROOT_INODE`].
///
/// ```
/// use mcfs_fuse::inode::inode_of;
///
/// assert_eq!(inode_of("/data"), inode_of("/data"));
/// assert_ne!(inode_of("/data"), inode_of("/Data"));
/// ```
pub fn inode_of(path: &str) -> u64 {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(path.as_bytes());
    hasher.finish()
}

/// An entry in the inode table.
#[derive(Debug)]
pub struct InodeEntry {
    pub node: VirtualNode,
    /// Lookup count for proper `forget()` handling.
    nlookup: AtomicU64,
}

impl InodeEntry {
    fn new(node: VirtualNode, nlookup: u64) -> Self {
        Self {
            node,
            nlookup: AtomicU64::new(nlookup),
        }
    }

    /// Increments the lookup count and returns the new value.
    pub fn inc_nlookup(&self) -> u64 {
        self.nlookup.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrements the lookup count, saturating at zero, and returns the new
    /// value.
    pub fn dec_nlookup(&self, count: u64) -> u64 {
        let mut current = self.nlookup.load(Ordering::Acquire);
        loop {
            let next = current.saturating_sub(count);
            match self.nlookup.compare_exchange_weak(
                current,
                next,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => return next,
                Err(actual) => current = actual,
            }
        }
    }

    pub fn nlookup(&self) -> u64 {
        self.nlookup.load(Ordering::Relaxed)
    }
}

/// Thread-safe table of nodes the kernel knows about, keyed by inode.
pub struct InodeTable {
    entries: DashMap<u64, InodeEntry>,
}

impl InodeTable {
    /// Creates a table holding only `root` under [`ROOT_INODE`].
    pub fn new(root: VirtualNode) -> Self {
        let entries = DashMap::new();
        entries.insert(ROOT_INODE, InodeEntry::new(root, 1));
        Self { entries }
    }

    /// Returns a clone of the node registered under `inode`.
    pub fn get(&self, inode: u64) -> Option<VirtualNode> {
        self.entries.get(&inode).map(|e| e.node.clone())
    }

    /// Registers `node` after a successful kernel lookup and returns its inode.
    ///
    /// The lookup count is incremented and the stored node is replaced, so a
    /// refreshed entry (new size, new kind) is what later `getattr` calls see.
    /// The root slot is fixed at construction: a node resolving to
    /// [`ROOT_INODE`] is refused and `None` returned.
    pub fn insert_lookup(&self, node: VirtualNode) -> Option<u64> {
        let inode = node.inode();
        if inode == ROOT_INODE {
            warn!(path = %node.path(), "refusing to register a child under the root inode");
            return None;
        }
        match self.entries.entry(inode) {
            Entry::Occupied(mut occupied) => {
                let existing = occupied.get_mut();
                if existing.node.path() != node.path() {
                    warn!(
                        inode,
                        kept = %node.path(),
                        replaced = %existing.node.path(),
                        "inode collision"
                    );
                }
                existing.node = node;
                existing.inc_nlookup();
            }
            Entry::Vacant(vacant) => {
                vacant.insert(InodeEntry::new(node, 1));
            }
        }
        Some(inode)
    }

    /// Decrements the lookup count and evicts the node when it reaches zero.
    ///
    /// The root is never evicted. Returns true if the node was evicted.
    pub fn forget(&self, inode: u64, nlookup: u64) -> bool {
        if inode == ROOT_INODE {
            return false;
        }
        let remaining = match self.entries.get(&inode) {
            Some(entry) => entry.dec_nlookup(nlookup),
            None => return false,
        };
        if remaining == 0 {
            // A lookup may have raced us between the decrement and here.
            return self
                .entries
                .remove_if(&inode, |_, e| e.nlookup() == 0)
                .is_some();
        }
        false
    }

    /// Current lookup count for `inode`, if registered.
    pub fn nlookup(&self, inode: u64) -> Option<u64> {
        self.entries.get(&inode).map(|e| e.nlookup())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
