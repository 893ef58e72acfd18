//! Virtual nodes and the three metadata operations the kernel needs.
//!
//! A [`VirtualNode`] wraps the remote entry it was resolved from and nothing
//! else. Its path is recomputed from the entry on demand, and its children
//! live in the shared [`DirectoryCache`] keyed by that path, so every node
//! resolving to the same path sees the same listing.
//!
//! # Lookup strategy
//!
//! [`NodeOps::lookup`] prefers the parent's cached listing. If the listing is
//! fresh, the child is searched for in memory and a miss is authoritative
//! (`NotFound`). If it is cold or expired, a single point query is sent for
//! the child path instead of refetching the whole listing.
//!
//! An entry is only ever exposed at the path it reports. Listing children
//! that do not sit directly under the listed directory (a directory with no
//! `path` canonicalises to `/`) are dropped, and a point query answered with
//! an entry for a different path is treated as not found.

use crate::attr::{project, NodeAttributes, Ownership};
use crate::cache::DirectoryCache;
use crate::error::{log_api_failure, FuseError, FuseResult};
use crate::inode::{inode_of, ROOT_INODE};
use crate::stats::MountStats;
use async_trait::async_trait;
use mcfs_api::{CatalogPath, EntryKind, RemoteCatalog, RemoteEntry};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};
use tracing::{debug, info, trace, warn};

/// Shared state every node operation runs against.
pub struct NodeContext {
    pub catalog: Arc<dyn RemoteCatalog>,
    pub cache: DirectoryCache,
    pub owner: Ownership,
    pub stats: Arc<MountStats>,
}

impl NodeContext {
    pub fn new(catalog: Arc<dyn RemoteCatalog>, cache_timeout: Duration, owner: Ownership) -> Self {
        let stats = Arc::new(MountStats::new());
        Self {
            catalog,
            cache: DirectoryCache::new(cache_timeout, Arc::clone(&stats)),
            owner,
            stats,
        }
    }
}

/// One child as reported by [`NodeOps::read_dir`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryOut {
    pub name: String,
    pub kind: EntryKind,
    pub ino: u64,
}

/// Metadata operations backing the kernel's readdir, lookup and getattr.
#[async_trait]
pub trait NodeOps: Send + Sync {
    /// Children of this directory, in catalog order.
    async fn read_dir(&self, ctx: &NodeContext) -> FuseResult<Vec<DirEntryOut>>;

    /// Resolves the child called `name`.
    async fn lookup(&self, ctx: &NodeContext, name: &str) -> FuseResult<RemoteEntry>;

    /// Attributes as of `now`.
    fn attributes(&self, owner: Ownership, now: SystemTime) -> NodeAttributes;
}

/// A filesystem node resolved from the catalog.
///
/// Cheap to clone; the entry is shared.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VirtualNode {
    entry: Option<Arc<RemoteEntry>>,
}

impl VirtualNode {
    /// The root before its entry has been loaded.
    pub fn root() -> Self {
        Self { entry: None }
    }

    pub fn new(entry: RemoteEntry) -> Self {
        Self {
            entry: Some(Arc::new(entry)),
        }
    }

    pub fn entry(&self) -> Option<&RemoteEntry> {
        self.entry.as_deref()
    }

    /// Canonical path of this node; `/` for the root.
    pub fn path(&self) -> CatalogPath {
        self.entry
            .as_deref()
            .map_or_else(CatalogPath::root, |e| CatalogPath::new(e.full_path()))
    }

    pub fn is_root(&self) -> bool {
        self.path().is_root()
    }

    /// Directories and the unloaded root are directories.
    pub fn is_dir(&self) -> bool {
        self.entry.as_deref().is_none_or(RemoteEntry::is_dir)
    }

    pub fn inode(&self) -> u64 {
        self.entry.as_deref().map_or(ROOT_INODE, entry_inode)
    }

    /// [`NodeOps::read_dir`] against an explicit clock.
    pub async fn read_dir_at(&self, ctx: &NodeContext, now: Instant) -> FuseResult<Vec<DirEntryOut>> {
        let path = self.path();
        if !self.is_dir() {
            return Err(FuseError::NotADirectory(path.into_string()));
        }

        let children = ctx
            .cache
            .listing(ctx.catalog.as_ref(), path.as_str(), now)
            .await
            .map_err(|e| {
                log_api_failure("readdir", path.as_str(), &e);
                FuseError::Api(e)
            })?;

        Ok(children
            .iter()
            .filter(|e| {
                let placed = sits_under(e, &path);
                if !placed {
                    warn!(parent = %path, name = %e.name, reported = %e.full_path(), "dropping misplaced child");
                }
                placed
            })
            .map(|e| DirEntryOut {
                name: e.name.clone(),
                kind: e.kind(),
                ino: entry_inode(e),
            })
            .collect())
    }

    /// [`NodeOps::lookup`] against an explicit clock.
    pub async fn lookup_at(&self, ctx: &NodeContext, name: &str, now: Instant) -> FuseResult<RemoteEntry> {
        validate_name(name)?;
        let parent = self.path();
        if !self.is_dir() {
            return Err(FuseError::NotADirectory(parent.into_string()));
        }
        let candidate = parent.join(name);

        if let Some(listing) = ctx.cache.fresh(parent.as_str(), now) {
            ctx.stats.record_cache_hit();
            trace!(path = %candidate, "lookup served from listing");
            return listing
                .find(candidate.as_str())
                .cloned()
                .ok_or_else(|| FuseError::NotFound(candidate.into_string()));
        }

        ctx.stats.record_cache_miss();
        ctx.stats.record_point_query();
        debug!(path = %candidate, "lookup via point query");
        let entry = ctx.catalog.entry_by_path(candidate.as_str()).await.map_err(|e| {
            log_api_failure("lookup", candidate.as_str(), &e);
            FuseError::Api(e)
        })?;
        if CatalogPath::new(entry.full_path()) != candidate {
            warn!(path = %candidate, reported = %entry.full_path(), "point query answered for another path");
            return Err(FuseError::NotFound(candidate.into_string()));
        }
        Ok(entry)
    }
}

#[async_trait]
impl NodeOps for VirtualNode {
    async fn read_dir(&self, ctx: &NodeContext) -> FuseResult<Vec<DirEntryOut>> {
        self.read_dir_at(ctx, Instant::now()).await
    }

    async fn lookup(&self, ctx: &NodeContext, name: &str) -> FuseResult<RemoteEntry> {
        self.lookup_at(ctx, name, Instant::now()).await
    }

    fn attributes(&self, owner: Ownership, now: SystemTime) -> NodeAttributes {
        project(self.entry(), self.inode(), owner, now)
    }
}

/// Loads the root entry and warms its listing.
///
/// Either failure is returned; a mount cannot proceed without its root.
pub async fn resolve_root(ctx: &NodeContext) -> FuseResult<VirtualNode> {
    let root_path = CatalogPath::root();
    ctx.stats.record_point_query();
    let entry = ctx.catalog.entry_by_path(root_path.as_str()).await.map_err(|e| {
        log_api_failure("resolve_root", root_path.as_str(), &e);
        FuseError::Api(e)
    })?;
    let root = VirtualNode::new(entry);
    if !root.is_dir() {
        return Err(FuseError::NotADirectory(root_path.into_string()));
    }
    let children = root.read_dir_at(ctx, Instant::now()).await?;
    info!(children = children.len(), "root resolved");
    Ok(root)
}

fn entry_inode(entry: &RemoteEntry) -> u64 {
    let full = entry.full_path();
    if CatalogPath::new(&full).is_root() {
        ROOT_INODE
    } else {
        inode_of(&full)
    }
}

/// True if `entry` canonicalises to a direct child of `parent`.
fn sits_under(entry: &RemoteEntry, parent: &CatalogPath) -> bool {
    CatalogPath::new(entry.full_path()).parent().as_ref() == Some(parent)
}

fn validate_name(name: &str) -> FuseResult<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') {
        return Err(FuseError::InvalidName);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unloaded_root() {
        let root = VirtualNode::root();
        assert!(root.is_root());
        assert!(root.is_dir());
        assert_eq!(root.path().as_str(), "/");
        assert_eq!(root.inode(), ROOT_INODE);
    }

    #[test]
    fn test_loaded_root_keeps_root_inode() {
        let root = VirtualNode::new(RemoteEntry::new_directory(1, "/"));
        assert!(root.is_root());
        assert_eq!(root.inode(), ROOT_INODE);
    }

    #[test]
    fn test_node_path_and_inode() {
        let node = VirtualNode::new(RemoteEntry::new_file(5, "sample.txt", "/data", 1024));
        assert_eq!(node.path().as_str(), "/data/sample.txt");
        assert_eq!(node.inode(), inode_of("/data/sample.txt"));
        assert!(!node.is_dir());
        assert!(!node.is_root());
    }

    #[test]
    fn test_validate_name() {
        assert!(validate_name("a.txt").is_ok());
        assert!(validate_name(".hidden").is_ok());
        for bad in ["", ".", "..", "a/b"] {
            assert!(matches!(validate_name(bad), Err(FuseError::InvalidName)), "{bad:?}");
        }
    }

    #[test]
    fn test_attributes_delegate_to_projection() {
        let owner = Ownership::new(1, 2);
        let now = SystemTime::now();
        let node = VirtualNode::new(RemoteEntry::new_directory(1, "/data"));
        let attrs = node.attributes(owner, now);
        assert!(attrs.is_dir());
        assert_eq!(attrs.ino, inode_of("/data"));
        assert_eq!(attrs.time, now);
    }
}
