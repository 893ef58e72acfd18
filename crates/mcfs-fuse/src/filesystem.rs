//! FUSE filesystem over a Materials Commons project.
//!
//! [`McFs`] implements the fuser low-level `Filesystem` trait. Metadata
//! callbacks (lookup, getattr, readdir) resolve through [`VirtualNode`] and
//! the shared directory cache; the data path is stubbed since file contents
//! are not served.
//!
//! | Operation | Behavior |
//! |-----------|----------|
//! | lookup | cached listing first, point query otherwise; bumps nlookup |
//! | forget/batch_forget | decrements nlookup, evicts at 0, never the root |
//! | getattr | synthesized from the stored node, no catalog call |
//! | readdir | `.`, `..` then children; offsets carry position and name hash |
//! | open/opendir | kind check only |
//! | read | always empty |
//! | write | accepts 0 bytes |
//! | flush/release/releasedir | no-op |
//! | lseek | always 0 |
//! | statfs | fixed values |

use crate::async_bridge::Bridge;
use crate::attr::{Ownership, BLOCK_SIZE};
use crate::config::MountConfig;
use crate::error::{FuseError, FuseResult};
use crate::inode::{inode_of, InodeTable, ROOT_INODE};
use crate::node::{resolve_root, NodeContext, NodeOps, VirtualNode};
use crate::stats::StatsSnapshot;
use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, ReplyAttr, ReplyData, ReplyDirectory, ReplyEmpty,
    ReplyEntry, ReplyLseek, ReplyOpen, ReplyWrite, Request,
};
use libc::c_int;
use mcfs_api::{CatalogPath, EntryKind, RemoteCatalog};
use std::ffi::OsStr;
use std::hash::Hasher;
use std::sync::Arc;
use std::time::SystemTime;
use tokio::runtime::{Handle, Runtime};
use tracing::{debug, info, trace};

/// Maximum file name length reported by statfs.
const NAME_MAX: u32 = 255;

/// One row of a directory listing as handed to the kernel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirListingEntry {
    pub inode: u64,
    pub file_type: FileType,
    pub name: String,
}

/// FUSE filesystem exposing one catalog project.
pub struct McFs {
    ctx: Arc<NodeContext>,
    inodes: InodeTable,
    config: MountConfig,
    handle: Handle,
    // Dropped last so no callback can outlive the runtime it blocks on.
    _owned_runtime: Option<Runtime>,
}

impl McFs {
    /// Creates a filesystem with its own multi-threaded tokio runtime.
    ///
    /// Resolves the root entry and warms its listing before returning; a
    /// failure there is returned and nothing is mounted.
    pub fn new(catalog: Arc<dyn RemoteCatalog>, config: MountConfig) -> FuseResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("mcfs-io")
            .build()?;
        let handle = runtime.handle().clone();
        Self::with_runtime_internal(catalog, config, Some(runtime), handle)
    }

    /// Creates a filesystem that runs catalog queries on an existing runtime.
    ///
    /// Must not be called from a thread driving that runtime.
    pub fn with_runtime_handle(
        catalog: Arc<dyn RemoteCatalog>,
        config: MountConfig,
        handle: Handle,
    ) -> FuseResult<Self> {
        Self::with_runtime_internal(catalog, config, None, handle)
    }

    fn with_runtime_internal(
        catalog: Arc<dyn RemoteCatalog>,
        config: MountConfig,
        owned_runtime: Option<Runtime>,
        handle: Handle,
    ) -> FuseResult<Self> {
        let owner = Ownership::current();
        let ctx = Arc::new(NodeContext::new(catalog, config.cache_timeout, owner));

        let root = {
            let bridge = Bridge::new(&handle, config.io_timeout, &ctx.stats);
            let ctx = Arc::clone(&ctx);
            bridge.run("resolve_root", "/", async move { resolve_root(&ctx).await })?
        };

        info!(
            uid = owner.uid,
            gid = owner.gid,
            cache_timeout_secs = config.cache_timeout.as_secs(),
            io_timeout_secs = config.io_timeout.as_secs(),
            read_only = config.read_only,
            "McFs initialized"
        );

        Ok(Self {
            ctx,
            inodes: InodeTable::new(root),
            config,
            handle,
            _owned_runtime: owned_runtime,
        })
    }

    pub fn config(&self) -> &MountConfig {
        &self.config
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.ctx.stats.snapshot()
    }

    /// Number of inodes the kernel currently holds, root included.
    pub fn inode_count(&self) -> usize {
        self.inodes.len()
    }

    /// Forces the next listing of `path` to go to the catalog.
    ///
    /// Returns false if the path has no cached listing.
    pub fn invalidate_directory(&self, path: &str) -> bool {
        let path = CatalogPath::new(path);
        let marked = self.ctx.cache.mark_stale(path.as_str());
        debug!(path = %path, marked, "invalidate_directory");
        marked
    }

    /// Runs a node operation on the runtime and waits for it, at most
    /// `io_timeout`.
    fn run<T, F, Fut>(&self, op: &'static str, path: &CatalogPath, operation: F) -> FuseResult<T>
    where
        F: FnOnce(Arc<NodeContext>) -> Fut,
        Fut: Future<Output = FuseResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        Bridge::new(&self.handle, self.config.io_timeout, &self.ctx.stats).run(
            op,
            path.as_str(),
            operation(Arc::clone(&self.ctx)),
        )
    }

    fn node(&self, ino: u64) -> FuseResult<VirtualNode> {
        self.inodes.get(ino).ok_or(FuseError::InvalidInode(ino))
    }

    fn attr_of(&self, node: &VirtualNode) -> FileAttr {
        node.attributes(self.ctx.owner, SystemTime::now()).to_file_attr()
    }

    /// Resolves `name` under `parent` and registers the child with the
    /// kernel's lookup count.
    pub fn do_lookup(&self, parent: u64, name: &OsStr) -> FuseResult<FileAttr> {
        let name = name.to_str().ok_or(FuseError::InvalidName)?.to_string();
        let parent_node = self.node(parent)?;
        let candidate = parent_node.path().join(&name);
        let entry = self.run("lookup", &candidate, move |ctx| async move {
            parent_node.lookup(&ctx, &name).await
        })?;
        let child = VirtualNode::new(entry);
        self.inodes
            .insert_lookup(child.clone())
            .ok_or_else(|| FuseError::NotFound(child.path().into_string()))?;
        Ok(self.attr_of(&child))
    }

    pub fn do_getattr(&self, ino: u64) -> FuseResult<FileAttr> {
        let node = self.node(ino)?;
        Ok(self.attr_of(&node))
    }

    /// Full listing of `ino` including `.` and `..`, sorted by name.
    pub fn do_readdir(&self, ino: u64) -> FuseResult<Vec<DirListingEntry>> {
        let node = self.node(ino)?;
        if !node.is_dir() {
            return Err(FuseError::NotADirectory(node.path().into_string()));
        }
        let parent_inode = node
            .path()
            .parent()
            .filter(|p| !p.is_root())
            .map_or(ROOT_INODE, |p| inode_of(p.as_str()));

        let path = node.path();
        let children = self.run("readdir", &path, move |ctx| async move { node.read_dir(&ctx).await })?;

        let mut listing = Vec::with_capacity(children.len() + 2);
        listing.push(DirListingEntry {
            inode: ino,
            file_type: FileType::Directory,
            name: ".".to_string(),
        });
        listing.push(DirListingEntry {
            inode: parent_inode,
            file_type: FileType::Directory,
            name: "..".to_string(),
        });
        listing.extend(children.into_iter().map(|c| DirListingEntry {
            inode: c.ino,
            file_type: file_type(c.kind),
            name: c.name,
        }));
        // Sorted so a refreshed listing resumes at the same place.
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    fn open_node(&self, ino: u64, want_dir: bool) -> FuseResult<()> {
        let node = self.node(ino)?;
        match (node.is_dir(), want_dir) {
            (true, true) | (false, false) => Ok(()),
            (false, true) => Err(FuseError::NotADirectory(node.path().into_string())),
            (true, false) => Err(FuseError::IsADirectory(node.path().into_string())),
        }
    }

    fn record_failure(&self, op: &'static str, e: &FuseError) -> c_int {
        if !e.is_not_found() {
            self.ctx.stats.record_error();
            debug!(op, error = %e, "operation failed");
        }
        e.to_errno()
    }
}

// A readdir offset packs the 1-based position of an entry above the low
// OFFSET_NAME_BITS bits of its name hash. Offset 0 means "from the start".
const OFFSET_NAME_BITS: u32 = 40;
const OFFSET_NAME_MASK: u64 = (1 << OFFSET_NAME_BITS) - 1;
const OFFSET_MAX_POSITION: u64 = (1 << (63 - OFFSET_NAME_BITS)) - 1;

fn name_hash(name: &str) -> u64 {
    let mut hasher = fnv::FnvHasher::default();
    hasher.write(name.as_bytes());
    hasher.finish() & OFFSET_NAME_MASK
}

/// Offset handed to the kernel for the entry at `index` of a listing.
fn entry_offset(index: usize, name: &str) -> i64 {
    let position = u64::try_from(index)
        .map_or(OFFSET_MAX_POSITION, |i| i + 1)
        .min(OFFSET_MAX_POSITION);
    i64::try_from((position << OFFSET_NAME_BITS) | name_hash(name)).unwrap_or(i64::MAX)
}

/// Index of the first entry to send after the one that produced `offset`.
///
/// The name hash locates the previous entry in the current listing, so
/// entries added or removed elsewhere do not shift the cursor. If that entry
/// is gone, the cursor resumes at its old position, which after the removal
/// holds its successor. `.` and `..` are never resent.
fn resume_index(listing: &[DirListingEntry], offset: i64) -> usize {
    let Ok(raw) = u64::try_from(offset) else {
        return 0;
    };
    if raw == 0 {
        return 0;
    }
    let hash = raw & OFFSET_NAME_MASK;
    if let Some(idx) = listing.iter().position(|e| name_hash(&e.name) == hash) {
        return idx + 1;
    }
    let position = usize::try_from(raw >> OFFSET_NAME_BITS).unwrap_or(usize::MAX);
    debug!(offset, position, "readdir resume entry gone, resuming by position");
    position.saturating_sub(1).max(2).min(listing.len())
}

fn file_type(kind: EntryKind) -> FileType {
    match kind {
        EntryKind::Directory => FileType::Directory,
        EntryKind::File => FileType::RegularFile,
    }
}

impl Filesystem for McFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), c_int> {
        info!("FUSE filesystem initialized");
        Ok(())
    }

    fn destroy(&mut self) {
        let stats = self.stats();
        info!(
            metadata_ops = stats.metadata_ops,
            errors = stats.errors,
            list_calls = stats.list_calls,
            point_queries = stats.point_queries,
            cache_hit_rate = stats.cache_hit_rate(),
            timeouts = stats.timeouts,
            "FUSE filesystem destroyed"
        );
    }

    fn lookup(&mut self, _req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        self.ctx.stats.record_metadata_op();
        trace!(parent, name = ?name, "lookup");
        match self.do_lookup(parent, name) {
            Ok(attr) => reply.entry(&self.config.kernel_ttl(), &attr, 0),
            Err(e) => reply.error(self.record_failure("lookup", &e)),
        }
    }

    fn forget(&mut self, _req: &Request<'_>, ino: u64, nlookup: u64) {
        trace!(inode = ino, nlookup, "forget");
        self.inodes.forget(ino, nlookup);
    }

    fn batch_forget(&mut self, _req: &Request<'_>, nodes: &[fuser::fuse_forget_one]) {
        trace!(count = nodes.len(), "batch_forget");
        for node in nodes {
            self.inodes.forget(node.nodeid, node.nlookup);
        }
    }

    fn getattr(&mut self, _req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        self.ctx.stats.record_metadata_op();
        trace!(inode = ino, "getattr");
        match self.do_getattr(ino) {
            Ok(attr) => reply.attr(&self.config.kernel_ttl(), &attr),
            Err(e) => reply.error(self.record_failure("getattr", &e)),
        }
    }

    fn open(&mut self, _req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, flags, "open");
        match self.open_node(ino, false) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        trace!(inode = ino, fh, offset, size, "read");
        reply.data(&[]);
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        trace!(inode = ino, fh, offset, len = data.len(), "write ignored");
        reply.written(0);
    }

    fn flush(&mut self, _req: &Request<'_>, ino: u64, fh: u64, _lock_owner: u64, reply: ReplyEmpty) {
        trace!(inode = ino, fh, "flush");
        reply.ok();
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        trace!(fh, "release");
        reply.ok();
    }

    fn lseek(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        offset: i64,
        whence: i32,
        reply: ReplyLseek,
    ) {
        trace!(inode = ino, fh, offset, whence, "lseek");
        reply.offset(0);
    }

    fn opendir(&mut self, _req: &Request<'_>, ino: u64, _flags: i32, reply: ReplyOpen) {
        trace!(inode = ino, "opendir");
        match self.open_node(ino, true) {
            Ok(()) => reply.opened(0, 0),
            Err(e) => reply.error(e.to_errno()),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        self.ctx.stats.record_metadata_op();
        trace!(inode = ino, offset, "readdir");

        let listing = match self.do_readdir(ino) {
            Ok(listing) => listing,
            Err(e) => {
                reply.error(self.record_failure("readdir", &e));
                return;
            }
        };

        let start_idx = resume_index(&listing, offset);
        for (idx, entry) in listing.iter().enumerate().skip(start_idx) {
            if reply.add(entry.inode, entry_offset(idx, &entry.name), entry.file_type, &entry.name) {
                break;
            }
        }
        reply.ok();
    }

    fn releasedir(&mut self, _req: &Request<'_>, _ino: u64, _fh: u64, _flags: i32, reply: ReplyEmpty) {
        reply.ok();
    }

    fn statfs(&mut self, _req: &Request<'_>, _ino: u64, reply: fuser::ReplyStatfs) {
        reply.statfs(0, 0, 0, 0, 0, BLOCK_SIZE, NAME_MAX, BLOCK_SIZE);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use mcfs_api::{ApiError, ApiResult, RemoteEntry};
    use std::collections::HashSet;

    /// Root holding one directory `d` and one file `f`.
    struct TwoEntries;

    impl TwoEntries {
        fn children() -> Vec<RemoteEntry> {
            vec![
                RemoteEntry::new_directory(2, "/d"),
                RemoteEntry::new_file(3, "f", "/", 3),
            ]
        }
    }

    #[async_trait]
    impl RemoteCatalog for TwoEntries {
        async fn list_directory(&self, path: &str) -> ApiResult<Vec<RemoteEntry>> {
            match path {
                "/" => Ok(Self::children()),
                "/d" => Ok(Vec::new()),
                _ => Err(ApiError::NotFound { path: path.to_string() }),
            }
        }

        async fn entry_by_path(&self, path: &str) -> ApiResult<RemoteEntry> {
            if path == "/" {
                return Ok(RemoteEntry::new_directory(1, "/"));
            }
            Self::children()
                .into_iter()
                .find(|e| e.full_path() == path)
                .ok_or_else(|| ApiError::NotFound { path: path.to_string() })
        }
    }

    #[test]
    fn test_open_node_checks_kind() {
        let fs = McFs::new(Arc::new(TwoEntries), MountConfig::default()).unwrap();
        let dir = fs.do_lookup(ROOT_INODE, OsStr::new("d")).unwrap();
        let file = fs.do_lookup(ROOT_INODE, OsStr::new("f")).unwrap();

        assert!(fs.open_node(dir.ino, true).is_ok());
        assert!(fs.open_node(file.ino, false).is_ok());
        assert_eq!(fs.open_node(dir.ino, false).unwrap_err().to_errno(), libc::EISDIR);
        assert_eq!(fs.open_node(file.ino, true).unwrap_err().to_errno(), libc::ENOTDIR);
        assert_eq!(fs.open_node(999, false).unwrap_err().to_errno(), libc::ENOENT);
    }

    fn listing(names: &[&str]) -> Vec<DirListingEntry> {
        names
            .iter()
            .map(|name| DirListingEntry {
                inode: inode_of(&format!("/{name}")),
                file_type: FileType::RegularFile,
                name: (*name).to_string(),
            })
            .collect()
    }

    /// Names sent by a readdir call starting at `offset`, with the offset of
    /// the last one, stopping after `max` entries.
    fn chunk(listing: &[DirListingEntry], offset: i64, max: usize) -> (Vec<String>, i64) {
        let start = resume_index(listing, offset);
        let mut last = offset;
        let mut names = Vec::new();
        for (idx, entry) in listing.iter().enumerate().skip(start).take(max) {
            last = entry_offset(idx, &entry.name);
            names.push(entry.name.clone());
        }
        (names, last)
    }

    #[test]
    fn test_entry_offsets_are_positive_and_distinct() {
        let names = [".", "..", "a.txt", "b.txt", "data", "raw", "results"];
        let offsets: HashSet<i64> = names
            .iter()
            .enumerate()
            .map(|(i, n)| entry_offset(i, n))
            .collect();
        assert_eq!(offsets.len(), names.len());
        assert!(offsets.iter().all(|&o| o > 0));
        assert_eq!(entry_offset(3, "b.txt"), entry_offset(3, "b.txt"));
    }

    #[test]
    fn test_resume_from_start() {
        let entries = listing(&[".", "..", "a", "b"]);
        assert_eq!(resume_index(&entries, 0), 0);
        assert_eq!(resume_index(&entries, -5), 0);
    }

    #[test]
    fn test_resume_walks_listing_in_chunks() {
        let entries = listing(&[".", "..", "a", "b", "c", "d"]);
        let (first, offset) = chunk(&entries, 0, 4);
        assert_eq!(first, [".", "..", "a", "b"]);
        let (second, offset) = chunk(&entries, offset, 4);
        assert_eq!(second, ["c", "d"]);
        let (rest, _) = chunk(&entries, offset, 4);
        assert!(rest.is_empty());
    }

    #[test]
    fn test_resume_after_name_added_between_chunks() {
        let before = listing(&[".", "..", "a", "c", "d"]);
        let (first, offset) = chunk(&before, 0, 3);
        assert_eq!(first, [".", "..", "a"]);

        let after = listing(&[".", "..", "a", "b", "c", "d"]);
        let (second, _) = chunk(&after, offset, 10);
        assert_eq!(second, ["b", "c", "d"]);
    }

    #[test]
    fn test_resume_after_name_added_before_cursor() {
        let before = listing(&[".", "..", "b", "c", "d"]);
        let (first, offset) = chunk(&before, 0, 3);
        assert_eq!(first, [".", "..", "b"]);

        let after = listing(&[".", "..", "a", "b", "c", "d"]);
        let (second, _) = chunk(&after, offset, 10);
        assert_eq!(second, ["c", "d"]);
    }

    #[test]
    fn test_resume_after_last_sent_name_removed() {
        let before = listing(&[".", "..", "a", "b", "c", "d"]);
        let (first, offset) = chunk(&before, 0, 4);
        assert_eq!(first, [".", "..", "a", "b"]);

        let after = listing(&[".", "..", "a", "c", "d"]);
        let (second, _) = chunk(&after, offset, 10);
        assert_eq!(second, ["c", "d"]);
    }

    #[test]
    fn test_resume_never_resends_dot_entries() {
        let before = listing(&[".", "..", "a"]);
        let (_, offset) = chunk(&before, 0, 3);

        let after = listing(&[".", ".."]);
        assert_eq!(resume_index(&after, offset), 2);
    }

    #[test]
    fn test_file_type_mapping() {
        assert_eq!(file_type(EntryKind::Directory), FileType::Directory);
        assert_eq!(file_type(EntryKind::File), FileType::RegularFile);
    }
}
