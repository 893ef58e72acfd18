//! Attribute projection for remote entries.
//!
//! Catalog entries carry no ownership, permissions or timestamps that map
//! onto POSIX, so attributes are synthesized: fixed permission bits per
//! kind, the mounting user as owner, and the wall clock at call time for
//! every timestamp.

use fuser::{FileAttr, FileType};
use mcfs_api::{EntryKind, RemoteEntry};
use std::time::SystemTime;

/// Block size reported to the kernel.
pub const BLOCK_SIZE: u32 = 4096;

/// Permission bits for directories (rwxr-xr-x).
pub const DIR_PERM: u16 = 0o755;

/// Permission bits for files (rw-rw-rw-).
pub const FILE_PERM: u16 = 0o666;

/// Owner reported for every entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ownership {
    pub uid: u32,
    pub gid: u32,
}

impl Ownership {
    pub fn new(uid: u32, gid: u32) -> Self {
        Self { uid, gid }
    }

    /// The real user and group of this process.
    pub fn current() -> Self {
        Self {
            uid: nix::unistd::getuid().as_raw(),
            gid: nix::unistd::getgid().as_raw(),
        }
    }
}

/// Kernel-independent attributes of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeAttributes {
    pub ino: u64,
    pub kind: EntryKind,
    pub perm: u16,
    pub size: u64,
    pub uid: u32,
    pub gid: u32,
    /// Used for atime, mtime, ctime and crtime alike.
    pub time: SystemTime,
}

impl NodeAttributes {
    /// Full `st_mode`: type bits plus permission bits.
    pub fn mode(&self) -> u32 {
        let type_bits = match self.kind {
            EntryKind::Directory => u32::from(libc::S_IFDIR),
            EntryKind::File => u32::from(libc::S_IFREG),
        };
        type_bits | u32::from(self.perm)
    }

    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }

    pub fn to_file_attr(&self) -> FileAttr {
        let (kind, nlink, blocks) = match self.kind {
            EntryKind::Directory => (FileType::Directory, 2, 0),
            EntryKind::File => (
                FileType::RegularFile,
                1,
                self.size.div_ceil(u64::from(BLOCK_SIZE)),
            ),
        };
        FileAttr {
            ino: self.ino,
            size: self.size,
            blocks,
            atime: self.time,
            mtime: self.time,
            ctime: self.time,
            crtime: self.time,
            kind,
            perm: self.perm,
            nlink,
            uid: self.uid,
            gid: self.gid,
            rdev: 0,
            blksize: BLOCK_SIZE,
            flags: 0,
        }
    }
}

/// Projects `entry` (absent for the unloaded root) onto attributes.
///
/// `ino` comes from the node, so the loaded root keeps reporting
/// `ROOT_INODE`.
pub fn project(entry: Option<&RemoteEntry>, ino: u64, owner: Ownership, now: SystemTime) -> NodeAttributes {
    let (kind, perm, size) = match entry {
        Some(e) if e.is_file() => (EntryKind::File, FILE_PERM, e.size),
        _ => (EntryKind::Directory, DIR_PERM, 0),
    };
    NodeAttributes {
        ino,
        kind,
        perm,
        size,
        uid: owner.uid,
        gid: owner.gid,
        time: now,
    }
}
