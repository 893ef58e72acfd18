//! FUSE filesystem for Materials Commons projects.
//!
//! Mounts the file/directory tree of one remote project so ordinary tools
//! can browse it. Only metadata is served: listings, lookups and attributes
//! come from the catalog API, file contents read as empty.
//!
//! # Features
//!
//! - Stable inode numbers derived from paths (FNV-1a 64)
//! - Directory listings cached per path with a fixed freshness window
//! - Lookups answered from a fresh parent listing, or a point query
//! - Concurrent kernel callbacks, each bounded by an I/O timeout
//!
//! # Usage
//!
//! ```no_run
//! use mcfs_api::{CatalogClient, ClientConfig};
//! use mcfs_fuse::{McFs, MountConfig};
//! use std::sync::Arc;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let client = CatalogClient::new(ClientConfig::new("https://materialscommons.org/api", "token", 42)?)?;
//! let fs = McFs::new(Arc::new(client), MountConfig::default())?;
//! let session = fuser::spawn_mount2(fs, "/mnt/project", &[fuser::MountOption::RO])?;
//! # drop(session);
//! # Ok(())
//! # }
//! ```

pub mod async_bridge;
pub mod attr;
pub mod cache;
pub mod config;
pub mod error;
pub mod filesystem;
pub mod inode;
pub mod node;
pub mod stats;

pub use async_bridge::{Bridge, BridgeError};
pub use attr::{NodeAttributes, Ownership, DIR_PERM, FILE_PERM};
pub use cache::{CacheEntry, DirectoryCache};
pub use config::{MountConfig, DEFAULT_CACHE_TIMEOUT, DEFAULT_IO_TIMEOUT};
pub use error::{FuseError, FuseResult, ToErrno};
pub use filesystem::{DirListingEntry, McFs};
pub use inode::{inode_of, InodeEntry, InodeTable, ROOT_INODE};
pub use node::{DirEntryOut, NodeContext, NodeOps, VirtualNode};
pub use stats::{MountStats, StatsSnapshot};
