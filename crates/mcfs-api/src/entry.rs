//! Remote file and directory entries.
//!
//! A [`RemoteEntry`] is decoded from catalog responses and never mutated
//! locally. Its only behavior is classification ([`EntryKind`]) and deriving
//! the canonical full path that the filesystem layer keys everything on.

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DefaultOnNull};

/// MIME type the catalog reports for directories.
pub const DIRECTORY_MIME_TYPE: &str = "directory";

/// Whether an entry is a directory or a regular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    Directory,
    File,
}

/// The directory an entry lives in, as embedded in catalog responses.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirectoryRef {
    #[serde(default)]
    pub id: u64,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub name: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub path: String,
}

/// One remote file or directory.
///
/// Directories carry their own absolute `path`. Files are positioned by the
/// embedded parent [`DirectoryRef`] instead; their own `path` field is not
/// meaningful.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteEntry {
    /// Opaque remote identifier. Not used for local identity.
    pub id: u64,
    pub name: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub path: String,
    #[serde(default)]
    pub directory_id: u64,
    /// Byte length; zero for directories.
    #[serde(default)]
    pub size: u64,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub checksum: String,
    #[serde_as(deserialize_as = "DefaultOnNull")]
    #[serde(default)]
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<DirectoryRef>,
}

impl RemoteEntry {
    /// Builds a directory entry at `path`.
    pub fn new_directory(id: u64, path: impl AsRef<str>) -> Self {
        let path = path.as_ref().to_string();
        let name = path.rsplit('/').next().unwrap_or_default().to_string();
        Self {
            id,
            name,
            path,
            directory_id: 0,
            size: 0,
            checksum: String::new(),
            mime_type: DIRECTORY_MIME_TYPE.to_string(),
            directory: None,
        }
    }

    /// Builds a file entry named `name` inside the directory at `parent_path`.
    pub fn new_file(id: u64, name: impl Into<String>, parent_path: impl Into<String>, size: u64) -> Self {
        Self {
            id,
            name: name.into(),
            path: String::new(),
            directory_id: 0,
            size,
            checksum: String::new(),
            mime_type: "application/octet-stream".to_string(),
            directory: Some(DirectoryRef {
                path: parent_path.into(),
                ..DirectoryRef::default()
            }),
        }
    }

    #[must_use]
    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = mime_type.into();
        self
    }

    #[must_use]
    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = checksum.into();
        self
    }

    #[inline]
    pub fn kind(&self) -> EntryKind {
        if self.mime_type == DIRECTORY_MIME_TYPE {
            EntryKind::Directory
        } else {
            EntryKind::File
        }
    }

    #[inline]
    pub fn is_dir(&self) -> bool {
        self.kind() == EntryKind::Directory
    }

    #[inline]
    pub fn is_file(&self) -> bool {
        self.kind() == EntryKind::File
    }

    /// Absolute path of the containing directory, as reported by the catalog.
    ///
    /// Empty when the response carried no parent reference.
    pub fn parent_path(&self) -> &str {
        self.directory.as_ref().map_or("", |d| d.path.as_str())
    }

    /// Canonical full path of this entry.
    ///
    /// Directories report their own `path`. Files join the parent path and
    /// their name, without doubling the separator when the parent is `/`.
    ///
    /// ```
    /// use mcfs_api::RemoteEntry;
    ///
    /// assert_eq!(RemoteEntry::new_file(1, "a.txt", "/", 0).full_path(), "/a.txt");
    /// assert_eq!(RemoteEntry::new_file(2, "a.txt", "/sub", 0).full_path(), "/sub/a.txt");
    /// assert_eq!(RemoteEntry::new_directory(3, "/sub").full_path(), "/sub");
    /// ```
    pub fn full_path(&self) -> String {
        if self.is_dir() {
            return self.path.clone();
        }
        let parent = self.parent_path();
        if parent == "/" {
            format!("/{}", self.name)
        } else {
            format!("{parent}/{}", self.name)
        }
    }

    /// Returns true if this entry sits at `candidate`.
    ///
    /// Directories compare their reported `path`; files compare the parent
    /// path joined with their name. Comparison is byte-exact.
    pub fn matches_path(&self, candidate: &str) -> bool {
        if self.is_dir() {
            return self.path == candidate;
        }
        let parent = self.parent_path();
        let rest = if parent == "/" {
            candidate.strip_prefix('/')
        } else {
            candidate
                .strip_prefix(parent)
                .and_then(|r| r.strip_prefix('/'))
        };
        rest == Some(self.name.as_str())
    }
}
