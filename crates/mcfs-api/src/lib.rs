//! Client and data model for the Materials Commons catalog API.
//!
//! A Materials Commons project is a tree of directories and files whose
//! metadata is served over HTTP. This crate provides the pieces a mount
//! backend needs to browse that tree:
//!
//! - [`RemoteEntry`] - one remote file or directory, as decoded from the API
//! - [`CatalogPath`] - canonical absolute paths within a project
//! - [`RemoteCatalog`] - the two read queries a filesystem needs
//! - [`CatalogClient`] - the HTTP implementation of [`RemoteCatalog`]
//! - [`ApiError`] / [`ErrorCategory`] - the failure taxonomy
//!
//! # Usage
//!
//! ```no_run
//! use mcfs_api::{CatalogClient, ClientConfig, RemoteCatalog};
//!
//! # async fn run() -> Result<(), mcfs_api::ApiError> {
//! let config = ClientConfig::new("https://materialscommons.org/api", "token", 42)?;
//! let client = CatalogClient::new(config)?;
//!
//! for entry in client.list_directory("/").await? {
//!     println!("{} ({} bytes)", entry.full_path(), entry.size);
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod entry;
pub mod error;
pub mod path;

pub use client::{CatalogClient, ClientConfig, RemoteCatalog, DEFAULT_REQUEST_TIMEOUT};
pub use entry::{DirectoryRef, EntryKind, RemoteEntry, DIRECTORY_MIME_TYPE};
pub use error::{ApiError, ApiResult, ErrorCategory};
pub use path::CatalogPath;
