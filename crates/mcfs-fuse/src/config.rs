//! Mount configuration for the FUSE filesystem.

use std::time::Duration;

/// Default freshness window for directory listings and kernel TTLs.
pub const DEFAULT_CACHE_TIMEOUT: Duration = Duration::from_secs(10);

/// Default upper bound on a single catalog round trip from a kernel callback.
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration options for the FUSE filesystem.
#[derive(Debug, Clone)]
pub struct MountConfig {
    /// How long a directory listing is served from memory before the catalog
    /// is asked again.
    ///
    /// The kernel attribute and entry TTLs use the same value so both layers
    /// agree on freshness. Default: 10 seconds.
    pub cache_timeout: Duration,

    /// Timeout for a kernel callback waiting on the catalog.
    ///
    /// Operations that exceed this fail with EIO. Default: 30 seconds.
    pub io_timeout: Duration,

    /// Mount read-only.
    pub read_only: bool,
}

impl Default for MountConfig {
    fn default() -> Self {
        Self {
            cache_timeout: DEFAULT_CACHE_TIMEOUT,
            io_timeout: DEFAULT_IO_TIMEOUT,
            read_only: false,
        }
    }
}

impl MountConfig {
    /// Sets the directory cache timeout (also used as the kernel TTL).
    #[must_use]
    pub fn cache_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout = timeout;
        self
    }

    #[must_use]
    pub fn io_timeout(mut self, timeout: Duration) -> Self {
        self.io_timeout = timeout;
        self
    }

    #[must_use]
    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// TTL reported to the kernel for attributes and entries.
    #[inline]
    pub fn kernel_ttl(&self) -> Duration {
        self.cache_timeout
    }
}
