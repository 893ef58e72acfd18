//! Canonical paths within a remote project.
//!
//! The catalog addresses every entry by an absolute, `/`-separated path.
//! [`CatalogPath`] keeps that form canonical: a single leading separator,
//! no empty components and no trailing separator except for the root itself.

use std::fmt;

/// Canonical absolute path of a remote entry.
///
/// # Examples
///
/// ```
/// use mcfs_api::CatalogPath;
///
/// let path = CatalogPath::new("data//sample.txt/");
/// assert_eq!(path.as_str(), "/data/sample.txt");
/// assert_eq!(path.file_name(), Some("sample.txt"));
/// assert_eq!(path.parent().unwrap().as_str(), "/data");
///
/// assert_eq!(CatalogPath::new("").as_str(), "/");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CatalogPath(String);

impl CatalogPath {
    /// The project root (`/`).
    #[inline]
    pub fn root() -> Self {
        CatalogPath(String::from("/"))
    }

    /// Canonicalises `path`.
    ///
    /// A missing leading separator is added, repeated separators collapse and
    /// trailing separators are dropped. `.` components are removed; `..` is
    /// kept verbatim since the catalog never reports it.
    pub fn new(path: impl AsRef<str>) -> Self {
        let mut canonical = String::with_capacity(path.as_ref().len() + 1);
        for component in path
            .as_ref()
            .split('/')
            .filter(|c| !c.is_empty() && *c != ".")
        {
            canonical.push('/');
            canonical.push_str(component);
        }
        if canonical.is_empty() {
            canonical.push('/');
        }
        CatalogPath(canonical)
    }

    /// Returns true for `/`.
    #[inline]
    pub fn is_root(&self) -> bool {
        self.0 == "/"
    }

    #[inline]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Appends one component, without doubling the separator at the root.
    ///
    /// ```
    /// use mcfs_api::CatalogPath;
    ///
    /// assert_eq!(CatalogPath::root().join("data").as_str(), "/data");
    /// assert_eq!(CatalogPath::new("/data").join("a.txt").as_str(), "/data/a.txt");
    /// ```
    pub fn join(&self, component: impl AsRef<str>) -> Self {
        let component = component.as_ref();
        if self.is_root() {
            CatalogPath::new(component)
        } else {
            CatalogPath::new(format!("{}/{component}", self.0))
        }
    }

    /// Containing directory; `None` for the root.
    pub fn parent(&self) -> Option<CatalogPath> {
        if self.is_root() {
            return None;
        }
        let idx = self.0.rfind('/')?;
        Some(CatalogPath::new(&self.0[..idx]))
    }

    /// Final component; `None` for the root.
    pub fn file_name(&self) -> Option<&str> {
        if self.is_root() {
            None
        } else {
            self.0.rsplit('/').next()
        }
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl Default for CatalogPath {
    fn default() -> Self {
        Self::root()
    }
}

impl AsRef<str> for CatalogPath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CatalogPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CatalogPath {
    fn from(s: &str) -> Self {
        CatalogPath::new(s)
    }
}

impl From<String> for CatalogPath {
    fn from(s: String) -> Self {
        CatalogPath::new(s)
    }
}
