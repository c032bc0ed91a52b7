//! Virtual path resolution.
//!
//! Incoming paths are absolute (`/dir/name.txt`); the store keeps flat names
//! without the leading slash (`dir/name.txt`).

use std::ffi::OsStr;

use crate::error::{FsError, FsResult};

/// Classification under the leaf heuristic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Root,
    Directory,
    Leaf,
}

#[derive(Debug, Clone, Copy)]
pub struct PathResolver {
    max_depth: usize,
}

impl PathResolver {
    pub fn new(max_depth: usize) -> Self {
        PathResolver { max_depth }
    }

    /// Strip a single leading `/`.
    pub fn to_store_name(path: &str) -> &str {
        path.strip_prefix('/').unwrap_or(path)
    }

    /// True iff the last `.` sits in the final path segment.
    pub fn is_leaf(path: &str) -> bool {
        match (path.rfind('.'), path.rfind('/')) {
            (Some(dot), Some(slash)) => dot > slash,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Number of `/` separators.
    pub fn depth(path: &str) -> usize {
        path.matches('/').count()
    }

    pub fn is_root(path: &str) -> bool {
        path.is_empty() || path == "/"
    }

    pub fn classify(&self, path: &str) -> PathKind {
        if Self::is_root(path) {
            PathKind::Root
        } else if Self::is_leaf(path) {
            PathKind::Leaf
        } else {
            PathKind::Directory
        }
    }

    /// Kernel-supplied path as UTF-8; anything else cannot name a stored object.
    pub fn decode(path: &OsStr) -> FsResult<&str> {
        path.to_str().ok_or(FsError::NotFound)
    }

    /// `/docs` + `a.txt` → `/docs/a.txt`
    pub fn join(parent: &OsStr, name: &OsStr) -> FsResult<String> {
        let parent = Self::decode(parent)?;
        let name = Self::decode(name)?;
        Ok(if Self::is_root(parent) {
            format!("/{name}")
        } else {
            format!("{}/{}", parent.trim_end_matches('/'), name)
        })
    }

    /// Store name for `path`, or `NotFound` when it is too deep to resolve.
    pub fn resolve<'a>(&self, path: &'a str) -> FsResult<&'a str> {
        if Self::depth(path) > self.max_depth {
            return Err(FsError::NotFound);
        }
        Ok(Self::to_store_name(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_one_leading_slash() {
        assert_eq!(PathResolver::to_store_name("/a/b.txt"), "a/b.txt");
        assert_eq!(PathResolver::to_store_name("a.txt"), "a.txt");
        assert_eq!(PathResolver::to_store_name("//x"), "/x");
        assert_eq!(PathResolver::to_store_name("/"), "");
    }

    #[test]
    fn leaf_heuristic() {
        assert!(PathResolver::is_leaf("/a/b.txt"));
        assert!(!PathResolver::is_leaf("/a/b"));
        assert!(!PathResolver::is_leaf("/a.b/c"));
        assert!(PathResolver::is_leaf("notes.md"));
        assert!(!PathResolver::is_leaf("README"));
    }

    #[test]
    fn classify_paths() {
        let r = PathResolver::new(10);
        assert_eq!(r.classify("/"), PathKind::Root);
        assert_eq!(r.classify("/photos"), PathKind::Directory);
        assert_eq!(r.classify("/photos/cat.jpg"), PathKind::Leaf);
    }

    #[test]
    fn depth_guard() {
        let r = PathResolver::new(3);
        assert_eq!(PathResolver::depth("/a/b/c"), 3);
        assert_eq!(r.resolve("/a/b/c").unwrap(), "a/b/c");
        assert!(matches!(r.resolve("/a/b/c/d"), Err(FsError::NotFound)));
    }

    #[test]
    fn join_children() {
        let join = |p: &str, n: &str| PathResolver::join(OsStr::new(p), OsStr::new(n)).unwrap();
        assert_eq!(join("/", "a.txt"), "/a.txt");
        assert_eq!(join("/docs", "a.txt"), "/docs/a.txt");
        assert_eq!(join("/docs/", "a.txt"), "/docs/a.txt");
    }

    #[cfg(unix)]
    #[test]
    fn non_utf8_components_are_not_found() {
        use std::os::unix::ffi::OsStrExt;

        let bad = OsStr::from_bytes(b"dir\xff");
        assert!(matches!(PathResolver::decode(bad), Err(FsError::NotFound)));
        assert!(matches!(
            PathResolver::join(bad, OsStr::new("a.txt")),
            Err(FsError::NotFound)
        ));
        assert!(matches!(
            PathResolver::join(OsStr::new("/"), bad),
            Err(FsError::NotFound)
        ));
    }
}
