//! Open-file table: store name → staged file, plus the kernel handle table.
//!
//! The table is owned by the filesystem service and lives exactly as long as
//! the mount. Its lock only guards the map; each staged file has its own
//! lock, so writes to different paths never contend. Calls for the *same*
//! path are not serialized: a second `create` replaces the first staged file
//! and the last writer wins.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::error::{FsError, FsResult};
use crate::staged::StagedFile;

pub type SharedFile = Arc<Mutex<StagedFile>>;

/// Access mode a handle was opened with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    ReadOnly,
    Write,
}

impl OpenMode {
    /// Decode the access mode from `open(2)` flags.
    pub fn from_flags(flags: u32) -> Self {
        if flags as i32 & libc::O_ACCMODE == libc::O_RDONLY {
            OpenMode::ReadOnly
        } else {
            OpenMode::Write
        }
    }
}

#[derive(Default)]
pub struct OpenFileTable {
    files: Mutex<HashMap<String, SharedFile>>,
}

impl OpenFileTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage a new empty file under `name`, discarding any previous one.
    pub fn create(&self, name: &str, chunk_size: u32) -> SharedFile {
        let file = Arc::new(Mutex::new(StagedFile::new(chunk_size)));
        let previous = self
            .files
            .lock()
            .unwrap()
            .insert(name.to_string(), file.clone());
        if previous.is_some() {
            debug!(name, "re-created staged file; previous contents discarded");
        }
        file
    }

    pub fn lookup(&self, name: &str) -> Option<SharedFile> {
        self.files.lock().unwrap().get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.files.lock().unwrap().contains_key(name)
    }

    /// Drop the staged file for a write handle.
    ///
    /// Does not commit: a dirty file released without a prior flush loses
    /// its content.
    pub fn release(&self, name: &str, mode: OpenMode) -> FsResult<()> {
        if mode == OpenMode::ReadOnly {
            return Ok(());
        }
        let file = self
            .files
            .lock()
            .unwrap()
            .remove(name)
            .ok_or(FsError::NotFound)?;
        let file = file.lock().unwrap();
        if file.is_dirty() {
            warn!(name, bytes = file.len(), "released uncommitted file; data discarded");
        }
        Ok(())
    }

    /// Every staged name, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.files.lock().unwrap().keys().cloned().collect();
        names.sort();
        names
    }

    /// Staged names whose content has not been committed, sorted.
    pub fn uncommitted_names(&self) -> Vec<String> {
        let files: Vec<(String, SharedFile)> = self
            .files
            .lock()
            .unwrap()
            .iter()
            .map(|(name, file)| (name.clone(), file.clone()))
            .collect();
        let mut names: Vec<String> = files
            .into_iter()
            .filter(|(_, file)| file.lock().unwrap().is_dirty())
            .map(|(name, _)| name)
            .collect();
        names.sort();
        names
    }
}

/// An open file handle: the path it was opened under and its access mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Handle {
    pub path: String,
    pub mode: OpenMode,
}

/// Kernel file handles → [`Handle`].
///
/// Keeps the opening path so `release` can drop the staged file even when
/// the kernel no longer supplies one (the file was unlinked or renamed
/// while open).
pub struct HandleTable {
    handles: Mutex<HashMap<u64, Handle>>,
    next_fh: AtomicU64,
}

impl Default for HandleTable {
    fn default() -> Self {
        HandleTable {
            handles: Mutex::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
        }
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, path: &str, mode: OpenMode) -> u64 {
        let fh = self.next_fh.fetch_add(1, Ordering::Relaxed);
        let handle = Handle {
            path: path.to_string(),
            mode,
        };
        self.handles.lock().unwrap().insert(fh, handle);
        fh
    }

    pub fn mode(&self, fh: u64) -> Option<OpenMode> {
        self.handles.lock().unwrap().get(&fh).map(|h| h.mode)
    }

    /// Forget `fh`, returning what it was opened with.
    pub fn remove(&self, fh: u64) -> Option<Handle> {
        self.handles.lock().unwrap().remove(&fh)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_lookup() {
        let table = OpenFileTable::new();
        assert!(table.lookup("a.txt").is_none());
        table.create("a.txt", 4);
        assert!(table.contains("a.txt"));
        assert_eq!(table.lookup("a.txt").unwrap().lock().unwrap().chunk_size(), 4);
    }

    #[test]
    fn second_create_replaces() {
        let table = OpenFileTable::new();
        let first = table.create("a.txt", 4);
        first.lock().unwrap().write(b"old", 0);

        table.create("a.txt", 4);
        let current = table.lookup("a.txt").unwrap();
        assert!(current.lock().unwrap().is_empty());
        assert!(!Arc::ptr_eq(&first, &current));
    }

    #[test]
    fn release_read_only_is_noop() {
        let table = OpenFileTable::new();
        table.create("a.txt", 4);
        table.release("a.txt", OpenMode::ReadOnly).unwrap();
        assert!(table.contains("a.txt"));
        // Read-only release of an unknown path is still fine
        table.release("other.txt", OpenMode::ReadOnly).unwrap();
    }

    #[test]
    fn release_write_removes() {
        let table = OpenFileTable::new();
        table.create("a.txt", 4);
        table.release("a.txt", OpenMode::Write).unwrap();
        assert!(!table.contains("a.txt"));
        assert!(matches!(
            table.release("a.txt", OpenMode::Write),
            Err(FsError::NotFound)
        ));
    }

    #[test]
    fn uncommitted_excludes_clean_files() {
        let table = OpenFileTable::new();
        table.create("b.txt", 4);
        let clean = table.create("a.txt", 4);
        {
            let mut f = clean.lock().unwrap();
            let snap = f.begin_commit().unwrap();
            f.finish_commit(snap.generation, true);
        }
        assert_eq!(table.names(), vec!["a.txt", "b.txt"]);
        assert_eq!(table.uncommitted_names(), vec!["b.txt"]);
    }

    #[test]
    fn access_mode_from_flags() {
        assert_eq!(OpenMode::from_flags(libc::O_RDONLY as u32), OpenMode::ReadOnly);
        assert_eq!(OpenMode::from_flags(libc::O_WRONLY as u32), OpenMode::Write);
        assert_eq!(
            OpenMode::from_flags((libc::O_RDWR | libc::O_CREAT) as u32),
            OpenMode::Write
        );
    }

    #[test]
    fn handles_remember_path_and_mode() {
        let handles = HandleTable::new();
        let a = handles.register("/a.txt", OpenMode::Write);
        let b = handles.register("/b.txt", OpenMode::ReadOnly);
        assert_ne!(a, b);
        assert_eq!(handles.mode(a), Some(OpenMode::Write));
        assert_eq!(handles.mode(b), Some(OpenMode::ReadOnly));

        let handle = handles.remove(a).unwrap();
        assert_eq!(handle.path, "/a.txt");
        assert_eq!(handle.mode, OpenMode::Write);
        assert_eq!(handles.mode(a), None);
        assert!(handles.remove(a).is_none());
    }
}
