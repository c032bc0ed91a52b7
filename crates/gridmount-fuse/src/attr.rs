//! File attributes as seen through the mount.

use std::time::SystemTime;

use gridmount_core::FileRecord;

/// Staged files are writable by anyone
pub const PERM_STAGED: u16 = 0o777;
/// Committed files are read-only
pub const PERM_STORED: u16 = 0o555;
pub const PERM_ROOT: u16 = 0o777;
pub const PERM_DIR: u16 = 0o555;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attr {
    pub kind: EntryKind,
    pub perm: u16,
    pub size: u64,
    pub nlink: u32,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
}

impl Attr {
    pub fn root(now: SystemTime) -> Self {
        Attr {
            kind: EntryKind::Directory,
            perm: PERM_ROOT,
            size: 0,
            nlink: 2,
            mtime: now,
            ctime: now,
        }
    }

    pub fn directory(now: SystemTime) -> Self {
        Attr {
            perm: PERM_DIR,
            ..Self::root(now)
        }
    }

    /// A file still held in memory; its times are always "now".
    pub fn staged(length: u64) -> Self {
        let now = SystemTime::now();
        Attr {
            kind: EntryKind::File,
            perm: PERM_STAGED,
            size: length,
            nlink: 1,
            mtime: now,
            ctime: now,
        }
    }

    pub fn stored(record: &FileRecord) -> Self {
        let uploaded = record.upload_system_time();
        Attr {
            kind: EntryKind::File,
            perm: PERM_STORED,
            size: record.length,
            nlink: 1,
            mtime: uploaded,
            ctime: uploaded,
        }
    }
}

/// One line of a directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub attr: Attr,
}

impl DirEntry {
    pub fn new(name: impl Into<String>, attr: Attr) -> Self {
        DirEntry {
            name: name.into(),
            attr,
        }
    }

    pub fn is_dir(&self) -> bool {
        self.attr.kind == EntryKind::Directory
    }
}
