//! Directory listing: stored names merged with staged, uncommitted names.
//!
//! A name that is both stored and staged-but-uncommitted is listed twice.
//! Once the staged copy is committed it is listed only through the store.

use std::collections::HashSet;
use std::time::SystemTime;

use gridmount_core::config::NamespaceMode;
use gridmount_storage::ChunkStore;

use crate::attr::{Attr, DirEntry};
use crate::error::{FsError, FsResult};
use crate::namespace::{child_of, Child};
use crate::table::OpenFileTable;

pub struct DirectoryView<'a> {
    table: &'a OpenFileTable,
    store: &'a dyn ChunkStore,
    mode: NamespaceMode,
}

impl<'a> DirectoryView<'a> {
    pub fn new(table: &'a OpenFileTable, store: &'a dyn ChunkStore, mode: NamespaceMode) -> Self {
        DirectoryView { table, store, mode }
    }

    /// List directory `dir`, given as a store name (`""` is the root).
    pub async fn list(&self, dir: &str) -> FsResult<Vec<DirEntry>> {
        if self.mode == NamespaceMode::Heuristic && !dir.is_empty() {
            return Err(FsError::NotFound);
        }

        let now = SystemTime::now();
        let dot = if dir.is_empty() {
            Attr::root(now)
        } else {
            Attr::directory(now)
        };
        let mut entries = vec![DirEntry::new(".", dot), DirEntry::new("..", Attr::root(now))];

        let mut files: Vec<(String, Attr)> = self
            .store
            .list_metadata()
            .await?
            .iter()
            .map(|record| (record.filename.clone(), Attr::stored(record)))
            .collect();
        for name in self.table.uncommitted_names() {
            if let Some(file) = self.table.lookup(&name) {
                let length = file.lock().unwrap().len();
                files.push((name, Attr::staged(length)));
            }
        }

        if self.mode == NamespaceMode::Heuristic {
            entries.extend(files.into_iter().map(|(name, attr)| DirEntry::new(name, attr)));
            return Ok(entries);
        }

        let mut seen_dirs: HashSet<String> = HashSet::new();
        for (name, attr) in &files {
            match child_of(dir, name) {
                Some(Child::File(leaf)) => entries.push(DirEntry::new(leaf, *attr)),
                Some(Child::Directory(sub)) => {
                    if seen_dirs.insert(sub.to_string()) {
                        entries.push(DirEntry::new(sub, Attr::directory(now)));
                    }
                }
                None => {}
            }
        }

        if !dir.is_empty() && entries.len() == 2 {
            return Err(FsError::NotFound);
        }
        Ok(entries)
    }
}
