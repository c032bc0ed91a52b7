//! Filesystem operations over the store, independent of the FUSE transport.
//!
//! Every call takes an absolute virtual path, resolves it to a store name,
//! and routes it: writes through the open-file table, reads through
//! [`ReadRouter`], listings through [`DirectoryView`], renames straight to
//! the store.

use std::sync::Arc;
use std::time::SystemTime;

use gridmount_core::config::{CommitStrategy, GridConfig, NamespaceMode};
use gridmount_core::types::DEFAULT_CHUNK_SIZE;
use gridmount_storage::ChunkStore;
use tracing::debug;

use crate::attr::{Attr, DirEntry};
use crate::commit::{CommitEngine, CommitOutcome};
use crate::error::{FsError, FsResult};
use crate::listing::DirectoryView;
use crate::namespace;
use crate::path::{PathKind, PathResolver};
use crate::read::ReadRouter;
use crate::rename::RenameEngine;
use crate::table::{OpenFileTable, OpenMode};
use crate::xattr::{sized, XattrReply, XattrView};

#[derive(Debug, Clone)]
pub struct FsOptions {
    pub default_chunk_size: u32,
    pub commit_strategy: CommitStrategy,
    pub namespace: NamespaceMode,
    pub max_depth: usize,
}

impl Default for FsOptions {
    fn default() -> Self {
        FsOptions {
            default_chunk_size: DEFAULT_CHUNK_SIZE,
            commit_strategy: CommitStrategy::Repoint,
            namespace: NamespaceMode::Tree,
            max_depth: 10,
        }
    }
}

impl FsOptions {
    pub fn from_config(config: &GridConfig) -> Self {
        FsOptions {
            default_chunk_size: config.store.default_chunk_size,
            commit_strategy: config.store.commit_strategy,
            namespace: config.mount.namespace,
            max_depth: config.mount.max_depth,
        }
    }
}

pub struct GridFs {
    store: Arc<dyn ChunkStore>,
    table: OpenFileTable,
    resolver: PathResolver,
    options: FsOptions,
}

impl GridFs {
    pub fn new(store: Arc<dyn ChunkStore>, options: FsOptions) -> Self {
        GridFs {
            store,
            table: OpenFileTable::new(),
            resolver: PathResolver::new(options.max_depth),
            options,
        }
    }

    pub fn table(&self) -> &OpenFileTable {
        &self.table
    }

    pub fn options(&self) -> &FsOptions {
        &self.options
    }

    fn store(&self) -> &dyn ChunkStore {
        self.store.as_ref()
    }

    pub async fn getattr(&self, path: &str) -> FsResult<Attr> {
        if PathResolver::is_root(path) {
            return Ok(Attr::root(SystemTime::now()));
        }
        let name = self.resolver.resolve(path)?;
        if let Some(file) = self.table.lookup(name) {
            let length = file.lock().unwrap().len();
            return Ok(Attr::staged(length));
        }

        if self.options.namespace == NamespaceMode::Heuristic
            && self.resolver.classify(path) == PathKind::Directory
        {
            return Ok(Attr::directory(SystemTime::now()));
        }

        if let Some(record) = self.store().find_metadata(name).await? {
            return Ok(Attr::stored(&record));
        }

        if self.options.namespace == NamespaceMode::Tree {
            let staged = self.table.names();
            let records = self.store().list_metadata().await?;
            let names = records
                .iter()
                .map(|r| r.filename.as_str())
                .chain(staged.iter().map(String::as_str));
            if namespace::is_directory(name, names) {
                return Ok(Attr::directory(SystemTime::now()));
            }
        }
        Err(FsError::NotFound)
    }

    pub async fn readdir(&self, path: &str) -> FsResult<Vec<DirEntry>> {
        let dir = self.resolver.resolve(path)?;
        DirectoryView::new(&self.table, self.store(), self.options.namespace)
            .list(dir)
            .await
    }

    /// Check access for an open; only read-only opens are permitted.
    pub async fn open(&self, path: &str, flags: u32) -> FsResult<OpenMode> {
        let name = self.resolver.resolve(path)?;
        match OpenMode::from_flags(flags) {
            OpenMode::Write => Err(FsError::AccessDenied),
            OpenMode::ReadOnly => {
                if self.table.contains(name) || self.store().find_metadata(name).await?.is_some()
                {
                    Ok(OpenMode::ReadOnly)
                } else {
                    Err(FsError::NotFound)
                }
            }
        }
    }

    /// Stage an empty file at `path`; any earlier staged copy is discarded.
    pub fn create(&self, path: &str) -> FsResult<Attr> {
        let name = self.resolver.resolve(path)?;
        if name.is_empty() {
            return Err(FsError::AccessDenied);
        }
        self.table.create(name, self.options.default_chunk_size);
        debug!(name, chunk_size = self.options.default_chunk_size, "staged new file");
        Ok(Attr::staged(0))
    }

    pub fn release(&self, path: &str, mode: OpenMode) -> FsResult<()> {
        let name = self.resolver.resolve(path)?;
        self.table.release(name, mode)
    }

    /// Remove every stored object at `path`; a staged copy is left alone.
    pub async fn unlink(&self, path: &str) -> FsResult<()> {
        let name = self.resolver.resolve(path)?;
        let removed = self.store().delete_object(name).await?;
        if removed == 0 && !self.table.contains(name) {
            return Err(FsError::NotFound);
        }
        Ok(())
    }

    pub async fn read(&self, path: &str, size: usize, offset: u64) -> FsResult<Vec<u8>> {
        let name = self.resolver.resolve(path)?;
        ReadRouter::new(&self.table, self.store())
            .read(name, size, offset)
            .await
    }

    pub fn write(&self, path: &str, data: &[u8], offset: u64) -> FsResult<usize> {
        let name = self.resolver.resolve(path)?;
        let file = self.table.lookup(name).ok_or(FsError::NotFound)?;
        let written = file.lock().unwrap().write(data, offset);
        Ok(written)
    }

    pub async fn flush(&self, path: &str) -> FsResult<CommitOutcome> {
        let name = self.resolver.resolve(path)?;
        CommitEngine::new(&self.table, self.store(), self.options.commit_strategy)
            .flush(name)
            .await
    }

    pub async fn rename(&self, from: &str, to: &str) -> FsResult<()> {
        let from = self.resolver.resolve(from)?;
        let to = self.resolver.resolve(to)?;
        RenameEngine::new(self.store()).rename(from, to).await
    }

    pub async fn listxattr(&self, path: &str, size: u32) -> FsResult<XattrReply> {
        if PathResolver::is_root(path) {
            return sized(Vec::new(), size);
        }
        let name = self.resolver.resolve(path)?;
        XattrView::new(&self.table, self.store()).list(name, size).await
    }

    pub async fn getxattr(&self, path: &str, attr: &str, size: u32) -> FsResult<XattrReply> {
        if PathResolver::is_root(path) {
            return Err(FsError::NoAttribute);
        }
        let name = self.resolver.resolve(path)?;
        XattrView::new(&self.table, self.store())
            .get(name, attr, size)
            .await
    }

    pub fn setxattr(&self, _path: &str, _attr: &str, _value: &[u8]) -> FsResult<()> {
        XattrView::new(&self.table, self.store()).set()
    }
}
