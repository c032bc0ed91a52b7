//! FUSE filesystem driver: exposes a [`GridFs`](crate::fs::GridFs) through
//! the fuse3 path API.
//!
//! ```text
//! store:                                   mountpoint /mnt/grid:
//!   {prefix}/files/{id}.json  "docs/a.txt"   /mnt/grid/
//!   {prefix}/chunks/{id}/00000000            docs/
//!                                              a.txt
//! ```
//!
//! Files created through the mount live in memory until `flush`, which
//! commits them to the store. Committed files are read-only; opening one
//! for writing fails with `EACCES`.

#[cfg(feature = "fuse")]
mod inner {
    use std::ffi::OsStr;
    use std::num::NonZeroU32;
    use std::time::Duration;

    use bytes::Bytes;
    use fuse3::path::prelude::*;
    use fuse3::path::reply::ReplyXAttr;
    use fuse3::{Errno, FileType, MountOptions};
    use futures_util::stream;
    use tracing::{debug, info, warn};

    use crate::attr::{Attr, EntryKind};
    use crate::error::FsError;
    use crate::fs::GridFs;
    use crate::path::PathResolver;
    use crate::table::{HandleTable, OpenMode};
    use crate::xattr::XattrReply;

    const MAX_WRITE: u32 = 128 * 1024;

    fn to_errno(op: &'static str, path: &str, err: FsError) -> Errno {
        match &err {
            FsError::Store(e) => warn!(op, path, "store error: {e}"),
            other => debug!(op, path, "{other}"),
        }
        Errno::from(err.errno())
    }

    fn decode(path: &OsStr) -> fuse3::Result<&str> {
        PathResolver::decode(path).map_err(|e| Errno::from(e.errno()))
    }

    fn path_str(path: Option<&OsStr>) -> fuse3::Result<&str> {
        path.map_or(Err(Errno::from(libc::ENOENT)), decode)
    }

    fn join(parent: &OsStr, name: &OsStr) -> fuse3::Result<String> {
        PathResolver::join(parent, name).map_err(|e| Errno::from(e.errno()))
    }

    fn xattr_reply(reply: XattrReply) -> ReplyXAttr {
        match reply {
            XattrReply::Size(n) => ReplyXAttr::Size(n),
            XattrReply::Data(data) => ReplyXAttr::Data(Bytes::from(data)),
        }
    }

    // ── GridFuse ──────────────────────────────────────────────────────────────

    pub struct GridFuse {
        fs: GridFs,
        uid: u32,
        gid: u32,
        attr_ttl: Duration,
        handles: HandleTable,
    }

    impl GridFuse {
        pub fn new(fs: GridFs, attr_ttl: Duration) -> Self {
            let (uid, gid) = unsafe { (libc::getuid(), libc::getgid()) };
            GridFuse {
                fs,
                uid,
                gid,
                attr_ttl,
                handles: HandleTable::new(),
            }
        }

        fn file_attr(&self, attr: &Attr) -> FileAttr {
            let kind = match attr.kind {
                EntryKind::File => FileType::RegularFile,
                EntryKind::Directory => FileType::Directory,
            };
            FileAttr {
                size: attr.size,
                blocks: attr.size.div_ceil(512),
                atime: attr.mtime,
                mtime: attr.mtime,
                ctime: attr.ctime,
                #[cfg(target_os = "macos")]
                crtime: attr.ctime,
                kind,
                perm: attr.perm,
                nlink: attr.nlink,
                uid: self.uid,
                gid: self.gid,
                rdev: 0,
                blksize: 4096,
                #[cfg(target_os = "macos")]
                flags: 0,
            }
        }

        fn handle_mode(&self, fh: u64) -> fuse3::Result<OpenMode> {
            self.handles
                .mode(fh)
                .ok_or_else(|| Errno::from(libc::EBADF))
        }

        async fn listing(&self, path: &str) -> fuse3::Result<Vec<(String, FileType, FileAttr)>> {
            let entries = self
                .fs
                .readdir(path)
                .await
                .map_err(|e| to_errno("readdir", path, e))?;
            Ok(entries
                .into_iter()
                .map(|e| {
                    let kind = if e.is_dir() {
                        FileType::Directory
                    } else {
                        FileType::RegularFile
                    };
                    let attr = self.file_attr(&e.attr);
                    (e.name, kind, attr)
                })
                .collect())
        }
    }

    // ── PathFilesystem impl ────────────────────────────────────────────────────

    impl PathFilesystem for GridFuse {
        async fn init(&self, _req: Request) -> fuse3::Result<ReplyInit> {
            debug!(namespace = ?self.fs.options().namespace, "gridmount init");
            Ok(ReplyInit {
                max_write: NonZeroU32::new(MAX_WRITE).unwrap_or(NonZeroU32::MIN),
            })
        }

        async fn destroy(&self, _req: Request) {
            let pending = self.fs.table().uncommitted_names();
            if !pending.is_empty() {
                warn!(count = pending.len(), names = ?pending, "unmounting with uncommitted files");
            }
            info!("gridmount unmounted");
        }

        async fn getattr(
            &self,
            _req: Request,
            path: Option<&OsStr>,
            _fh: Option<u64>,
            _flags: u32,
        ) -> fuse3::Result<ReplyAttr> {
            let path = path_str(path)?;
            let attr = self
                .fs
                .getattr(path)
                .await
                .map_err(|e| to_errno("getattr", path, e))?;
            Ok(ReplyAttr {
                ttl: self.attr_ttl,
                attr: self.file_attr(&attr),
            })
        }

        async fn lookup(
            &self,
            _req: Request,
            parent: &OsStr,
            name: &OsStr,
        ) -> fuse3::Result<ReplyEntry> {
            let path = join(parent, name)?;
            let attr = self
                .fs
                .getattr(&path)
                .await
                .map_err(|e| to_errno("lookup", &path, e))?;
            Ok(ReplyEntry {
                ttl: self.attr_ttl,
                attr: self.file_attr(&attr),
            })
        }

        type DirEntryStream<'a>
            = stream::Iter<std::vec::IntoIter<fuse3::Result<DirectoryEntry>>>
        where
            Self: 'a;

        type DirEntryPlusStream<'a>
            = stream::Iter<std::vec::IntoIter<fuse3::Result<DirectoryEntryPlus>>>
        where
            Self: 'a;

        async fn readdir<'a>(
            &'a self,
            _req: Request,
            path: &'a OsStr,
            _fh: u64,
            offset: i64,
        ) -> fuse3::Result<ReplyDirectory<Self::DirEntryStream<'a>>> {
            let path = decode(path)?;
            let entries: Vec<_> = self
                .listing(path)
                .await?
                .into_iter()
                .zip(1i64..)
                .filter(|(_, next)| *next > offset)
                .map(|((name, kind, _), next)| {
                    Ok(DirectoryEntry {
                        kind,
                        name: name.into(),
                        offset: next,
                    })
                })
                .collect();
            Ok(ReplyDirectory {
                entries: stream::iter(entries),
            })
        }

        async fn readdirplus<'a>(
            &'a self,
            _req: Request,
            path: &'a OsStr,
            _fh: u64,
            offset: u64,
            _lock_owner: u64,
        ) -> fuse3::Result<ReplyDirectoryPlus<Self::DirEntryPlusStream<'a>>> {
            let path = decode(path)?;
            let offset = offset as i64;
            let entries: Vec<_> = self
                .listing(path)
                .await?
                .into_iter()
                .zip(1i64..)
                .filter(|(_, next)| *next > offset)
                .map(|((name, kind, attr), next)| {
                    Ok(DirectoryEntryPlus {
                        kind,
                        name: name.into(),
                        offset: next,
                        attr,
                        entry_ttl: self.attr_ttl,
                        attr_ttl: self.attr_ttl,
                    })
                })
                .collect();
            Ok(ReplyDirectoryPlus {
                entries: stream::iter(entries),
            })
        }

        async fn opendir(
            &self,
            _req: Request,
            _path: &OsStr,
            _flags: u32,
        ) -> fuse3::Result<ReplyOpen> {
            Ok(ReplyOpen { fh: 0, flags: 0 })
        }

        async fn open(&self, _req: Request, path: &OsStr, flags: u32) -> fuse3::Result<ReplyOpen> {
            let path = decode(path)?;
            let mode = self
                .fs
                .open(path, flags)
                .await
                .map_err(|e| to_errno("open", path, e))?;
            let fh = self.handles.register(path, mode);
            Ok(ReplyOpen { fh, flags: 0 })
        }

        async fn create(
            &self,
            _req: Request,
            parent: &OsStr,
            name: &OsStr,
            _mode: u32,
            _flags: u32,
        ) -> fuse3::Result<ReplyCreated> {
            let path = join(parent, name)?;
            let attr = self
                .fs
                .create(&path)
                .map_err(|e| to_errno("create", &path, e))?;
            let fh = self.handles.register(&path, OpenMode::Write);
            Ok(ReplyCreated {
                ttl: self.attr_ttl,
                attr: self.file_attr(&attr),
                generation: 0,
                fh,
                flags: 0,
            })
        }

        async fn read(
            &self,
            _req: Request,
            path: Option<&OsStr>,
            _fh: u64,
            offset: u64,
            size: u32,
        ) -> fuse3::Result<ReplyData> {
            let path = path_str(path)?;
            let data = self
                .fs
                .read(path, size as usize, offset)
                .await
                .map_err(|e| to_errno("read", path, e))?;
            Ok(ReplyData {
                data: Bytes::from(data),
            })
        }

        async fn write(
            &self,
            _req: Request,
            path: Option<&OsStr>,
            _fh: u64,
            offset: u64,
            data: &[u8],
            _write_flags: u32,
            _flags: u32,
        ) -> fuse3::Result<ReplyWrite> {
            let path = path_str(path)?;
            let written = self
                .fs
                .write(path, data, offset)
                .map_err(|e| to_errno("write", path, e))?;
            Ok(ReplyWrite {
                written: written as u32,
            })
        }

        async fn flush(
            &self,
            _req: Request,
            path: Option<&OsStr>,
            fh: u64,
            _lock_owner: u64,
        ) -> fuse3::Result<()> {
            if self.handle_mode(fh)? == OpenMode::ReadOnly {
                return Ok(());
            }
            let path = path_str(path)?;
            self.fs
                .flush(path)
                .await
                .map_err(|e| to_errno("flush", path, e))?;
            Ok(())
        }

        async fn release(
            &self,
            _req: Request,
            path: Option<&OsStr>,
            fh: u64,
            _flags: u32,
            _lock_owner: u64,
            _flush: bool,
        ) -> fuse3::Result<()> {
            let Some(handle) = self.handles.remove(fh) else {
                warn!(fh, path = ?path, "release of unknown file handle");
                return Ok(());
            };
            // the staged file is keyed by the name it was opened under
            self.fs
                .release(&handle.path, handle.mode)
                .map_err(|e| to_errno("release", &handle.path, e))
        }

        async fn unlink(&self, _req: Request, parent: &OsStr, name: &OsStr) -> fuse3::Result<()> {
            let path = join(parent, name)?;
            self.fs
                .unlink(&path)
                .await
                .map_err(|e| to_errno("unlink", &path, e))
        }

        async fn rename(
            &self,
            _req: Request,
            origin_parent: &OsStr,
            origin_name: &OsStr,
            parent: &OsStr,
            name: &OsStr,
        ) -> fuse3::Result<()> {
            let from = join(origin_parent, origin_name)?;
            let to = join(parent, name)?;
            self.fs
                .rename(&from, &to)
                .await
                .map_err(|e| to_errno("rename", &from, e))
        }

        async fn setxattr(
            &self,
            _req: Request,
            path: &OsStr,
            name: &OsStr,
            value: &[u8],
            _flags: u32,
            _position: u32,
        ) -> fuse3::Result<()> {
            let path = decode(path)?;
            let Some(name) = name.to_str() else {
                return Err(Errno::from(FsError::Unsupported.errno()));
            };
            self.fs
                .setxattr(path, name, value)
                .map_err(|e| to_errno("setxattr", path, e))
        }

        async fn getxattr(
            &self,
            _req: Request,
            path: &OsStr,
            name: &OsStr,
            size: u32,
        ) -> fuse3::Result<ReplyXAttr> {
            let path = decode(path)?;
            let Some(name) = name.to_str() else {
                return Err(Errno::from(FsError::NoAttribute.errno()));
            };
            self.fs
                .getxattr(path, name, size)
                .await
                .map(xattr_reply)
                .map_err(|e| to_errno("getxattr", path, e))
        }

        async fn listxattr(
            &self,
            _req: Request,
            path: &OsStr,
            size: u32,
        ) -> fuse3::Result<ReplyXAttr> {
            let path = decode(path)?;
            self.fs
                .listxattr(path, size)
                .await
                .map(xattr_reply)
                .map_err(|e| to_errno("listxattr", path, e))
        }

        async fn statfs(&self, _req: Request, _path: &OsStr) -> fuse3::Result<ReplyStatFs> {
            Ok(ReplyStatFs {
                blocks: 1 << 30,
                bfree: 1 << 29,
                bavail: 1 << 29,
                files: 1 << 20,
                ffree: 1 << 19,
                bsize: 4096,
                namelen: 255,
                frsize: 4096,
            })
        }
    }

    // ── Public mount API ──────────────────────────────────────────────────────

    pub struct MountConfig {
        pub fs: GridFs,
        pub mountpoint: std::path::PathBuf,
        pub attr_ttl: Duration,
        pub allow_other: bool,
        pub fs_name: String,
    }

    /// Mount the filesystem and block until it is unmounted
    /// (e.g. `fusermount3 -u <mountpoint>`).
    pub async fn mount(cfg: MountConfig) -> std::io::Result<()> {
        let fs = GridFuse::new(cfg.fs, cfg.attr_ttl);

        let mut opts = MountOptions::default();
        opts.fs_name(cfg.fs_name);
        opts.force_readdir_plus(true);
        if cfg.allow_other {
            opts.allow_other(true);
        }

        info!(mountpoint = %cfg.mountpoint.display(), "mounting gridmount (unprivileged via fusermount3)");

        let handle = Session::new(opts)
            .mount_with_unprivileged(fs, &cfg.mountpoint)
            .await?;

        handle.await
    }
}

#[cfg(feature = "fuse")]
pub use inner::{mount, GridFuse, MountConfig};
