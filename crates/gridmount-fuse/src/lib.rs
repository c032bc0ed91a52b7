//! gridmount-fuse: a staging-and-commit filesystem over a chunked object store
//!
//! New files are written into memory and committed to the store as chunk
//! records plus a metadata record on `flush`. Reads are served from the
//! staged copy when one exists, otherwise from stored chunks.
//!
//! Linux: fuse3 crate (kernel FUSE), behind the `fuse` feature.
//! macOS: fuse3 with macFUSE 4.x (feature: macos-fuse)

pub mod attr;
pub mod commit;
pub mod driver;
pub mod error;
pub mod fs;
pub mod listing;
pub mod namespace;
pub mod path;
pub mod read;
pub mod rename;
pub mod staged;
pub mod table;
pub mod xattr;

#[cfg(feature = "fuse")]
pub use driver::{mount, MountConfig};

pub use attr::{Attr, DirEntry, EntryKind};
pub use commit::{CommitEngine, CommitOutcome};
pub use error::{FsError, FsResult};
pub use fs::{FsOptions, GridFs};
pub use path::PathResolver;
pub use staged::{CommitState, StagedFile};
pub use table::{Handle, HandleTable, OpenFileTable, OpenMode};
pub use xattr::XattrReply;
