//! Errors surfaced by filesystem operations, and their errno codes.

use gridmount_storage::StoreError;
use thiserror::Error;

pub type FsResult<T> = Result<T, FsError>;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("no such file or directory")]
    NotFound,

    #[error("access denied")]
    AccessDenied,

    #[error("operation not supported")]
    Unsupported,

    /// The caller's buffer is too small; retry with `required` bytes.
    #[error("buffer too small: {required} bytes required")]
    Range { required: u32 },

    #[error("no such attribute")]
    NoAttribute,

    #[error("store failure: {0}")]
    Store(#[from] StoreError),
}

#[cfg(target_os = "linux")]
const ENOATTR: i32 = libc::ENODATA;
#[cfg(not(target_os = "linux"))]
const ENOATTR: i32 = libc::ENOATTR;

impl FsError {
    pub fn errno(&self) -> i32 {
        match self {
            FsError::NotFound => libc::ENOENT,
            FsError::AccessDenied => libc::EACCES,
            FsError::Unsupported => libc::ENOTSUP,
            FsError::Range { .. } => libc::ERANGE,
            FsError::NoAttribute => ENOATTR,
            FsError::Store(_) => libc::EIO,
        }
    }
}
