pub mod config;
pub mod error;
pub mod types;

pub use error::{GridError, GridResult};
pub use types::{FileId, FileRecord};
