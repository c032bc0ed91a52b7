//! Read-only extended attributes backed by a record's free-form fields.
//!
//! Field `owner` on a stored record is exposed as `user.owner` on Linux
//! (other platforms use the bare name). Staged files have no attributes.

use gridmount_storage::ChunkStore;
use serde_json::Value;

use crate::error::{FsError, FsResult};
use crate::table::OpenFileTable;

#[cfg(target_os = "linux")]
pub const XATTR_PREFIX: &str = "user.";
#[cfg(not(target_os = "linux"))]
pub const XATTR_PREFIX: &str = "";

/// Reply to a size query (`size == 0`) or a sized request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XattrReply {
    Size(u32),
    Data(Vec<u8>),
}

pub fn namespace_xattr(field: &str) -> String {
    format!("{XATTR_PREFIX}{field}")
}

pub fn unnamespace_xattr(name: &str) -> Option<&str> {
    name.strip_prefix(XATTR_PREFIX).filter(|field| !field.is_empty())
}

/// String form of an attribute value; strings are not quoted.
pub fn attribute_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub(crate) fn sized(payload: Vec<u8>, size: u32) -> FsResult<XattrReply> {
    let required = payload.len() as u32;
    if size == 0 {
        Ok(XattrReply::Size(required))
    } else if size < required {
        Err(FsError::Range { required })
    } else {
        Ok(XattrReply::Data(payload))
    }
}

pub struct XattrView<'a> {
    table: &'a OpenFileTable,
    store: &'a dyn ChunkStore,
}

impl<'a> XattrView<'a> {
    pub fn new(table: &'a OpenFileTable, store: &'a dyn ChunkStore) -> Self {
        XattrView { table, store }
    }

    /// NUL-separated attribute names of `name`.
    pub async fn list(&self, name: &str, size: u32) -> FsResult<XattrReply> {
        if self.table.contains(name) {
            return sized(Vec::new(), size);
        }
        let record = self
            .store
            .find_metadata(name)
            .await?
            .ok_or(FsError::NotFound)?;

        let mut payload = Vec::new();
        for field in record.attributes.keys() {
            payload.extend_from_slice(namespace_xattr(field).as_bytes());
            payload.push(0);
        }
        sized(payload, size)
    }

    /// String form of the field, NUL-terminated.
    pub async fn get(&self, name: &str, attr: &str, size: u32) -> FsResult<XattrReply> {
        let field = unnamespace_xattr(attr).ok_or(FsError::NoAttribute)?;
        if self.table.contains(name) {
            return Err(FsError::NoAttribute);
        }
        let record = self
            .store
            .find_metadata(name)
            .await?
            .ok_or(FsError::NotFound)?;
        let value = record.attributes.get(field).ok_or(FsError::NoAttribute)?;
        let mut payload = attribute_string(value).into_bytes();
        payload.push(0);
        sized(payload, size)
    }

    /// Attributes are sourced from the store and cannot be written.
    pub fn set(&self) -> FsResult<()> {
        Err(FsError::Unsupported)
    }
}
