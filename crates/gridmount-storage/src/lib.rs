//! gridmount-storage: chunked object store (metadata records + numbered
//! chunk records) laid out over an OpenDAL operator

pub mod health;
pub mod operator;
pub mod store;

pub use health::check_health;
pub use operator::{build_operator, memory_operator, StorageConfig};
pub use store::{ChunkStore, GridStore, StoreError, StoreResult};
