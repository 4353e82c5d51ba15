// Storage layer module: string-keyed JSON blobs
pub mod memory_storage;
pub mod sqlite_storage;

pub use memory_storage::MemoryKv;
pub use sqlite_storage::SqliteKv;

use crate::types::Result;

/// Get/set-by-key persistence. Values are JSON documents; callers own their
/// shape.
pub trait KvStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    fn remove(&mut self, key: &str) -> Result<()>;
}
