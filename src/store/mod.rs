pub mod disk;
pub mod memory;

pub use disk::DiskStore;
pub use memory::MemoryStore;

use anyhow::Result;

/// A thread-safe string key-value store backing all persisted core state:
/// quota counters, rotation cursors and cache entries.
///
/// Values are JSON strings; key namespacing is the caller's concern.
pub trait KeyValue: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn put(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// Returns every stored key starting with `prefix`, in no particular
    /// order. Used for prefix invalidation sweeps.
    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>>;
}
