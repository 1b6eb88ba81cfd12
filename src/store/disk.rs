use super::KeyValue;
use anyhow::{Context, Result};
use fjall::{Keyspace, PartitionCreateOptions, PartitionHandle};
use std::path::Path;
use tracing::debug;

/// Persistent store implementation backed by a fjall partition.
pub struct DiskStore {
    // Keeps the journal alive for the lifetime of the partition.
    _keyspace: Keyspace,
    partition: PartitionHandle,
}

impl DiskStore {
    pub fn open(path: &Path, partition_name: &str) -> Result<Self> {
        std::fs::create_dir_all(path)
            .with_context(|| format!("Failed to create store directory: {}", path.display()))?;

        let keyspace = fjall::Config::new(path)
            .open()
            .with_context(|| format!("Failed to open keyspace at {}", path.display()))?;
        let partition =
            keyspace.open_partition(partition_name, PartitionCreateOptions::default())?;

        Ok(Self {
            _keyspace: keyspace,
            partition,
        })
    }
}

impl KeyValue for DiskStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self
            .partition
            .get(key)?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    fn put(&self, key: &str, value: &str) -> Result<()> {
        self.partition.insert(key, value)?;
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.partition.remove(key)?;
        Ok(())
    }

    fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        for item in self.partition.prefix(prefix) {
            match item {
                Ok((key, _)) => keys.push(String::from_utf8_lossy(&key).into_owned()),
                // A broken entry must not abort the rest of the scan.
                Err(e) => debug!("Skipping unreadable entry during prefix scan: {e}"),
            }
        }
        Ok(keys)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_store_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path(), "test").unwrap();

        assert!(store.get("key1").unwrap().is_none());

        store.put("key1", "value1").unwrap();
        assert_eq!(store.get("key1").unwrap(), Some("value1".to_string()));

        store.remove("key1").unwrap();
        assert!(store.get("key1").unwrap().is_none());
    }

    #[test]
    fn test_disk_store_prefix_scan() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::open(dir.path(), "test").unwrap();

        store.put("ns_cache_crypto:a", "1").unwrap();
        store.put("ns_cache_news:b", "2").unwrap();
        store.put("ns_quota", "3").unwrap();

        let mut keys = store.keys_with_prefix("ns_cache_").unwrap();
        keys.sort();
        assert_eq!(keys, vec!["ns_cache_crypto:a", "ns_cache_news:b"]);

        let keys = store.keys_with_prefix("ns_cache_crypto").unwrap();
        assert_eq!(keys, vec!["ns_cache_crypto:a"]);
    }
}
