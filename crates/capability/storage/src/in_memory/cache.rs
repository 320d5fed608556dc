//! 带 TTL 的内存 KV 缓存（未配置 Redis 时使用）。

use crate::error::StorageError;
use crate::traits::KvCache;
use std::collections::HashMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

struct Entry {
    value: String,
    expires_at: Instant,
}

pub struct InMemoryKvCache {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryKvCache {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryKvCache {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl KvCache for InMemoryKvCache {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError> {
        let map = self
            .entries
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map
            .get(key)
            .filter(|entry| entry.expires_at > Instant::now())
            .map(|entry| entry.value.clone()))
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), StorageError> {
        let mut map = self
            .entries
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let now = Instant::now();
        map.retain(|_, entry| entry.expires_at > now);
        map.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + Duration::from_secs(ttl_seconds.max(1)),
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut map = self
            .entries
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.remove(key);
        Ok(())
    }
}
