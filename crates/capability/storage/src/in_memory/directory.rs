//! 设备 → 网关实例目录内存实现（单实例部署）。

use crate::error::StorageError;
use crate::models::DirectoryEntry;
use crate::traits::GatewayDirectory;
use std::collections::HashMap;
use std::sync::RwLock;

pub struct InMemoryGatewayDirectory {
    owners: RwLock<HashMap<String, DirectoryEntry>>,
}

impl InMemoryGatewayDirectory {
    pub fn new() -> Self {
        Self {
            owners: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryGatewayDirectory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl GatewayDirectory for InMemoryGatewayDirectory {
    async fn bind(
        &self,
        device_id: &str,
        server_id: &str,
        session_id: &str,
    ) -> Result<(), StorageError> {
        let mut map = self
            .owners
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        map.insert(
            device_id.to_string(),
            DirectoryEntry {
                server_id: server_id.to_string(),
                session_id: session_id.to_string(),
            },
        );
        Ok(())
    }

    async fn owner(&self, device_id: &str) -> Result<Option<String>, StorageError> {
        let map = self
            .owners
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.get(device_id).map(|entry| entry.server_id.clone()))
    }

    async fn unbind_if_owner(
        &self,
        device_id: &str,
        server_id: &str,
        session_id: &str,
    ) -> Result<bool, StorageError> {
        let mut map = self
            .owners
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        match map.get(device_id) {
            Some(entry) if entry.server_id == server_id && entry.session_id == session_id => {
                map.remove(device_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}
