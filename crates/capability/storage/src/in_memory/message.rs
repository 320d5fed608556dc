//! 设备消息审计内存实现

use crate::error::StorageError;
use crate::models::DeviceMessageRecord;
use crate::traits::DeviceMessageStore;
use std::sync::RwLock;

pub struct InMemoryDeviceMessageStore {
    rows: RwLock<Vec<DeviceMessageRecord>>,
}

impl InMemoryDeviceMessageStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryDeviceMessageStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DeviceMessageStore for InMemoryDeviceMessageStore {
    async fn append_message(&self, record: DeviceMessageRecord) -> Result<(), StorageError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        rows.push(record);
        Ok(())
    }

    async fn list_device_messages(
        &self,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<DeviceMessageRecord>, StorageError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<DeviceMessageRecord> = rows
            .iter()
            .rev()
            .filter(|item| item.device_id == device_id)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.report_time_ms.cmp(&a.report_time_ms));
        items.truncate(limit.max(0) as usize);
        Ok(items)
    }
}
