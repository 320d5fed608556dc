//! 设备属性历史内存实现

use crate::error::StorageError;
use crate::models::DevicePropertyRecord;
use crate::traits::DevicePropertyStore;
use std::sync::RwLock;

pub struct InMemoryDevicePropertyStore {
    rows: RwLock<Vec<DevicePropertyRecord>>,
}

impl InMemoryDevicePropertyStore {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
        }
    }
}

impl Default for InMemoryDevicePropertyStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl DevicePropertyStore for InMemoryDevicePropertyStore {
    async fn append_properties(
        &self,
        records: Vec<DevicePropertyRecord>,
    ) -> Result<(), StorageError> {
        let mut rows = self
            .rows
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        rows.extend(records);
        Ok(())
    }

    async fn list_property_history(
        &self,
        device_id: &str,
        identifier: &str,
    ) -> Result<Vec<DevicePropertyRecord>, StorageError> {
        let rows = self
            .rows
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        // 同一时间戳保持追加顺序的逆序
        let mut items: Vec<DevicePropertyRecord> = rows
            .iter()
            .rev()
            .filter(|item| item.device_id == device_id && item.identifier == identifier)
            .cloned()
            .collect();
        items.sort_by(|a, b| b.report_time_ms.cmp(&a.report_time_ms));
        Ok(items)
    }
}
