//! OTA 固件、任务与升级记录内存实现

use crate::error::StorageError;
use crate::models::{OtaFirmwareRecord, OtaRecordProgress, OtaTask, OtaTaskRecord};
use crate::traits::{OtaFirmwareStore, OtaTaskRecordStore, OtaTaskStore};
use domain::{OtaRecordStatus, OtaTaskStatus};
use std::collections::HashMap;
use std::sync::RwLock;

pub struct InMemoryOtaFirmwareStore {
    firmwares: RwLock<HashMap<String, OtaFirmwareRecord>>,
}

impl InMemoryOtaFirmwareStore {
    pub fn new() -> Self {
        Self {
            firmwares: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryOtaFirmwareStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl OtaFirmwareStore for InMemoryOtaFirmwareStore {
    async fn find_firmware(
        &self,
        firmware_id: &str,
    ) -> Result<Option<OtaFirmwareRecord>, StorageError> {
        let map = self
            .firmwares
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.get(firmware_id).cloned())
    }

    async fn create_firmware(
        &self,
        record: OtaFirmwareRecord,
    ) -> Result<OtaFirmwareRecord, StorageError> {
        let mut map = self
            .firmwares
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if map.contains_key(&record.firmware_id) {
            return Err(StorageError::new("firmware exists"));
        }
        map.insert(record.firmware_id.clone(), record.clone());
        Ok(record)
    }
}

pub struct InMemoryOtaTaskStore {
    tasks: RwLock<HashMap<String, OtaTask>>,
}

impl InMemoryOtaTaskStore {
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryOtaTaskStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl OtaTaskStore for InMemoryOtaTaskStore {
    async fn create_task(&self, task: OtaTask) -> Result<OtaTask, StorageError> {
        let mut map = self
            .tasks
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if map.contains_key(&task.task_id) {
            return Err(StorageError::new("task exists"));
        }
        map.insert(task.task_id.clone(), task.clone());
        Ok(task)
    }

    async fn find_task(&self, task_id: &str) -> Result<Option<OtaTask>, StorageError> {
        let map = self
            .tasks
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        Ok(map.get(task_id).cloned())
    }

    async fn transition_task_status(
        &self,
        task_id: &str,
        from: OtaTaskStatus,
        to: OtaTaskStatus,
    ) -> Result<bool, StorageError> {
        let mut map = self
            .tasks
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        match map.get_mut(task_id) {
            Some(task) if task.status == from => {
                task.status = to;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn update_task_counts(
        &self,
        task_id: &str,
        total_count: i32,
        success_count: i32,
    ) -> Result<(), StorageError> {
        let mut map = self
            .tasks
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if let Some(task) = map.get_mut(task_id) {
            task.total_count = total_count;
            task.success_count = success_count;
        }
        Ok(())
    }
}

pub struct InMemoryOtaTaskRecordStore {
    records: RwLock<HashMap<String, OtaTaskRecord>>,
}

impl InMemoryOtaTaskRecordStore {
    pub fn new() -> Self {
        Self {
            records: RwLock::new(HashMap::new()),
        }
    }
}

impl Default for InMemoryOtaTaskRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

fn sort_by_creation(items: &mut [OtaTaskRecord]) {
    items.sort_by(|a, b| {
        a.created_at_ms
            .cmp(&b.created_at_ms)
            .then_with(|| a.record_id.cmp(&b.record_id))
    });
}

#[async_trait::async_trait]
impl OtaTaskRecordStore for InMemoryOtaTaskRecordStore {
    async fn create_records(&self, records: Vec<OtaTaskRecord>) -> Result<(), StorageError> {
        let mut map = self
            .records
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        if records.iter().any(|record| map.contains_key(&record.record_id)) {
            return Err(StorageError::new("record exists"));
        }
        for record in records {
            map.insert(record.record_id.clone(), record);
        }
        Ok(())
    }

    async fn list_records_by_task(
        &self,
        task_id: &str,
    ) -> Result<Vec<OtaTaskRecord>, StorageError> {
        let map = self
            .records
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<OtaTaskRecord> = map
            .values()
            .filter(|item| item.task_id == task_id)
            .cloned()
            .collect();
        sort_by_creation(&mut items);
        Ok(items)
    }

    async fn list_open_records_by_device(
        &self,
        device_id: &str,
    ) -> Result<Vec<OtaTaskRecord>, StorageError> {
        let map = self
            .records
            .read()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut items: Vec<OtaTaskRecord> = map
            .values()
            .filter(|item| item.device_id == device_id && !item.status.is_terminal())
            .cloned()
            .collect();
        sort_by_creation(&mut items);
        Ok(items)
    }

    async fn update_record_progress(
        &self,
        record_id: &str,
        progress: OtaRecordProgress,
    ) -> Result<Option<OtaTaskRecord>, StorageError> {
        let mut map = self
            .records
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let Some(record) = map
            .get_mut(record_id)
            .filter(|record| !record.status.is_terminal())
        else {
            return Ok(None);
        };
        record.status = progress.status;
        record.progress = progress.progress;
        record.description = progress.description;
        record.updated_at_ms = progress.updated_at_ms;
        Ok(Some(record.clone()))
    }

    async fn fail_open_records(
        &self,
        task_id: &str,
        description: &str,
        updated_at_ms: i64,
    ) -> Result<u64, StorageError> {
        let mut map = self
            .records
            .write()
            .map_err(|_| StorageError::new("lock failed"))?;
        let mut affected = 0;
        for record in map
            .values_mut()
            .filter(|item| item.task_id == task_id && !item.status.is_terminal())
        {
            record.status = OtaRecordStatus::Failed;
            record.description = Some(description.to_string());
            record.updated_at_ms = updated_at_ms;
            affected += 1;
        }
        Ok(affected)
    }
}
