use crate::{CreateOtaTask, OtaCommandSender, OtaError};
use domain::{
    DeviceMessage, MessageDirection, OtaProgress, OtaRecordStatus, OtaTaskStatus, method,
    now_epoch_ms,
};
use iot_storage::{
    DeviceRecord, DeviceStore, DeviceUpdate, OtaDeviceScope, OtaFirmwareRecord, OtaFirmwareStore,
    OtaRecordProgress, OtaTask, OtaTaskRecord, OtaTaskRecordStore, OtaTaskStore,
};
use iot_telemetry::record_ota_progress_update;
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{info, warn};

const CANCEL_DESCRIPTION: &str = "task canceled";

/// OTA 任务服务。
pub struct OtaService {
    firmwares: Arc<dyn OtaFirmwareStore>,
    tasks: Arc<dyn OtaTaskStore>,
    records: Arc<dyn OtaTaskRecordStore>,
    devices: Arc<dyn DeviceStore>,
}

impl OtaService {
    pub fn new(
        firmwares: Arc<dyn OtaFirmwareStore>,
        tasks: Arc<dyn OtaTaskStore>,
        records: Arc<dyn OtaTaskRecordStore>,
        devices: Arc<dyn DeviceStore>,
    ) -> Self {
        Self {
            firmwares,
            tasks,
            records,
            devices,
        }
    }

    /// 创建任务：任务与全部记录均为 `Wait`，记录进度为 0。
    pub async fn create(&self, request: CreateOtaTask) -> Result<OtaTask, OtaError> {
        if request.name.trim().is_empty() {
            return Err(OtaError::InvalidRequest("name is required".to_string()));
        }
        let firmware = self.require_firmware(&request.firmware_id).await?;
        let devices = self.resolve_devices(&firmware, &request).await?;
        if devices.is_empty() {
            return Err(OtaError::NoDevices);
        }

        let now_ms = now_epoch_ms();
        let task = OtaTask {
            task_id: uuid::Uuid::new_v4().to_string(),
            tenant_id: firmware.tenant_id.clone(),
            name: request.name.trim().to_string(),
            firmware_id: firmware.firmware_id.clone(),
            status: OtaTaskStatus::Wait,
            device_scope: request.device_scope,
            total_count: devices.len() as i32,
            success_count: 0,
            created_at_ms: now_ms,
        };
        let task = self.tasks.create_task(task).await?;
        let records = devices
            .iter()
            .map(|device| OtaTaskRecord {
                record_id: uuid::Uuid::new_v4().to_string(),
                task_id: task.task_id.clone(),
                tenant_id: task.tenant_id.clone(),
                device_id: device.device_id.clone(),
                firmware_id: firmware.firmware_id.clone(),
                from_firmware_id: device.firmware_id.clone(),
                status: OtaRecordStatus::Wait,
                progress: 0,
                description: None,
                created_at_ms: now_ms,
                updated_at_ms: now_ms,
            })
            .collect();
        self.records.create_records(records).await?;
        info!(
            target: "iot.ota",
            task_id = %task.task_id,
            firmware_id = %task.firmware_id,
            total_count = task.total_count,
            "ota_task_created"
        );
        Ok(task)
    }

    /// 取消任务（仅 `Wait`），未终结记录置为 Failed。
    pub async fn cancel(&self, task_id: &str) -> Result<OtaTask, OtaError> {
        let task = self.get_task(task_id).await?;
        if task.status != OtaTaskStatus::Wait {
            return Err(OtaError::StatusNotAllowCancel {
                task_id: task_id.to_string(),
                status: task.status,
            });
        }
        let moved = self
            .tasks
            .transition_task_status(task_id, OtaTaskStatus::Wait, OtaTaskStatus::Cancel)
            .await?;
        if !moved {
            let current = self.get_task(task_id).await?;
            return Err(OtaError::StatusNotAllowCancel {
                task_id: task_id.to_string(),
                status: current.status,
            });
        }
        let failed = self
            .records
            .fail_open_records(task_id, CANCEL_DESCRIPTION, now_epoch_ms())
            .await?;
        info!(target: "iot.ota", task_id = %task_id, failed_records = failed, "ota_task_canceled");
        self.get_task(task_id).await
    }

    pub async fn get_task(&self, task_id: &str) -> Result<OtaTask, OtaError> {
        self.tasks
            .find_task(task_id)
            .await?
            .ok_or_else(|| OtaError::TaskNotExists(task_id.to_string()))
    }

    pub async fn list_records(&self, task_id: &str) -> Result<Vec<OtaTaskRecord>, OtaError> {
        self.get_task(task_id).await?;
        Ok(self.records.list_records_by_task(task_id).await?)
    }

    /// 设备上报升级进度。
    ///
    /// 取设备最早创建的未终结记录；版本不一致只记日志。
    /// 写入以记录仍未终结为条件，选中后被并发上报或取消终结的记录返回 `RecordNotExists`。
    /// 成功时推进设备固件，随后检查所属任务是否全部终结。
    pub async fn update_ota_record_progress(
        &self,
        device: &DeviceRecord,
        report: &OtaProgress,
    ) -> Result<OtaTaskRecord, OtaError> {
        let record = self
            .records
            .list_open_records_by_device(&device.device_id)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| OtaError::RecordNotExists(device.device_id.clone()))?;

        if let Some(version) = report.version.as_deref() {
            match self.firmwares.find_firmware(&record.firmware_id).await {
                Ok(Some(firmware)) if firmware.version != version => {
                    warn!(
                        target: "iot.ota",
                        device_id = %device.device_id,
                        record_id = %record.record_id,
                        reported = %version,
                        expected = %firmware.version,
                        "ota_version_mismatch"
                    );
                }
                Ok(_) => {}
                Err(err) => {
                    warn!(target: "iot.ota", record_id = %record.record_id, error = %err, "ota_firmware_lookup_failed");
                }
            }
        }

        let progress = match (report.progress, report.status) {
            (Some(progress), _) => progress,
            (None, OtaRecordStatus::Success) => 100,
            (None, _) => record.progress,
        };
        let updated = self
            .records
            .update_record_progress(
                &record.record_id,
                OtaRecordProgress {
                    status: report.status,
                    progress,
                    description: report.description.clone(),
                    updated_at_ms: now_epoch_ms(),
                },
            )
            .await?;
        let Some(updated) = updated else {
            warn!(
                target: "iot.ota",
                device_id = %device.device_id,
                record_id = %record.record_id,
                status = ?report.status,
                "ota_record_already_terminal"
            );
            return Err(OtaError::RecordNotExists(device.device_id.clone()));
        };
        record_ota_progress_update();
        info!(
            target: "iot.ota",
            device_id = %device.device_id,
            record_id = %updated.record_id,
            status = ?updated.status,
            progress = updated.progress,
            "ota_record_progress_updated"
        );

        if updated.status == OtaRecordStatus::Success {
            let update = DeviceUpdate {
                firmware_id: Some(updated.firmware_id.clone()),
                ..Default::default()
            };
            match self.devices.update_device(&device.device_id, update).await {
                Ok(_) => info!(
                    target: "iot.ota",
                    device_id = %device.device_id,
                    firmware_id = %updated.firmware_id,
                    "device_firmware_advanced"
                ),
                Err(err) => warn!(
                    target: "iot.ota",
                    device_id = %device.device_id,
                    error = %err,
                    "device_firmware_update_failed"
                ),
            }
        }

        self.refresh_task(&updated.task_id).await?;
        Ok(updated)
    }

    /// 向仍处于 `Wait` 的记录逐个下发 `thing.ota.upgrade`，返回发送成功数。
    pub async fn push_task(
        &self,
        task_id: &str,
        sender: &dyn OtaCommandSender,
    ) -> Result<usize, OtaError> {
        let task = self.get_task(task_id).await?;
        if task.status != OtaTaskStatus::Wait {
            return Err(OtaError::StatusNotAllowPush {
                task_id: task_id.to_string(),
                status: task.status,
            });
        }
        let firmware = self.require_firmware(&task.firmware_id).await?;
        let params = upgrade_params(&firmware);
        let records = self.records.list_records_by_task(task_id).await?;

        let mut sent = 0usize;
        let mut failed = 0usize;
        for record in records
            .iter()
            .filter(|record| record.status == OtaRecordStatus::Wait)
        {
            let id = uuid::Uuid::new_v4().to_string();
            let message = DeviceMessage {
                request_id: id.clone(),
                id,
                method: method::OTA_UPGRADE.to_string(),
                params: Some(params.clone()),
                device_id: record.device_id.clone(),
                tenant_id: record.tenant_id.clone(),
                report_time_ms: now_epoch_ms(),
                direction: MessageDirection::Downstream,
                ..Default::default()
            };
            match sender.send_upgrade(message).await {
                Ok(()) => sent += 1,
                Err(err) => {
                    failed += 1;
                    warn!(
                        target: "iot.ota",
                        task_id = %task_id,
                        device_id = %record.device_id,
                        error = %err,
                        "ota_upgrade_push_failed"
                    );
                }
            }
        }
        info!(target: "iot.ota", task_id = %task_id, sent, failed, "ota_task_pushed");
        Ok(sent)
    }

    /// 任务下没有未终结记录时置为 `Done` 并回写成功数。
    async fn refresh_task(&self, task_id: &str) -> Result<(), OtaError> {
        let records = self.records.list_records_by_task(task_id).await?;
        if records.iter().any(|record| !record.status.is_terminal()) {
            return Ok(());
        }
        let success = records
            .iter()
            .filter(|record| record.status == OtaRecordStatus::Success)
            .count() as i32;
        self.tasks
            .update_task_counts(task_id, records.len() as i32, success)
            .await?;
        let done = self
            .tasks
            .transition_task_status(task_id, OtaTaskStatus::Wait, OtaTaskStatus::Done)
            .await?;
        if done {
            info!(
                target: "iot.ota",
                task_id = %task_id,
                success_count = success,
                total_count = records.len(),
                "ota_task_done"
            );
        }
        Ok(())
    }

    async fn require_firmware(&self, firmware_id: &str) -> Result<OtaFirmwareRecord, OtaError> {
        self.firmwares
            .find_firmware(firmware_id)
            .await?
            .ok_or_else(|| OtaError::FirmwareNotExists(firmware_id.to_string()))
    }

    async fn resolve_devices(
        &self,
        firmware: &OtaFirmwareRecord,
        request: &CreateOtaTask,
    ) -> Result<Vec<DeviceRecord>, OtaError> {
        match request.device_scope {
            OtaDeviceScope::All => Ok(self
                .devices
                .list_by_product_key(&firmware.product_key)
                .await?),
            OtaDeviceScope::Select => {
                let mut seen = HashSet::new();
                let mut devices = Vec::new();
                for device_id in &request.device_ids {
                    if !seen.insert(device_id.as_str()) {
                        continue;
                    }
                    match self.devices.find_device(device_id).await? {
                        Some(device) if device.product_key == firmware.product_key => {
                            devices.push(device)
                        }
                        Some(_) => warn!(
                            target: "iot.ota",
                            device_id = %device_id,
                            product_key = %firmware.product_key,
                            "ota_device_product_mismatch"
                        ),
                        None => {
                            warn!(target: "iot.ota", device_id = %device_id, "ota_device_not_found")
                        }
                    }
                }
                Ok(devices)
            }
        }
    }
}

/// 升级指令参数 `{version, fileUrl, fileSize, fileDigestAlgorithm, fileDigestValue}`。
pub fn upgrade_params(firmware: &OtaFirmwareRecord) -> Map<String, Value> {
    let mut params = Map::new();
    params.insert("version".to_string(), Value::from(firmware.version.clone()));
    params.insert("fileUrl".to_string(), Value::from(firmware.file_url.clone()));
    params.insert("fileSize".to_string(), Value::from(firmware.file_size));
    params.insert(
        "fileDigestAlgorithm".to_string(),
        Value::from(firmware.file_digest_algorithm.clone()),
    );
    params.insert(
        "fileDigestValue".to_string(),
        Value::from(firmware.file_digest_value.clone()),
    );
    params
}
