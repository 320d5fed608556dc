use async_trait::async_trait;
use domain::{DeviceMessage, DeviceState, OtaProgress, OtaRecordStatus, OtaTaskStatus, method};
use iot_ota::{CreateOtaTask, OtaCommandSender, OtaError, OtaService};
use iot_storage::{
    DeviceRecord, DeviceStore, InMemoryDeviceStore, InMemoryOtaFirmwareStore,
    InMemoryOtaTaskRecordStore, InMemoryOtaTaskStore, OtaDeviceScope, OtaFirmwareRecord,
    OtaFirmwareStore, OtaRecordProgress, OtaTaskRecord, OtaTaskRecordStore, StorageError,
};
use serde_json::json;
use std::sync::{Arc, Mutex};

fn device(device_id: &str, product_key: &str) -> DeviceRecord {
    DeviceRecord {
        device_id: device_id.to_string(),
        tenant_id: "tenant-1".to_string(),
        product_key: product_key.to_string(),
        device_name: device_id.to_string(),
        device_secret: "s3cr3t".to_string(),
        state: DeviceState::Online,
        firmware_id: Some("fw-1".to_string()),
    }
}

fn firmware() -> OtaFirmwareRecord {
    OtaFirmwareRecord {
        firmware_id: "fw-2".to_string(),
        tenant_id: "tenant-1".to_string(),
        product_key: "prodX".to_string(),
        version: "2.0.0".to_string(),
        file_url: "https://files.example.com/fw-2.bin".to_string(),
        file_size: 1024,
        file_digest_algorithm: "MD5".to_string(),
        file_digest_value: "abc123".to_string(),
    }
}

struct Fixture {
    service: OtaService,
    devices: Arc<InMemoryDeviceStore>,
}

async fn fixture() -> Fixture {
    let devices = Arc::new(InMemoryDeviceStore::with_devices(vec![
        device("dev-1", "prodX"),
        device("dev-2", "prodX"),
        device("dev-3", "prodY"),
    ]));
    let firmwares = Arc::new(InMemoryOtaFirmwareStore::new());
    firmwares
        .create_firmware(firmware())
        .await
        .expect("firmware");
    let service = OtaService::new(
        firmwares,
        Arc::new(InMemoryOtaTaskStore::new()),
        Arc::new(InMemoryOtaTaskRecordStore::new()),
        devices.clone(),
    );
    Fixture { service, devices }
}

fn select(device_ids: &[&str]) -> CreateOtaTask {
    CreateOtaTask {
        name: "upgrade to 2.0.0".to_string(),
        firmware_id: "fw-2".to_string(),
        device_scope: OtaDeviceScope::Select,
        device_ids: device_ids.iter().map(|id| id.to_string()).collect(),
    }
}

fn report(status: OtaRecordStatus) -> OtaProgress {
    OtaProgress {
        version: Some("2.0.0".to_string()),
        status,
        progress: None,
        description: None,
    }
}

#[derive(Default)]
struct RecordingSender {
    sent: Mutex<Vec<DeviceMessage>>,
}

#[async_trait]
impl OtaCommandSender for RecordingSender {
    async fn send_upgrade(&self, message: DeviceMessage) -> Result<(), OtaError> {
        self.sent.lock().expect("lock").push(message);
        Ok(())
    }
}

#[tokio::test]
async fn create_seeds_wait_records() {
    let fixture = fixture().await;
    let task = fixture
        .service
        .create(select(&["dev-1", "dev-2", "dev-1"]))
        .await
        .expect("create");
    assert_eq!(task.status, OtaTaskStatus::Wait);
    assert_eq!(task.total_count, 2);

    let records = fixture
        .service
        .list_records(&task.task_id)
        .await
        .expect("records");
    assert_eq!(records.len(), 2);
    assert!(records.iter().all(|record| {
        record.status == OtaRecordStatus::Wait
            && record.progress == 0
            && record.firmware_id == "fw-2"
            && record.from_firmware_id.as_deref() == Some("fw-1")
    }));
}

#[tokio::test]
async fn create_validates_firmware_and_devices() {
    let fixture = fixture().await;
    let mut missing = select(&["dev-1"]);
    missing.firmware_id = "fw-404".to_string();
    assert!(matches!(
        fixture.service.create(missing).await,
        Err(OtaError::FirmwareNotExists(id)) if id == "fw-404"
    ));
    // 其他产品的设备与未知设备都被跳过
    assert!(matches!(
        fixture.service.create(select(&["dev-3", "ghost"])).await,
        Err(OtaError::NoDevices)
    ));
}

#[tokio::test]
async fn all_scope_targets_firmware_product() {
    let fixture = fixture().await;
    let task = fixture
        .service
        .create(CreateOtaTask {
            name: "all".to_string(),
            firmware_id: "fw-2".to_string(),
            device_scope: OtaDeviceScope::All,
            device_ids: Vec::new(),
        })
        .await
        .expect("create");
    assert_eq!(task.total_count, 2);
}

#[tokio::test]
async fn success_advances_firmware_and_completes_task() {
    let fixture = fixture().await;
    let task = fixture
        .service
        .create(select(&["dev-1", "dev-2"]))
        .await
        .expect("create");
    let dev1 = device("dev-1", "prodX");
    let dev2 = device("dev-2", "prodX");

    let record = fixture
        .service
        .update_ota_record_progress(&dev1, &report(OtaRecordStatus::Upgrading))
        .await
        .expect("upgrading");
    assert_eq!(record.status, OtaRecordStatus::Upgrading);

    let record = fixture
        .service
        .update_ota_record_progress(&dev1, &report(OtaRecordStatus::Success))
        .await
        .expect("success");
    assert_eq!(record.progress, 100);
    let stored = fixture
        .devices
        .find_device("dev-1")
        .await
        .expect("find")
        .expect("device");
    assert_eq!(stored.firmware_id.as_deref(), Some("fw-2"));
    assert_eq!(
        fixture.service.get_task(&task.task_id).await.expect("task").status,
        OtaTaskStatus::Wait
    );

    fixture
        .service
        .update_ota_record_progress(&dev2, &report(OtaRecordStatus::Failed))
        .await
        .expect("failed");
    let task = fixture.service.get_task(&task.task_id).await.expect("task");
    assert_eq!(task.status, OtaTaskStatus::Done);
    assert_eq!(task.success_count, 1);
    assert_eq!(task.total_count, 2);

    assert!(matches!(
        fixture
            .service
            .update_ota_record_progress(&dev1, &report(OtaRecordStatus::Success))
            .await,
        Err(OtaError::RecordNotExists(_))
    ));
}

#[tokio::test]
async fn version_mismatch_is_not_fatal() {
    let fixture = fixture().await;
    fixture
        .service
        .create(select(&["dev-1"]))
        .await
        .expect("create");
    let mut mismatched = report(OtaRecordStatus::Pushed);
    mismatched.version = Some("9.9.9".to_string());
    mismatched.progress = Some(10);
    let record = fixture
        .service
        .update_ota_record_progress(&device("dev-1", "prodX"), &mismatched)
        .await
        .expect("progress");
    assert_eq!(record.status, OtaRecordStatus::Pushed);
    assert_eq!(record.progress, 10);
}

#[tokio::test]
async fn earliest_open_record_is_selected() {
    let fixture = fixture().await;
    let first = fixture
        .service
        .create(select(&["dev-1"]))
        .await
        .expect("first");
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    let second = fixture
        .service
        .create(select(&["dev-1"]))
        .await
        .expect("second");

    let record = fixture
        .service
        .update_ota_record_progress(&device("dev-1", "prodX"), &report(OtaRecordStatus::Success))
        .await
        .expect("progress");
    assert_eq!(record.task_id, first.task_id);
    assert_eq!(
        fixture.service.get_task(&second.task_id).await.expect("task").status,
        OtaTaskStatus::Wait
    );
}

#[tokio::test]
async fn cancel_only_from_wait() {
    let fixture = fixture().await;
    let task = fixture
        .service
        .create(select(&["dev-1", "dev-2"]))
        .await
        .expect("create");

    let canceled = fixture.service.cancel(&task.task_id).await.expect("cancel");
    assert_eq!(canceled.status, OtaTaskStatus::Cancel);
    let records = fixture
        .service
        .list_records(&task.task_id)
        .await
        .expect("records");
    assert!(records.iter().all(|record| {
        record.status == OtaRecordStatus::Failed
            && record.description.as_deref() == Some("task canceled")
    }));

    assert!(matches!(
        fixture.service.cancel(&task.task_id).await,
        Err(OtaError::StatusNotAllowCancel { status: OtaTaskStatus::Cancel, .. })
    ));
    assert!(matches!(
        fixture.service.cancel("missing").await,
        Err(OtaError::TaskNotExists(_))
    ));
}

#[tokio::test]
async fn cancel_done_task_is_rejected() {
    let fixture = fixture().await;
    let task = fixture
        .service
        .create(select(&["dev-1"]))
        .await
        .expect("create");
    fixture
        .service
        .update_ota_record_progress(&device("dev-1", "prodX"), &report(OtaRecordStatus::Success))
        .await
        .expect("success");

    assert!(matches!(
        fixture.service.cancel(&task.task_id).await,
        Err(OtaError::StatusNotAllowCancel { status: OtaTaskStatus::Done, .. })
    ));
    assert_eq!(
        fixture.service.get_task(&task.task_id).await.expect("task").status,
        OtaTaskStatus::Done
    );
}

#[tokio::test]
async fn push_sends_upgrade_to_waiting_records() {
    let fixture = fixture().await;
    let task = fixture
        .service
        .create(select(&["dev-1", "dev-2"]))
        .await
        .expect("create");
    fixture
        .service
        .update_ota_record_progress(&device("dev-2", "prodX"), &report(OtaRecordStatus::Pushed))
        .await
        .expect("pushed");

    let sender = RecordingSender::default();
    let sent = fixture
        .service
        .push_task(&task.task_id, &sender)
        .await
        .expect("push");
    assert_eq!(sent, 1);

    let messages = sender.sent.lock().expect("lock").clone();
    assert_eq!(messages[0].device_id, "dev-1");
    assert_eq!(messages[0].method, method::OTA_UPGRADE);
    let params = messages[0].params.as_ref().expect("params");
    assert_eq!(params.get("version"), Some(&json!("2.0.0")));
    assert_eq!(params.get("fileSize"), Some(&json!(1024)));
    assert_eq!(params.get("fileDigestAlgorithm"), Some(&json!("MD5")));
}

/// 第一次查询后始终返回同一份未终结记录快照，模拟并发上报读到的旧数据。
struct StaleOpenRecords {
    inner: InMemoryOtaTaskRecordStore,
    snapshot: Mutex<Option<Vec<OtaTaskRecord>>>,
}

#[async_trait]
impl OtaTaskRecordStore for StaleOpenRecords {
    async fn create_records(&self, records: Vec<OtaTaskRecord>) -> Result<(), StorageError> {
        self.inner.create_records(records).await
    }

    async fn list_records_by_task(
        &self,
        task_id: &str,
    ) -> Result<Vec<OtaTaskRecord>, StorageError> {
        self.inner.list_records_by_task(task_id).await
    }

    async fn list_open_records_by_device(
        &self,
        device_id: &str,
    ) -> Result<Vec<OtaTaskRecord>, StorageError> {
        if let Some(snapshot) = self.snapshot.lock().expect("lock").clone() {
            return Ok(snapshot);
        }
        let open = self.inner.list_open_records_by_device(device_id).await?;
        *self.snapshot.lock().expect("lock") = Some(open.clone());
        Ok(open)
    }

    async fn update_record_progress(
        &self,
        record_id: &str,
        progress: OtaRecordProgress,
    ) -> Result<Option<OtaTaskRecord>, StorageError> {
        self.inner.update_record_progress(record_id, progress).await
    }

    async fn fail_open_records(
        &self,
        task_id: &str,
        description: &str,
        updated_at_ms: i64,
    ) -> Result<u64, StorageError> {
        self.inner
            .fail_open_records(task_id, description, updated_at_ms)
            .await
    }
}

#[tokio::test]
async fn late_report_cannot_reopen_terminal_record() {
    let devices = Arc::new(InMemoryDeviceStore::with_devices(vec![device("dev-1", "prodX")]));
    let firmwares = Arc::new(InMemoryOtaFirmwareStore::new());
    firmwares
        .create_firmware(firmware())
        .await
        .expect("firmware");
    let records = Arc::new(StaleOpenRecords {
        inner: InMemoryOtaTaskRecordStore::new(),
        snapshot: Mutex::new(None),
    });
    let service = OtaService::new(
        firmwares,
        Arc::new(InMemoryOtaTaskStore::new()),
        records.clone(),
        devices,
    );
    let task = service.create(select(&["dev-1"])).await.expect("create");
    let dev1 = device("dev-1", "prodX");

    service
        .update_ota_record_progress(&dev1, &report(OtaRecordStatus::Success))
        .await
        .expect("success");
    // 旧快照仍把已成功的记录当作未终结
    let late = service
        .update_ota_record_progress(&dev1, &report(OtaRecordStatus::Upgrading))
        .await;
    assert!(matches!(late, Err(OtaError::RecordNotExists(_))));

    let stored = service.list_records(&task.task_id).await.expect("records");
    assert_eq!(stored[0].status, OtaRecordStatus::Success);
    let task = service.get_task(&task.task_id).await.expect("task");
    assert_eq!(task.status, OtaTaskStatus::Done);
    assert_eq!(task.success_count, 1);
}

#[tokio::test]
async fn report_after_cancel_keeps_record_failed() {
    let fixture = fixture().await;
    let task = fixture
        .service
        .create(select(&["dev-1"]))
        .await
        .expect("create");
    fixture.service.cancel(&task.task_id).await.expect("cancel");
    let late = fixture
        .service
        .update_ota_record_progress(&device("dev-1", "prodX"), &report(OtaRecordStatus::Upgrading))
        .await;
    assert!(matches!(late, Err(OtaError::RecordNotExists(_))));
    let records = fixture
        .service
        .list_records(&task.task_id)
        .await
        .expect("records");
    assert_eq!(records[0].status, OtaRecordStatus::Failed);
}
