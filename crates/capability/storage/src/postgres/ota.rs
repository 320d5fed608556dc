//! Postgres OTA 固件、任务与升级记录实现

use crate::error::StorageError;
use crate::models::{OtaDeviceScope, OtaFirmwareRecord, OtaRecordProgress, OtaTask, OtaTaskRecord};
use crate::traits::{OtaFirmwareStore, OtaTaskRecordStore, OtaTaskStore};
use domain::{OtaRecordStatus, OtaTaskStatus};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

pub struct PgOtaFirmwareStore {
    pub pool: PgPool,
}

impl PgOtaFirmwareStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub struct PgOtaTaskStore {
    pub pool: PgPool,
}

impl PgOtaTaskStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

pub struct PgOtaTaskRecordStore {
    pub pool: PgPool,
}

impl PgOtaTaskRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const TASK_COLUMNS: &str = "task_id, tenant_id, name, firmware_id, status, device_scope, \
     total_count, success_count, (extract(epoch from created_at) * 1000)::bigint as created_at_ms";

const RECORD_COLUMNS: &str = "record_id, task_id, tenant_id, device_id, firmware_id, \
     from_firmware_id, status, progress, description, \
     (extract(epoch from created_at) * 1000)::bigint as created_at_ms, \
     (extract(epoch from updated_at) * 1000)::bigint as updated_at_ms";

fn task_from_row(row: &PgRow) -> Result<OtaTask, StorageError> {
    let status: i16 = row.try_get("status")?;
    let scope: String = row.try_get("device_scope")?;
    Ok(OtaTask {
        task_id: row.try_get("task_id")?,
        tenant_id: row.try_get("tenant_id")?,
        name: row.try_get("name")?,
        firmware_id: row.try_get("firmware_id")?,
        status: OtaTaskStatus::from_code(status)
            .ok_or_else(|| StorageError::new(format!("unknown task status {}", status)))?,
        device_scope: OtaDeviceScope::parse(&scope)
            .ok_or_else(|| StorageError::new(format!("unknown device scope {}", scope)))?,
        total_count: row.try_get("total_count")?,
        success_count: row.try_get("success_count")?,
        created_at_ms: row.try_get("created_at_ms")?,
    })
}

fn record_from_row(row: &PgRow) -> Result<OtaTaskRecord, StorageError> {
    let status: i16 = row.try_get("status")?;
    let progress: i16 = row.try_get("progress")?;
    Ok(OtaTaskRecord {
        record_id: row.try_get("record_id")?,
        task_id: row.try_get("task_id")?,
        tenant_id: row.try_get("tenant_id")?,
        device_id: row.try_get("device_id")?,
        firmware_id: row.try_get("firmware_id")?,
        from_firmware_id: row.try_get("from_firmware_id")?,
        status: OtaRecordStatus::from_code(i64::from(status))
            .ok_or_else(|| StorageError::new(format!("unknown record status {}", status)))?,
        progress: progress.clamp(0, 100) as u8,
        description: row.try_get("description")?,
        created_at_ms: row.try_get("created_at_ms")?,
        updated_at_ms: row.try_get("updated_at_ms")?,
    })
}

#[async_trait::async_trait]
impl OtaFirmwareStore for PgOtaFirmwareStore {
    async fn find_firmware(
        &self,
        firmware_id: &str,
    ) -> Result<Option<OtaFirmwareRecord>, StorageError> {
        let row = sqlx::query(
            "select firmware_id, tenant_id, product_key, version, file_url, file_size, \
             file_digest_algorithm, file_digest_value \
             from iot_ota_firmwares where firmware_id = $1",
        )
        .bind(firmware_id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else {
            return Ok(None);
        };
        Ok(Some(OtaFirmwareRecord {
            firmware_id: row.try_get("firmware_id")?,
            tenant_id: row.try_get("tenant_id")?,
            product_key: row.try_get("product_key")?,
            version: row.try_get("version")?,
            file_url: row.try_get("file_url")?,
            file_size: row.try_get("file_size")?,
            file_digest_algorithm: row.try_get("file_digest_algorithm")?,
            file_digest_value: row.try_get("file_digest_value")?,
        }))
    }

    async fn create_firmware(
        &self,
        record: OtaFirmwareRecord,
    ) -> Result<OtaFirmwareRecord, StorageError> {
        sqlx::query(
            "insert into iot_ota_firmwares \
             (firmware_id, tenant_id, product_key, version, file_url, file_size, \
             file_digest_algorithm, file_digest_value) \
             values ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(&record.firmware_id)
        .bind(&record.tenant_id)
        .bind(&record.product_key)
        .bind(&record.version)
        .bind(&record.file_url)
        .bind(record.file_size)
        .bind(&record.file_digest_algorithm)
        .bind(&record.file_digest_value)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }
}

#[async_trait::async_trait]
impl OtaTaskStore for PgOtaTaskStore {
    async fn create_task(&self, task: OtaTask) -> Result<OtaTask, StorageError> {
        sqlx::query(
            "insert into iot_ota_tasks \
             (task_id, tenant_id, name, firmware_id, status, device_scope, total_count, \
             success_count, created_at) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, to_timestamp($9 / 1000.0))",
        )
        .bind(&task.task_id)
        .bind(&task.tenant_id)
        .bind(&task.name)
        .bind(&task.firmware_id)
        .bind(task.status.code())
        .bind(task.device_scope.as_str())
        .bind(task.total_count)
        .bind(task.success_count)
        .bind(task.created_at_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(task)
    }

    async fn find_task(&self, task_id: &str) -> Result<Option<OtaTask>, StorageError> {
        let row = sqlx::query(&format!(
            "select {} from iot_ota_tasks where task_id = $1",
            TASK_COLUMNS
        ))
        .bind(task_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(task_from_row).transpose()
    }

    async fn transition_task_status(
        &self,
        task_id: &str,
        from: OtaTaskStatus,
        to: OtaTaskStatus,
    ) -> Result<bool, StorageError> {
        let result =
            sqlx::query("update iot_ota_tasks set status = $1 where task_id = $2 and status = $3")
                .bind(to.code())
                .bind(task_id)
                .bind(from.code())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn update_task_counts(
        &self,
        task_id: &str,
        total_count: i32,
        success_count: i32,
    ) -> Result<(), StorageError> {
        sqlx::query(
            "update iot_ota_tasks set total_count = $1, success_count = $2 where task_id = $3",
        )
        .bind(total_count)
        .bind(success_count)
        .bind(task_id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl OtaTaskRecordStore for PgOtaTaskRecordStore {
    async fn create_records(&self, records: Vec<OtaTaskRecord>) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for record in &records {
            sqlx::query(
                "insert into iot_ota_task_records \
                 (record_id, task_id, tenant_id, device_id, firmware_id, from_firmware_id, \
                 status, progress, description, created_at, updated_at) \
                 values ($1, $2, $3, $4, $5, $6, $7, $8, $9, \
                 to_timestamp($10 / 1000.0), to_timestamp($11 / 1000.0))",
            )
            .bind(&record.record_id)
            .bind(&record.task_id)
            .bind(&record.tenant_id)
            .bind(&record.device_id)
            .bind(&record.firmware_id)
            .bind(&record.from_firmware_id)
            .bind(record.status.code())
            .bind(i16::from(record.progress))
            .bind(&record.description)
            .bind(record.created_at_ms as f64)
            .bind(record.updated_at_ms as f64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_records_by_task(
        &self,
        task_id: &str,
    ) -> Result<Vec<OtaTaskRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "select {} from iot_ota_task_records where task_id = $1 \
             order by created_at, record_id",
            RECORD_COLUMNS
        ))
        .bind(task_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn list_open_records_by_device(
        &self,
        device_id: &str,
    ) -> Result<Vec<OtaTaskRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "select {} from iot_ota_task_records \
             where device_id = $1 and status in ($2, $3, $4) \
             order by created_at, record_id",
            RECORD_COLUMNS
        ))
        .bind(device_id)
        .bind(OtaRecordStatus::Wait.code())
        .bind(OtaRecordStatus::Pushed.code())
        .bind(OtaRecordStatus::Upgrading.code())
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(record_from_row).collect()
    }

    async fn update_record_progress(
        &self,
        record_id: &str,
        progress: OtaRecordProgress,
    ) -> Result<Option<OtaTaskRecord>, StorageError> {
        let row = sqlx::query(&format!(
            "update iot_ota_task_records set \
             status = $1, progress = $2, description = $3, updated_at = to_timestamp($4 / 1000.0) \
             where record_id = $5 and status in ($6, $7, $8) \
             returning {}",
            RECORD_COLUMNS
        ))
        .bind(progress.status.code())
        .bind(i16::from(progress.progress))
        .bind(progress.description)
        .bind(progress.updated_at_ms as f64)
        .bind(record_id)
        .bind(OtaRecordStatus::Wait.code())
        .bind(OtaRecordStatus::Pushed.code())
        .bind(OtaRecordStatus::Upgrading.code())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    async fn fail_open_records(
        &self,
        task_id: &str,
        description: &str,
        updated_at_ms: i64,
    ) -> Result<u64, StorageError> {
        let result = sqlx::query(
            "update iot_ota_task_records set \
             status = $1, description = $2, updated_at = to_timestamp($3 / 1000.0) \
             where task_id = $4 and status in ($5, $6, $7)",
        )
        .bind(OtaRecordStatus::Failed.code())
        .bind(description)
        .bind(updated_at_ms as f64)
        .bind(task_id)
        .bind(OtaRecordStatus::Wait.code())
        .bind(OtaRecordStatus::Pushed.code())
        .bind(OtaRecordStatus::Upgrading.code())
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected())
    }
}
