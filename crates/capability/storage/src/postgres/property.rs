//! Postgres 设备属性历史实现

use crate::error::StorageError;
use crate::models::DevicePropertyRecord;
use crate::traits::DevicePropertyStore;
use sqlx::{PgPool, Row};

pub struct PgDevicePropertyStore {
    pub pool: PgPool,
}

impl PgDevicePropertyStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DevicePropertyStore for PgDevicePropertyStore {
    async fn append_properties(
        &self,
        records: Vec<DevicePropertyRecord>,
    ) -> Result<(), StorageError> {
        if records.is_empty() {
            return Ok(());
        }
        let mut tx = self.pool.begin().await?;
        for record in &records {
            sqlx::query(
                "insert into iot_device_properties \
                 (device_id, tenant_id, identifier, value, report_time) \
                 values ($1, $2, $3, $4, to_timestamp($5 / 1000.0))",
            )
            .bind(&record.device_id)
            .bind(&record.tenant_id)
            .bind(&record.identifier)
            .bind(&record.value)
            .bind(record.report_time_ms as f64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn list_property_history(
        &self,
        device_id: &str,
        identifier: &str,
    ) -> Result<Vec<DevicePropertyRecord>, StorageError> {
        let rows = sqlx::query(
            "select device_id, tenant_id, identifier, value, \
             (extract(epoch from report_time) * 1000)::bigint as report_time_ms \
             from iot_device_properties \
             where device_id = $1 and identifier = $2 \
             order by report_time desc",
        )
        .bind(device_id)
        .bind(identifier)
        .fetch_all(&self.pool)
        .await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(DevicePropertyRecord {
                device_id: row.try_get("device_id")?,
                tenant_id: row.try_get("tenant_id")?,
                identifier: row.try_get("identifier")?,
                value: row.try_get("value")?,
                report_time_ms: row.try_get("report_time_ms")?,
            });
        }
        Ok(items)
    }
}
