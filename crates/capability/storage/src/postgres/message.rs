//! Postgres 设备消息审计实现

use crate::error::StorageError;
use crate::models::DeviceMessageRecord;
use crate::traits::DeviceMessageStore;
use sqlx::{PgPool, Row};

pub struct PgDeviceMessageStore {
    pub pool: PgPool,
}

impl PgDeviceMessageStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DeviceMessageStore for PgDeviceMessageStore {
    async fn append_message(&self, record: DeviceMessageRecord) -> Result<(), StorageError> {
        sqlx::query(
            "insert into iot_device_messages \
             (message_id, request_id, tenant_id, device_id, server_id, method, direction, code, \
             payload, report_time) \
             values ($1, $2, $3, $4, $5, $6, $7, $8, $9::jsonb, to_timestamp($10 / 1000.0))",
        )
        .bind(&record.message_id)
        .bind(&record.request_id)
        .bind(&record.tenant_id)
        .bind(&record.device_id)
        .bind(&record.server_id)
        .bind(&record.method)
        .bind(&record.direction)
        .bind(record.code)
        .bind(&record.payload)
        .bind(record.report_time_ms as f64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_device_messages(
        &self,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<DeviceMessageRecord>, StorageError> {
        let rows = sqlx::query(
            "select message_id, request_id, tenant_id, device_id, server_id, method, direction, \
             code, payload::text as payload, \
             (extract(epoch from report_time) * 1000)::bigint as report_time_ms \
             from iot_device_messages \
             where device_id = $1 \
             order by report_time desc \
             limit $2",
        )
        .bind(device_id)
        .bind(limit.max(0))
        .fetch_all(&self.pool)
        .await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            items.push(DeviceMessageRecord {
                message_id: row.try_get("message_id")?,
                request_id: row.try_get("request_id")?,
                tenant_id: row.try_get("tenant_id")?,
                device_id: row.try_get("device_id")?,
                server_id: row.try_get("server_id")?,
                method: row.try_get("method")?,
                direction: row.try_get("direction")?,
                code: row.try_get("code")?,
                payload: row.try_get("payload")?,
                report_time_ms: row.try_get("report_time_ms")?,
            });
        }
        Ok(items)
    }
}
