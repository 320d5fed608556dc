//! Postgres 设备存储实现

use crate::error::StorageError;
use crate::models::{DeviceRecord, DeviceUpdate};
use crate::traits::DeviceStore;
use domain::DeviceState;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

pub struct PgDeviceStore {
    pub pool: PgPool,
}

impl PgDeviceStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool = crate::connection::connect_pool(database_url).await?;
        Ok(Self { pool })
    }
}

const DEVICE_COLUMNS: &str =
    "device_id, tenant_id, product_key, device_name, device_secret, state, firmware_id";

fn device_from_row(row: &PgRow) -> Result<DeviceRecord, StorageError> {
    let state: i16 = row.try_get("state")?;
    Ok(DeviceRecord {
        device_id: row.try_get("device_id")?,
        tenant_id: row.try_get("tenant_id")?,
        product_key: row.try_get("product_key")?,
        device_name: row.try_get("device_name")?,
        device_secret: row.try_get("device_secret")?,
        state: DeviceState::from_code(state)
            .ok_or_else(|| StorageError::new(format!("unknown device state {}", state)))?,
        firmware_id: row.try_get("firmware_id")?,
    })
}

#[async_trait::async_trait]
impl DeviceStore for PgDeviceStore {
    async fn find_device(&self, device_id: &str) -> Result<Option<DeviceRecord>, StorageError> {
        let row = sqlx::query(&format!(
            "select {} from iot_devices where device_id = $1",
            DEVICE_COLUMNS
        ))
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn find_by_product_key_and_name(
        &self,
        product_key: &str,
        device_name: &str,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        let row = sqlx::query(&format!(
            "select {} from iot_devices where product_key = $1 and device_name = $2",
            DEVICE_COLUMNS
        ))
        .bind(product_key)
        .bind(device_name)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(device_from_row).transpose()
    }

    async fn list_by_product_key(
        &self,
        product_key: &str,
    ) -> Result<Vec<DeviceRecord>, StorageError> {
        let rows = sqlx::query(&format!(
            "select {} from iot_devices where product_key = $1 order by device_id",
            DEVICE_COLUMNS
        ))
        .bind(product_key)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(device_from_row).collect()
    }

    async fn create_device(&self, record: DeviceRecord) -> Result<DeviceRecord, StorageError> {
        sqlx::query(
            "insert into iot_devices \
             (device_id, tenant_id, product_key, device_name, device_secret, state, firmware_id) \
             values ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(&record.device_id)
        .bind(&record.tenant_id)
        .bind(&record.product_key)
        .bind(&record.device_name)
        .bind(&record.device_secret)
        .bind(record.state.code())
        .bind(&record.firmware_id)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn update_device(
        &self,
        device_id: &str,
        update: DeviceUpdate,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        let row = sqlx::query(&format!(
            "update iot_devices set \
             state = coalesce($1, state), \
             firmware_id = coalesce($2, firmware_id) \
             where device_id = $3 \
             returning {}",
            DEVICE_COLUMNS
        ))
        .bind(update.state.map(DeviceState::code))
        .bind(update.firmware_id)
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(device_from_row).transpose()
    }
}
