use crate::AuthError;
use iot_storage::{DeviceRecord, DeviceStore, KvCache};
use std::sync::Arc;
use tracing::warn;

pub const DEFAULT_LOOKUP_TTL_SECONDS: u64 = 3600;

pub fn lookup_cache_key(product_key: &str, device_name: &str) -> String {
    format!("iot:device:auth:{}:{}", product_key, device_name)
}

/// 按 (productKey, deviceName) 的设备读穿缓存。
///
/// 命中仓储才写缓存，未知设备每次都回源查询。
pub struct DeviceLookup {
    devices: Arc<dyn DeviceStore>,
    cache: Arc<dyn KvCache>,
    ttl_seconds: u64,
}

impl DeviceLookup {
    pub fn new(devices: Arc<dyn DeviceStore>, cache: Arc<dyn KvCache>, ttl_seconds: u64) -> Self {
        Self {
            devices,
            cache,
            ttl_seconds,
        }
    }

    pub fn devices(&self) -> &Arc<dyn DeviceStore> {
        &self.devices
    }

    pub async fn find(
        &self,
        product_key: &str,
        device_name: &str,
    ) -> Result<Option<DeviceRecord>, AuthError> {
        let key = lookup_cache_key(product_key, device_name);
        match self.cache.get(&key).await {
            Ok(Some(data)) => match serde_json::from_str::<DeviceRecord>(&data) {
                Ok(device) => return Ok(Some(device)),
                Err(err) => {
                    warn!(target: "iot.auth", key = %key, error = %err, "device_cache_decode_failed");
                }
            },
            Ok(None) => {}
            Err(err) => {
                warn!(target: "iot.auth", key = %key, error = %err, "device_cache_read_failed");
            }
        }

        let device = self
            .devices
            .find_by_product_key_and_name(product_key, device_name)
            .await
            .map_err(|err| AuthError::Internal(err.to_string()))?;
        let Some(device) = device else {
            return Ok(None);
        };
        match serde_json::to_string(&device) {
            Ok(data) => {
                if let Err(err) = self.cache.set_ex(&key, &data, self.ttl_seconds).await {
                    warn!(target: "iot.auth", key = %key, error = %err, "device_cache_write_failed");
                }
            }
            Err(err) => {
                warn!(target: "iot.auth", key = %key, error = %err, "device_cache_encode_failed");
            }
        }
        Ok(Some(device))
    }

    /// 设备密钥或归属变更后调用。
    pub async fn invalidate(&self, product_key: &str, device_name: &str) -> Result<(), AuthError> {
        self.cache
            .delete(&lookup_cache_key(product_key, device_name))
            .await
            .map_err(|err| AuthError::Internal(err.to_string()))
    }
}
