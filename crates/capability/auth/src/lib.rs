//! 设备认证能力：MQTT 用户名解析、HMAC-SHA256 口令校验与设备查询缓存。

mod lookup;
mod sign;

use iot_storage::DeviceRecord;
use iot_telemetry::{record_auth_failure, record_auth_success};
use std::sync::Arc;
use tracing::{info, warn};

pub use lookup::{DEFAULT_LOOKUP_TTL_SECONDS, DeviceLookup, lookup_cache_key};
pub use sign::{build_auth_content, build_password, parse_username, validate_password};

/// 设备认证错误。
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    #[error("invalid username format: {0}")]
    InvalidUsernameFormat(String),
    #[error("device not found: {product_key}&{device_name}")]
    DeviceNotFound {
        product_key: String,
        device_name: String,
    },
    #[error("invalid password")]
    InvalidPassword,
    #[error("internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// 凭据类失败（应拒绝连接），区别于内部故障。
    pub fn is_credential_failure(&self) -> bool {
        !matches!(self, AuthError::Internal(_))
    }
}

/// 设备认证服务。
pub struct DeviceAuthService {
    lookup: Arc<DeviceLookup>,
}

impl DeviceAuthService {
    pub fn new(lookup: Arc<DeviceLookup>) -> Self {
        Self { lookup }
    }

    pub fn lookup(&self) -> &Arc<DeviceLookup> {
        &self.lookup
    }

    /// 校验 MQTT 凭据，成功时返回设备记录。
    pub async fn auth_device(
        &self,
        username: &str,
        password: &str,
    ) -> Result<DeviceRecord, AuthError> {
        let result = self.check(username, password).await;
        match &result {
            Ok(device) => {
                record_auth_success();
                info!(
                    target: "iot.auth",
                    device_id = %device.device_id,
                    product_key = %device.product_key,
                    device_name = %device.device_name,
                    "device_auth_success"
                );
            }
            Err(err) => {
                record_auth_failure();
                warn!(target: "iot.auth", username = %username, error = %err, "device_auth_failed");
            }
        }
        result
    }

    async fn check(&self, username: &str, password: &str) -> Result<DeviceRecord, AuthError> {
        let (product_key, device_name) = parse_username(username)?;
        let device = self
            .lookup
            .find(&product_key, &device_name)
            .await?
            .ok_or_else(|| AuthError::DeviceNotFound {
                product_key: product_key.clone(),
                device_name: device_name.clone(),
            })?;
        if !validate_password(&device.device_secret, &device_name, &product_key, password) {
            return Err(AuthError::InvalidPassword);
        }
        Ok(device)
    }
}
