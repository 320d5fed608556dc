//! # 设备消息流水线
//!
//! - 业务侧下发：`send_device_message` 生成规范消息，上行投递总线，
//!   下行按设备 → 网关实例目录路由到 `iot_gateway_downstream_{serverID}`
//! - 上行处理：[`UpstreamMessageSubscriber`] 订阅 `iot_device_message`，按方法分发
//!   （状态、属性、事件、OTA 进度），需要时合成 `_reply` 回复
//! - 审计：每条消息在最终路由处异步落一行，失败只记日志
//!
//! 每条消息只审计一次：上行在订阅者处，下行在发送处。

mod audit;
mod handler;
mod service;

use domain::MessageDirection;
use iot_ota::OtaError;
use iot_storage::StorageError;
use serde_json::{Map, Value};
use std::time::Duration;

pub use audit::AuditWriter;
pub use handler::UpstreamMessageSubscriber;
pub use service::DeviceMessageService;

#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("device not exists: {0}")]
    DeviceNotExists(String),
    #[error("invalid message: {0}")]
    InvalidMessage(String),
    #[error("no gateway owns device: {0}")]
    GatewayUnavailable(String),
    #[error("bus error: {0}")]
    Bus(String),
    #[error(transparent)]
    Ota(#[from] OtaError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl PipelineError {
    /// 合成回复使用的 `code`。
    pub fn reply_code(&self) -> i32 {
        match self {
            PipelineError::InvalidMessage(_) => 400,
            PipelineError::DeviceNotExists(_)
            | PipelineError::Ota(OtaError::RecordNotExists(_))
            | PipelineError::Ota(OtaError::TaskNotExists(_))
            | PipelineError::Ota(OtaError::FirmwareNotExists(_)) => 404,
            PipelineError::GatewayUnavailable(_) => 503,
            _ => 500,
        }
    }
}

/// 业务侧发送请求。
#[derive(Debug, Clone, Default)]
pub struct SendMessageRequest {
    pub method: String,
    pub params: Option<Map<String, Value>>,
    pub data: Option<Value>,
    pub code: Option<i32>,
    pub msg: Option<String>,
    /// 缺省时按 `code`/`data` 推断
    pub direction: Option<MessageDirection>,
}

/// 审计任务池参数。
#[derive(Debug, Clone, Copy)]
pub struct PipelineConfig {
    pub audit_max_in_flight: usize,
    pub audit_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            audit_max_in_flight: 256,
            audit_timeout: Duration::from_millis(5000),
        }
    }
}
