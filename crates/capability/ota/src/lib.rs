//! OTA 任务状态机。
//!
//! 任务：`Wait → Done` 或 `Wait → Cancel`，取消只允许在 `Wait`。
//! 记录：`Wait → Pushed → Upgrading → {Success | Failed}`，网关只创建 `Wait` 记录，
//! 其余状态由设备上报。

mod service;

use async_trait::async_trait;
use domain::{DeviceMessage, OtaTaskStatus};
use iot_storage::{OtaDeviceScope, StorageError};

pub use service::{OtaService, upgrade_params};

#[derive(Debug, thiserror::Error)]
pub enum OtaError {
    #[error("invalid ota request: {0}")]
    InvalidRequest(String),
    #[error("firmware not exists: {0}")]
    FirmwareNotExists(String),
    #[error("ota task not exists: {0}")]
    TaskNotExists(String),
    #[error("ota record not exists for device: {0}")]
    RecordNotExists(String),
    #[error("ota task {task_id} cannot be canceled in status {status:?}")]
    StatusNotAllowCancel {
        task_id: String,
        status: OtaTaskStatus,
    },
    #[error("ota task {task_id} cannot be pushed in status {status:?}")]
    StatusNotAllowPush {
        task_id: String,
        status: OtaTaskStatus,
    },
    #[error("ota task has no target devices")]
    NoDevices,
    #[error("ota dispatch error: {0}")]
    Dispatch(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// 创建任务请求。
#[derive(Debug, Clone)]
pub struct CreateOtaTask {
    pub name: String,
    pub firmware_id: String,
    pub device_scope: OtaDeviceScope,
    /// `Select` 范围下的目标设备
    pub device_ids: Vec<String>,
}

/// 升级指令的下行出口（由消息流水线实现）。
#[async_trait]
pub trait OtaCommandSender: Send + Sync {
    async fn send_upgrade(&self, message: DeviceMessage) -> Result<(), OtaError>;
}
