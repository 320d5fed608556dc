//! 数据模型
//!
//! 定义网关读写的外部资源记录：
//! - 设备模型：DeviceRecord, DeviceUpdate（字段级更新）
//! - 属性历史：DevicePropertyRecord（每次上报追加一行）
//! - OTA 模型：OtaFirmwareRecord, OtaTask, OtaTaskRecord
//! - 审计模型：DeviceMessageRecord

use domain::{DeviceState, OtaRecordStatus, OtaTaskStatus};
use serde::{Deserialize, Serialize};

/// 设备记录。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub tenant_id: String,
    pub product_key: String,
    pub device_name: String,
    pub device_secret: String,
    pub state: DeviceState,
    pub firmware_id: Option<String>,
}

/// 设备字段级更新。
///
/// 只写入给定字段，状态更新与固件更新互不覆盖。
#[derive(Debug, Clone, Default)]
pub struct DeviceUpdate {
    pub state: Option<DeviceState>,
    pub firmware_id: Option<String>,
}

/// 设备属性历史行。
#[derive(Debug, Clone, PartialEq)]
pub struct DevicePropertyRecord {
    pub device_id: String,
    pub tenant_id: String,
    pub identifier: String,
    pub value: String,
    pub report_time_ms: i64,
}

/// OTA 固件。
#[derive(Debug, Clone, PartialEq)]
pub struct OtaFirmwareRecord {
    pub firmware_id: String,
    pub tenant_id: String,
    pub product_key: String,
    pub version: String,
    pub file_url: String,
    pub file_size: i64,
    pub file_digest_algorithm: String,
    pub file_digest_value: String,
}

/// OTA 任务的设备范围。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OtaDeviceScope {
    /// 固件所属产品下的全部设备。
    All,
    /// 显式指定的设备列表。
    Select,
}

impl OtaDeviceScope {
    pub fn as_str(self) -> &'static str {
        match self {
            OtaDeviceScope::All => "all",
            OtaDeviceScope::Select => "select",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all" => Some(OtaDeviceScope::All),
            "select" => Some(OtaDeviceScope::Select),
            _ => None,
        }
    }
}

/// OTA 升级任务。
#[derive(Debug, Clone, PartialEq)]
pub struct OtaTask {
    pub task_id: String,
    pub tenant_id: String,
    pub name: String,
    pub firmware_id: String,
    pub status: OtaTaskStatus,
    pub device_scope: OtaDeviceScope,
    pub total_count: i32,
    pub success_count: i32,
    pub created_at_ms: i64,
}

/// OTA 升级记录（每个目标设备一条）。
#[derive(Debug, Clone, PartialEq)]
pub struct OtaTaskRecord {
    pub record_id: String,
    pub task_id: String,
    pub tenant_id: String,
    pub device_id: String,
    pub firmware_id: String,
    pub from_firmware_id: Option<String>,
    pub status: OtaRecordStatus,
    pub progress: u8,
    pub description: Option<String>,
    pub created_at_ms: i64,
    pub updated_at_ms: i64,
}

/// 升级记录进度更新。
#[derive(Debug, Clone)]
pub struct OtaRecordProgress {
    pub status: OtaRecordStatus,
    pub progress: u8,
    pub description: Option<String>,
    pub updated_at_ms: i64,
}

/// 设备消息审计行（反规范化 JSON）。
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMessageRecord {
    pub message_id: String,
    pub request_id: String,
    pub tenant_id: String,
    pub device_id: String,
    pub server_id: String,
    pub method: String,
    pub direction: String,
    pub code: Option<i32>,
    pub payload: String,
    pub report_time_ms: i64,
}

/// 网关目录条目：设备当前归属的实例与会话。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    pub server_id: String,
    #[serde(default)]
    pub session_id: String,
}
