//! 稳定的 DTO 与 API 响应契约。
//!
//! - 管理接口统一返回 [`ApiResponse`]
//! - EMQX HTTP 认证钩子按 EMQX 约定返回 [`EmqxAuthResponse`]

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 标准 API 响应封装。
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<ApiError>,
}

/// 失败响应的错误体。
#[derive(Debug, Serialize)]
pub struct ApiError {
    pub code: String,
    pub message: String,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(ApiError {
                code: code.into(),
                message: message.into(),
            }),
        }
    }
}

/// EMQX HTTP 认证请求体。
#[derive(Debug, Deserialize)]
pub struct EmqxAuthRequest {
    pub clientid: String,
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub peerhost: Option<String>,
}

/// EMQX HTTP 认证响应体：`result` 为 `allow` 或 `deny`。
#[derive(Debug, Serialize, PartialEq)]
pub struct EmqxAuthResponse {
    pub result: String,
    pub is_superuser: bool,
}

impl EmqxAuthResponse {
    pub fn allow() -> Self {
        Self {
            result: "allow".to_string(),
            is_superuser: false,
        }
    }

    pub fn deny() -> Self {
        Self {
            result: "deny".to_string(),
            is_superuser: false,
        }
    }
}

/// EMQX 客户端事件（webhook）。
#[derive(Debug, Deserialize)]
pub struct EmqxEventRequest {
    pub event: String,
    pub clientid: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub peername: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// 业务侧发送设备消息。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendDeviceMessageRequest {
    pub method: String,
    #[serde(default)]
    pub params: Option<Map<String, Value>>,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub code: Option<i32>,
    #[serde(default)]
    pub msg: Option<String>,
    /// `upstream` / `downstream`，缺省时按 code/data 推断
    #[serde(default)]
    pub direction: Option<String>,
}

/// 已发送的设备消息。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMessageDto {
    pub id: String,
    pub request_id: String,
    pub method: String,
    pub device_id: String,
    pub tenant_id: String,
    pub server_id: String,
    pub direction: String,
    pub report_time: i64,
}

/// 设备在线状态。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceOnlineDto {
    pub device_id: String,
    pub online: bool,
}

/// 当前网关实例的在线连接数。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCountDto {
    pub server_id: String,
    pub count: usize,
    pub max_connections: usize,
}

/// 创建 OTA 任务请求体。
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateOtaTaskRequest {
    pub name: String,
    pub firmware_id: String,
    /// `all` / `select`
    pub device_scope: String,
    #[serde(default)]
    pub device_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtaTaskDto {
    pub task_id: String,
    pub name: String,
    pub firmware_id: String,
    pub status: String,
    pub device_scope: String,
    pub total_count: i32,
    pub success_count: i32,
    pub created_at: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtaTaskRecordDto {
    pub record_id: String,
    pub task_id: String,
    pub device_id: String,
    pub firmware_id: String,
    pub from_firmware_id: Option<String>,
    pub status: String,
    pub progress: u8,
    pub description: Option<String>,
    pub updated_at: i64,
}

/// 推送结果：实际下发的升级指令条数。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OtaPushResultDto {
    pub task_id: String,
    pub sent: usize,
}

/// 属性历史行。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DevicePropertyDto {
    pub identifier: String,
    pub value: String,
    pub report_time: i64,
}

/// 设备消息审计行。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMessageLogDto {
    pub message_id: String,
    pub request_id: String,
    pub server_id: String,
    pub method: String,
    pub direction: String,
    pub code: Option<i32>,
    pub payload: Value,
    pub report_time: i64,
}

/// 审计查询参数。
#[derive(Debug, Deserialize)]
pub struct DeviceMessageQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthDto {
    pub ok: bool,
    pub server_id: String,
}

/// 计数指标快照。
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshotDto {
    pub upstream_received: u64,
    pub upstream_decoded: u64,
    pub upstream_dropped: u64,
    pub downstream_sent: u64,
    pub downstream_failed: u64,
    pub bus_posted: u64,
    pub bus_dispatched: u64,
    pub bus_timeouts: u64,
    pub bus_rejected: u64,
    pub bus_dispatch_latency_ms_total: u64,
    pub bus_dispatch_latency_ms_count: u64,
    pub auth_success: u64,
    pub auth_failure: u64,
    pub connections_registered: u64,
    pub connections_evicted: u64,
    pub replies_sent: u64,
    pub audit_failures: u64,
    pub ota_progress_updates: u64,
}
