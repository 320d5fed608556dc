//! HTTP 响应辅助函数和 DTO 转换
//!
//! 错误统一返回 ApiResponse，错误码与状态码对应：
//! - `INVALID.REQUEST` 400
//! - `RESOURCE.NOT_FOUND` 404
//! - `OTA.STATUS_NOT_ALLOW_CANCEL` / `OTA.STATUS_NOT_ALLOW_PUSH` 409
//! - `GATEWAY.UNAVAILABLE` 503
//! - `INTERNAL.ERROR` 500

use api_contract::{
    ApiResponse, DeviceMessageDto, DeviceMessageLogDto, DevicePropertyDto, OtaTaskDto,
    OtaTaskRecordDto,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::DeviceMessage;
use iot_ota::OtaError;
use iot_pipeline::PipelineError;
use iot_storage::{DeviceMessageRecord, DevicePropertyRecord, OtaTask, OtaTaskRecord};
use serde_json::Value;
use tracing::error;

fn error_response(status: StatusCode, code: &str, message: impl Into<String>) -> Response {
    (status, Json(ApiResponse::<()>::error(code, message.into()))).into_response()
}

/// 错误请求响应
pub fn bad_request_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::BAD_REQUEST, "INVALID.REQUEST", message)
}

/// 资源未找到错误响应
pub fn not_found_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::NOT_FOUND, "RESOURCE.NOT_FOUND", message)
}

/// 设备当前没有归属网关
pub fn gateway_unavailable_error(message: impl Into<String>) -> Response {
    error_response(StatusCode::SERVICE_UNAVAILABLE, "GATEWAY.UNAVAILABLE", message)
}

/// 内部错误响应
pub fn internal_error(message: impl Into<String>) -> Response {
    let message = message.into();
    error!(target: "iot.http", error = %message, "request_failed");
    error_response(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL.ERROR", message)
}

/// 流水线错误响应
pub fn pipeline_error(err: PipelineError) -> Response {
    match err {
        PipelineError::InvalidMessage(_) => bad_request_error(err.to_string()),
        PipelineError::DeviceNotExists(_) => not_found_error(err.to_string()),
        PipelineError::GatewayUnavailable(_) => gateway_unavailable_error(err.to_string()),
        PipelineError::Ota(err) => ota_error(err),
        other => internal_error(other.to_string()),
    }
}

/// OTA 错误响应
pub fn ota_error(err: OtaError) -> Response {
    match err {
        OtaError::InvalidRequest(_) | OtaError::NoDevices => bad_request_error(err.to_string()),
        OtaError::FirmwareNotExists(_)
        | OtaError::TaskNotExists(_)
        | OtaError::RecordNotExists(_) => not_found_error(err.to_string()),
        OtaError::StatusNotAllowCancel { .. } => error_response(
            StatusCode::CONFLICT,
            "OTA.STATUS_NOT_ALLOW_CANCEL",
            err.to_string(),
        ),
        OtaError::StatusNotAllowPush { .. } => error_response(
            StatusCode::CONFLICT,
            "OTA.STATUS_NOT_ALLOW_PUSH",
            err.to_string(),
        ),
        other => internal_error(other.to_string()),
    }
}

/// DeviceMessage 转 DeviceMessageDto
pub fn message_to_dto(message: DeviceMessage) -> DeviceMessageDto {
    DeviceMessageDto {
        id: message.id,
        request_id: message.request_id,
        method: message.method,
        device_id: message.device_id,
        tenant_id: message.tenant_id,
        server_id: message.server_id,
        direction: message.direction.as_str().to_string(),
        report_time: message.report_time_ms,
    }
}

/// OtaTask 转 OtaTaskDto
pub fn ota_task_to_dto(task: OtaTask) -> OtaTaskDto {
    OtaTaskDto {
        task_id: task.task_id,
        name: task.name,
        firmware_id: task.firmware_id,
        status: task.status.as_str().to_string(),
        device_scope: task.device_scope.as_str().to_string(),
        total_count: task.total_count,
        success_count: task.success_count,
        created_at: task.created_at_ms,
    }
}

/// OtaTaskRecord 转 OtaTaskRecordDto
pub fn ota_record_to_dto(record: OtaTaskRecord) -> OtaTaskRecordDto {
    OtaTaskRecordDto {
        record_id: record.record_id,
        task_id: record.task_id,
        device_id: record.device_id,
        firmware_id: record.firmware_id,
        from_firmware_id: record.from_firmware_id,
        status: record.status.as_str().to_string(),
        progress: record.progress,
        description: record.description,
        updated_at: record.updated_at_ms,
    }
}

/// DevicePropertyRecord 转 DevicePropertyDto
pub fn property_to_dto(record: DevicePropertyRecord) -> DevicePropertyDto {
    DevicePropertyDto {
        identifier: record.identifier,
        value: record.value,
        report_time: record.report_time_ms,
    }
}

/// 审计行转 DTO；payload 无法解析时原样作为字符串返回。
pub fn message_log_to_dto(record: DeviceMessageRecord) -> DeviceMessageLogDto {
    let payload = serde_json::from_str(&record.payload).unwrap_or(Value::String(record.payload));
    DeviceMessageLogDto {
        message_id: record.message_id,
        request_id: record.request_id,
        server_id: record.server_id,
        method: record.method,
        direction: record.direction,
        code: record.code,
        payload,
        report_time: record.report_time_ms,
    }
}
