//! 设备消息与设备状态 handlers
//!
//! - POST /api/iot/devices/{did}/messages - 业务侧发送设备消息
//! - GET /api/iot/devices/{did}/online - 设备是否在本实例在线
//! - GET /api/iot/devices/{did}/messages - 设备消息审计（新到旧）
//! - GET /api/iot/devices/{did}/properties/{identifier} - 属性历史

use crate::AppState;
use crate::utils::normalize_optional;
use crate::utils::response::{
    bad_request_error, internal_error, message_log_to_dto, message_to_dto, pipeline_error,
    property_to_dto,
};
use api_contract::{
    ApiResponse, DeviceMessageLogDto, DeviceMessageQuery, DeviceOnlineDto, DevicePropertyDto,
    SendDeviceMessageRequest,
};
use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use domain::MessageDirection;
use iot_pipeline::SendMessageRequest;

const DEFAULT_MESSAGE_LIMIT: i64 = 100;
const MAX_MESSAGE_LIMIT: i64 = 1000;

#[derive(serde::Deserialize)]
pub struct DevicePath {
    device_id: String,
}

#[derive(serde::Deserialize)]
pub struct PropertyPath {
    device_id: String,
    identifier: String,
}

/// 发送设备消息
///
/// 未给出 `direction` 时按 code/data 推断：两者都未设置视为上行注入，否则为下行。
/// 下行消息路由到设备当前归属的网关实例，没有归属时返回 503。
pub async fn send_device_message(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
    Json(req): Json<SendDeviceMessageRequest>,
) -> Response {
    let direction = match normalize_optional(req.direction, "direction") {
        Ok(Some(value)) => match MessageDirection::parse(&value) {
            Some(direction) => Some(direction),
            None => return bad_request_error(format!("unknown direction: {value}")),
        },
        Ok(None) => None,
        Err(response) => return response,
    };
    let request = SendMessageRequest {
        method: req.method,
        params: req.params,
        data: req.data,
        code: req.code,
        msg: req.msg,
        direction,
    };
    match state
        .messages
        .send_device_message(&path.device_id, request)
        .await
    {
        Ok(message) => (
            StatusCode::OK,
            Json(ApiResponse::success(message_to_dto(message))),
        )
            .into_response(),
        Err(err) => pipeline_error(err),
    }
}

/// 设备是否在本实例在线
pub async fn get_device_online(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
) -> Response {
    match state.connections.is_device_online(&path.device_id) {
        Ok(online) => (
            StatusCode::OK,
            Json(ApiResponse::success(DeviceOnlineDto {
                device_id: path.device_id,
                online,
            })),
        )
            .into_response(),
        Err(err) => internal_error(err.to_string()),
    }
}

/// 设备消息审计
///
/// `limit` 缺省 100，最大 1000。
pub async fn list_device_messages(
    State(state): State<AppState>,
    Path(path): Path<DevicePath>,
    Query(query): Query<DeviceMessageQuery>,
) -> Response {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_MESSAGE_LIMIT)
        .clamp(0, MAX_MESSAGE_LIMIT);
    match state
        .messages
        .device_messages(&path.device_id, limit)
        .await
    {
        Ok(items) => {
            let data: Vec<DeviceMessageLogDto> = items.into_iter().map(message_log_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => pipeline_error(err),
    }
}

/// 属性历史（新到旧）
pub async fn list_device_properties(
    State(state): State<AppState>,
    Path(path): Path<PropertyPath>,
) -> Response {
    match state
        .messages
        .property_history(&path.device_id, &path.identifier)
        .await
    {
        Ok(items) => {
            let data: Vec<DevicePropertyDto> = items.into_iter().map(property_to_dto).collect();
            (StatusCode::OK, Json(ApiResponse::success(data))).into_response()
        }
        Err(err) => pipeline_error(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{SERVER_ID, body_json, device, gateway_with};
    use serde_json::json;
    use std::time::Duration;

    fn send_request(method: &str, direction: Option<&str>) -> SendDeviceMessageRequest {
        SendDeviceMessageRequest {
            method: method.to_string(),
            params: json!({"power": "on"}).as_object().cloned(),
            data: None,
            code: None,
            msg: None,
            direction: direction.map(str::to_string),
        }
    }

    fn device_path(device_id: &str) -> Path<DevicePath> {
        Path(DevicePath {
            device_id: device_id.to_string(),
        })
    }

    #[tokio::test]
    async fn downstream_without_owner_is_unavailable() {
        let (state, _) = gateway_with(vec![device("dev-1", "devA")], 10);
        let response = send_device_message(
            State(state),
            device_path("dev-1"),
            Json(send_request("thing.property.set", Some("downstream"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body = body_json(response).await;
        assert_eq!(body["error"]["code"], "GATEWAY.UNAVAILABLE");
    }

    #[tokio::test]
    async fn downstream_routes_to_directory_owner() {
        let (state, stores) = gateway_with(vec![device("dev-1", "devA")], 10);
        stores
            .directory
            .bind("dev-1", SERVER_ID, "s-1")
            .await
            .expect("bind");
        let response = send_device_message(
            State(state.clone()),
            device_path("dev-1"),
            Json(send_request("thing.property.set", Some("Downstream"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["data"]["direction"], "downstream");
        assert_eq!(body["data"]["serverId"], SERVER_ID);
        assert_eq!(body["data"]["id"], body["data"]["requestId"]);

        assert!(state.messages.drain(Duration::from_secs(1)).await);
        let response = list_device_messages(
            State(state),
            device_path("dev-1"),
            Query(DeviceMessageQuery { limit: None }),
        )
        .await;
        let body = body_json(response).await;
        assert_eq!(body["data"][0]["method"], "thing.property.set");
        assert_eq!(body["data"][0]["payload"]["params"]["power"], "on");
    }

    #[tokio::test]
    async fn unknown_direction_and_device_are_rejected() {
        let (state, _) = gateway_with(vec![device("dev-1", "devA")], 10);
        let response = send_device_message(
            State(state.clone()),
            device_path("dev-1"),
            Json(send_request("thing.property.set", Some("sideways"))),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send_device_message(
            State(state),
            device_path("ghost"),
            Json(send_request("thing.property.set", None)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["code"], "RESOURCE.NOT_FOUND");
    }

    #[tokio::test]
    async fn online_reflects_connection_table() {
        let (state, _) = gateway_with(vec![device("dev-1", "devA")], 10);
        let response = get_device_online(State(state), device_path("dev-1")).await;
        let body = body_json(response).await;
        assert_eq!(body["data"]["deviceId"], "dev-1");
        assert_eq!(body["data"]["online"], false);
    }

    #[tokio::test]
    async fn property_history_of_unknown_device_is_not_found() {
        let (state, _) = gateway_with(Vec::new(), 10);
        let response = list_device_properties(
            State(state),
            Path(PropertyPath {
                device_id: "ghost".to_string(),
                identifier: "temp".to_string(),
            }),
        )
        .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
