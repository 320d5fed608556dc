//! EMQX HTTP 钩子
//!
//! - POST /api/iot/emqx/auth：设备连接认证，HTTP 200 + `allow`/`deny`
//! - POST /api/iot/emqx/event：`client.connected` 注册会话，`client.disconnected` 注销会话
//!
//! 认证钩子任何失败都返回 `deny`，内部错误额外记录日志。

use crate::AppState;
use api_contract::{ApiResponse, EmqxAuthRequest, EmqxAuthResponse, EmqxEventRequest};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use iot_auth::parse_username;
use iot_connection::ConnectionInfo;
use tracing::{error, info, warn};

const CLIENT_CONNECTED: &str = "client.connected";
const CLIENT_DISCONNECTED: &str = "client.disconnected";

/// 设备连接认证
///
/// 在线连接数达到上限时直接拒绝，否则校验 `{productKey}&{deviceName}` 与 HMAC 口令。
pub async fn emqx_auth(
    State(state): State<AppState>,
    Json(req): Json<EmqxAuthRequest>,
) -> Response {
    let limit = state.connections.max_connections();
    match state.connections.online_device_count() {
        Ok(count) if count >= limit => {
            warn!(
                target: "iot.http",
                client_id = %req.clientid,
                count,
                limit,
                "emqx_auth_connection_limit"
            );
            return auth_result(EmqxAuthResponse::deny());
        }
        Ok(_) => {}
        Err(err) => {
            error!(target: "iot.http", error = %err, "emqx_auth_count_failed");
            return auth_result(EmqxAuthResponse::deny());
        }
    }

    match state.auth.auth_device(&req.username, &req.password).await {
        Ok(device) => {
            info!(
                target: "iot.http",
                client_id = %req.clientid,
                device_id = %device.device_id,
                peerhost = req.peerhost.as_deref().unwrap_or(""),
                "emqx_auth_allowed"
            );
            auth_result(EmqxAuthResponse::allow())
        }
        Err(err) if err.is_credential_failure() => auth_result(EmqxAuthResponse::deny()),
        Err(err) => {
            error!(target: "iot.http", client_id = %req.clientid, error = %err, "emqx_auth_internal_error");
            auth_result(EmqxAuthResponse::deny())
        }
    }
}

/// 客户端生命周期事件
///
/// 总是应答成功；`data` 表示事件是否改变了会话表。未知事件只确认不处理。
pub async fn emqx_event(
    State(state): State<AppState>,
    Json(req): Json<EmqxEventRequest>,
) -> Response {
    let applied = match req.event.as_str() {
        CLIENT_CONNECTED => client_connected(&state, &req).await,
        CLIENT_DISCONNECTED => match state.connections.unregister_connection(&req.clientid).await {
            Ok(removed) => {
                info!(
                    target: "iot.http",
                    client_id = %req.clientid,
                    reason = req.reason.as_deref().unwrap_or(""),
                    removed = removed.is_some(),
                    "emqx_client_disconnected"
                );
                removed.is_some()
            }
            Err(err) => {
                warn!(target: "iot.http", client_id = %req.clientid, error = %err, "emqx_unregister_failed");
                false
            }
        },
        other => {
            info!(target: "iot.http", event = %other, client_id = %req.clientid, "emqx_event_ignored");
            false
        }
    };
    (StatusCode::OK, Json(ApiResponse::success(applied))).into_response()
}

async fn client_connected(state: &AppState, req: &EmqxEventRequest) -> bool {
    let Some(username) = req.username.as_deref() else {
        warn!(target: "iot.http", client_id = %req.clientid, "emqx_connected_without_username");
        return false;
    };
    let (product_key, device_name) = match parse_username(username) {
        Ok(parts) => parts,
        Err(err) => {
            warn!(target: "iot.http", client_id = %req.clientid, error = %err, "emqx_connected_bad_username");
            return false;
        }
    };
    let device = match state.auth.lookup().find(&product_key, &device_name).await {
        Ok(Some(device)) => device,
        Ok(None) => {
            warn!(
                target: "iot.http",
                client_id = %req.clientid,
                product_key = %product_key,
                device_name = %device_name,
                "emqx_connected_unknown_device"
            );
            return false;
        }
        Err(err) => {
            warn!(target: "iot.http", client_id = %req.clientid, error = %err, "emqx_connected_lookup_failed");
            return false;
        }
    };
    let info = ConnectionInfo {
        client_id: req.clientid.clone(),
        device_id: device.device_id,
        tenant_id: device.tenant_id,
        product_key,
        device_name,
        remote_addr: req.peername.clone(),
        authenticated: true,
        ..Default::default()
    };
    match state.connections.register_connection(&req.clientid, info).await {
        Ok(()) => true,
        Err(err) => {
            warn!(target: "iot.http", client_id = %req.clientid, error = %err, "emqx_register_failed");
            false
        }
    }
}

fn auth_result(result: EmqxAuthResponse) -> Response {
    (StatusCode::OK, Json(result)).into_response()
}
