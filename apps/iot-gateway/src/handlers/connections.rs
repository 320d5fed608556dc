//! 连接统计
//!
//! - GET /api/iot/connections/count

use crate::AppState;
use crate::utils::response::internal_error;
use api_contract::{ApiResponse, ConnectionCountDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

pub async fn get_connection_count(State(state): State<AppState>) -> Response {
    match state.connections.online_device_count() {
        Ok(count) => (
            StatusCode::OK,
            Json(ApiResponse::success(ConnectionCountDto {
                server_id: state.server_id.clone(),
                count,
                max_connections: state.connections.max_connections(),
            })),
        )
            .into_response(),
        Err(err) => internal_error(err.to_string()),
    }
}
