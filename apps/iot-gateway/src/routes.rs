//! 路由定义
//!
//! 集中管理所有 HTTP 路由：
//! - 健康检查与指标：/health, /metrics
//! - EMQX 钩子：/api/iot/emqx/*
//! - 设备消息与状态：/api/iot/devices/*
//! - 连接统计：/api/iot/connections/count
//! - OTA 任务：/api/iot/ota/tasks/*

use super::AppState;
use super::handlers::*;
use axum::{
    Router,
    routing::{get, post},
};

pub fn create_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(get_metrics))
        .nest("/api/iot", create_api_router())
}

/// 网关接口，挂在 /api/iot 下
fn create_api_router() -> Router<AppState> {
    Router::new()
        .route("/emqx/auth", post(emqx_auth))
        .route("/emqx/event", post(emqx_event))
        .route(
            "/devices/:device_id/messages",
            get(list_device_messages).post(send_device_message),
        )
        .route("/devices/:device_id/online", get(get_device_online))
        .route(
            "/devices/:device_id/properties/:identifier",
            get(list_device_properties),
        )
        .route("/connections/count", get(get_connection_count))
        .route("/ota/tasks", post(create_ota_task))
        .route("/ota/tasks/:task_id", get(get_ota_task))
        .route("/ota/tasks/:task_id/cancel", post(cancel_ota_task))
        .route("/ota/tasks/:task_id/records", get(list_ota_task_records))
        .route("/ota/tasks/:task_id/push", post(push_ota_task))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{body_json, gateway_with};
    use crate::middleware::request_context;
    use axum::{body::Body, http::Request, http::StatusCode, middleware};
    use tower::ServiceExt;

    #[tokio::test]
    async fn router_serves_health_with_request_ids() {
        let (state, _) = gateway_with(Vec::new(), 10);
        let app = create_router()
            .with_state(state)
            .layer(middleware::from_fn(request_context));
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
        assert!(response.headers().contains_key("x-trace-id"));
        assert_eq!(body_json(response).await["data"]["ok"], true);
    }

    #[tokio::test]
    async fn router_resolves_nested_paths() {
        let (state, _) = gateway_with(Vec::new(), 10);
        let app = create_router().with_state(state);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/iot/ota/tasks/missing/records")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["error"]["code"], "RESOURCE.NOT_FOUND");
    }
}
