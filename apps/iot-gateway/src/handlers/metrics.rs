//! 健康检查与计数指标快照
//!
//! - GET /health
//! - GET /metrics

use crate::AppState;
use api_contract::{ApiResponse, HealthDto, MetricsSnapshotDto};
use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use iot_telemetry::metrics;

pub async fn health(State(state): State<AppState>) -> Response {
    (
        StatusCode::OK,
        Json(ApiResponse::success(HealthDto {
            ok: true,
            server_id: state.server_id.clone(),
        })),
    )
        .into_response()
}

pub async fn get_metrics() -> Response {
    let snapshot = metrics().snapshot();
    (
        StatusCode::OK,
        Json(ApiResponse::success(MetricsSnapshotDto {
            upstream_received: snapshot.upstream_received,
            upstream_decoded: snapshot.upstream_decoded,
            upstream_dropped: snapshot.upstream_dropped,
            downstream_sent: snapshot.downstream_sent,
            downstream_failed: snapshot.downstream_failed,
            bus_posted: snapshot.bus_posted,
            bus_dispatched: snapshot.bus_dispatched,
            bus_timeouts: snapshot.bus_timeouts,
            bus_rejected: snapshot.bus_rejected,
            bus_dispatch_latency_ms_total: snapshot.bus_dispatch_latency_ms_total,
            bus_dispatch_latency_ms_count: snapshot.bus_dispatch_latency_ms_count,
            auth_success: snapshot.auth_success,
            auth_failure: snapshot.auth_failure,
            connections_registered: snapshot.connections_registered,
            connections_evicted: snapshot.connections_evicted,
            replies_sent: snapshot.replies_sent,
            audit_failures: snapshot.audit_failures,
            ota_progress_updates: snapshot.ota_progress_updates,
        })),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::test_support::{body_json, gateway_with};

    #[tokio::test]
    async fn health_reports_server_id() {
        let (state, _) = gateway_with(Vec::new(), 10);
        let body = body_json(health(State(state)).await).await;
        assert_eq!(body["data"]["ok"], true);
        assert_eq!(body["data"]["serverId"], "gw-test");
    }

    #[tokio::test]
    async fn metrics_are_camel_case_counters() {
        let body = body_json(get_metrics().await).await;
        assert!(body["data"]["upstreamReceived"].is_u64());
        assert!(body["data"]["busTimeouts"].is_u64());
    }
}
