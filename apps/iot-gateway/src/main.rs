//! IoT 设备网关进程：MQTT 传输、消息总线、EMQX HTTP 钩子与管理接口。

mod handlers;
mod middleware;
mod routes;
mod utils;
mod wiring;

use axum::middleware as axum_middleware;
use iot_auth::DeviceAuthService;
use iot_config::AppConfig;
use iot_connection::{ConnectionManager, HeartbeatConfig};
use iot_pipeline::DeviceMessageService;
use iot_telemetry::init_tracing;
use iot_transport::MqttTransport;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

/// HTTP 层共享状态。
#[derive(Clone)]
pub struct AppState {
    pub server_id: String,
    pub auth: Arc<DeviceAuthService>,
    pub connections: Arc<ConnectionManager>,
    pub messages: Arc<DeviceMessageService>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();
    let config = AppConfig::from_env()?;
    init_tracing();
    info!(
        target: "iot.http",
        server_id = %config.server_id,
        http_addr = %config.http_addr,
        "gateway_starting"
    );

    let stores = wiring::Stores::from_config(&config).await?;
    let gateway = wiring::assemble(&config, stores)?;
    let cancel = CancellationToken::new();

    // 上行：Broker → 解码 → 总线；下行：总线 → 编码 → Broker
    let (transport, mqtt_loop) = MqttTransport::connect(
        wiring::mqtt_config(&config),
        gateway.upstream_handler(&config),
        cancel.clone(),
    )?;
    gateway.register_downstream(&config, Arc::new(transport.clone()))?;

    let heartbeat = gateway.state.connections.start_heartbeat_checker(
        HeartbeatConfig {
            timeout: config.heartbeat_timeout(),
            interval: config.heartbeat_interval(),
        },
        cancel.clone(),
    );

    let app = routes::create_router()
        .with_state(gateway.state.clone())
        .layer(TraceLayer::new_for_http())
        // 注入 request_id/trace_id
        .layer(axum_middleware::from_fn(middleware::request_context));

    let listener = tokio::net::TcpListener::bind(&config.http_addr).await?;
    let shutdown = cancel.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = shutdown.cancelled() => {}
            }
        })
        .await?;

    // 停机：先停止心跳与事件循环，再排空在途分发与审计
    info!(target: "iot.http", "gateway_shutting_down");
    if let Err(err) = transport.disconnect().await {
        warn!(target: "iot.transport", error = %err, "mqtt_disconnect_failed");
    }
    cancel.cancel();
    let _ = heartbeat.await;
    let _ = mqtt_loop.await;
    if !gateway.shutdown(config.shutdown_drain_timeout()).await {
        warn!(target: "iot.http", "gateway_drain_incomplete");
    }
    info!(target: "iot.http", "gateway_stopped");
    Ok(())
}
