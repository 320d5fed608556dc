//! 连接管理能力：在线会话表与心跳超时扫描。

mod heartbeat;
mod manager;

use serde::Serialize;

pub use heartbeat::HeartbeatConfig;
pub use manager::ConnectionManager;

#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("connection limit reached: {0}")]
    LimitReached(usize),
    #[error("connection internal error: {0}")]
    Internal(String),
}

/// 单个 MQTT 会话。
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionInfo {
    pub client_id: String,
    pub device_id: String,
    pub tenant_id: String,
    pub product_key: String,
    pub device_name: String,
    /// 承载该会话的网关实例，为空时取管理器自身的 serverID。
    pub server_id: String,
    /// 每次登记生成的会话标识，随生命周期消息一起投递。
    pub session_id: String,
    pub remote_addr: Option<String>,
    pub authenticated: bool,
    pub connected_at_ms: i64,
    pub last_heartbeat_ms: i64,
}
