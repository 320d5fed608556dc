use crate::{ConnectionError, ConnectionInfo, HeartbeatConfig};
use domain::{DeviceMessage, DeviceState, now_epoch_ms};
use iot_bus::{DEVICE_MESSAGE_TOPIC, MessageBus};
use iot_telemetry::{record_connection_evicted, record_connection_registered};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const MIN_HEARTBEAT_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Default)]
struct ConnectionTable {
    connections: HashMap<String, ConnectionInfo>,
    /// deviceID → clientID
    device_index: HashMap<String, String>,
}

/// 在线会话表。
///
/// 两张表共用一把读写锁；生命周期消息一律在释放锁之后投递到总线。
pub struct ConnectionManager {
    table: RwLock<ConnectionTable>,
    bus: Arc<dyn MessageBus>,
    server_id: String,
    max_connections: usize,
}

impl ConnectionManager {
    pub fn new(bus: Arc<dyn MessageBus>, server_id: impl Into<String>, max_connections: usize) -> Self {
        Self {
            table: RwLock::new(ConnectionTable::default()),
            bus,
            server_id: server_id.into(),
            max_connections,
        }
    }

    pub fn server_id(&self) -> &str {
        &self.server_id
    }

    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// 登记会话并投递上线消息。
    ///
    /// 同一设备的旧会话被新会话顶替；表满时拒绝新的 clientID。
    /// 上线与下线消息都带本次会话的 `sessionId`，目录据此判断下线是否仍属于当前会话。
    pub async fn register_connection(
        &self,
        client_id: &str,
        mut info: ConnectionInfo,
    ) -> Result<(), ConnectionError> {
        let now_ms = now_epoch_ms();
        info.client_id = client_id.to_string();
        info.session_id = uuid::Uuid::new_v4().to_string();
        info.connected_at_ms = now_ms;
        info.last_heartbeat_ms = now_ms;
        if info.server_id.is_empty() {
            info.server_id = self.server_id.clone();
        }
        {
            let mut table = self.write()?;
            if !table.connections.contains_key(client_id)
                && table.connections.len() >= self.max_connections
            {
                return Err(ConnectionError::LimitReached(self.max_connections));
            }
            if let Some(previous) = table
                .device_index
                .insert(info.device_id.clone(), client_id.to_string())
                && previous != client_id
            {
                table.connections.remove(&previous);
                debug!(
                    target: "iot.connection",
                    device_id = %info.device_id,
                    previous_client_id = %previous,
                    "connection_replaced"
                );
            }
            table.connections.insert(client_id.to_string(), info.clone());
        }
        record_connection_registered();
        info!(
            target: "iot.connection",
            client_id = %client_id,
            device_id = %info.device_id,
            server_id = %info.server_id,
            "connection_registered"
        );
        self.post_lifecycle(&info, DeviceState::Online).await;
        Ok(())
    }

    /// 移除会话并投递下线消息；会话不存在时返回 `None`。
    pub async fn unregister_connection(
        &self,
        client_id: &str,
    ) -> Result<Option<ConnectionInfo>, ConnectionError> {
        let removed = {
            let mut table = self.write()?;
            let removed = table.connections.remove(client_id);
            if let Some(info) = &removed
                && table.device_index.get(&info.device_id).map(String::as_str) == Some(client_id)
            {
                table.device_index.remove(&info.device_id);
            }
            removed
        };
        let Some(info) = removed else {
            return Ok(None);
        };
        info!(
            target: "iot.connection",
            client_id = %client_id,
            device_id = %info.device_id,
            "connection_unregistered"
        );
        self.post_lifecycle(&info, DeviceState::Offline).await;
        Ok(Some(info))
    }

    /// 刷新心跳，会话不存在时不做任何事。
    pub fn update_heartbeat(&self, client_id: &str) -> Result<bool, ConnectionError> {
        let mut table = self.write()?;
        match table.connections.get_mut(client_id) {
            Some(info) => {
                info.last_heartbeat_ms = now_epoch_ms();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn is_device_online(&self, device_id: &str) -> Result<bool, ConnectionError> {
        Ok(self.read()?.device_index.contains_key(device_id))
    }

    pub fn online_device_count(&self) -> Result<usize, ConnectionError> {
        Ok(self.read()?.connections.len())
    }

    pub fn client_id_for_device(&self, device_id: &str) -> Result<Option<String>, ConnectionError> {
        Ok(self.read()?.device_index.get(device_id).cloned())
    }

    pub fn connection(&self, client_id: &str) -> Result<Option<ConnectionInfo>, ConnectionError> {
        Ok(self.read()?.connections.get(client_id).cloned())
    }

    /// 清理超时会话，返回被清理的 clientID。
    ///
    /// 先在读锁下取快照算出过期集合，释放后再逐个 `unregister_connection`。
    pub async fn sweep_expired(&self, timeout: Duration) -> Result<Vec<String>, ConnectionError> {
        let now_ms = now_epoch_ms();
        let timeout_ms = timeout.as_millis() as i64;
        let expired: Vec<String> = {
            let table = self.read()?;
            table
                .connections
                .values()
                .filter(|info| now_ms - info.last_heartbeat_ms > timeout_ms)
                .map(|info| info.client_id.clone())
                .collect()
        };
        let mut evicted = Vec::with_capacity(expired.len());
        for client_id in expired {
            if let Some(info) = self.unregister_connection(&client_id).await? {
                record_connection_evicted();
                warn!(
                    target: "iot.connection",
                    client_id = %client_id,
                    device_id = %info.device_id,
                    idle_ms = now_ms - info.last_heartbeat_ms,
                    "heartbeat_timeout"
                );
                evicted.push(client_id);
            }
        }
        Ok(evicted)
    }

    /// 启动心跳扫描循环，取消令牌触发后退出。
    ///
    /// 扫描间隔至少 1ms。
    pub fn start_heartbeat_checker(
        self: &Arc<Self>,
        config: HeartbeatConfig,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let manager = Arc::clone(self);
        let interval = config.interval.max(MIN_HEARTBEAT_INTERVAL);
        tokio::spawn(async move {
            info!(
                target: "iot.connection",
                timeout_ms = config.timeout.as_millis() as u64,
                interval_ms = interval.as_millis() as u64,
                "heartbeat_checker_started"
            );
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(err) = manager.sweep_expired(config.timeout).await {
                            warn!(target: "iot.connection", error = %err, "heartbeat_sweep_failed");
                        }
                    }
                }
            }
            info!(target: "iot.connection", "heartbeat_checker_stopped");
        })
    }

    async fn post_lifecycle(&self, info: &ConnectionInfo, state: DeviceState) {
        let message = DeviceMessage::lifecycle(
            uuid::Uuid::new_v4().to_string(),
            info.device_id.clone(),
            info.tenant_id.clone(),
            info.server_id.clone(),
            state,
            now_epoch_ms(),
        )
        .with_session(info.session_id.clone());
        if let Err(err) = self.bus.post(DEVICE_MESSAGE_TOPIC, message).await {
            warn!(
                target: "iot.connection",
                device_id = %info.device_id,
                state = state.as_str(),
                error = %err,
                "lifecycle_post_failed"
            );
        }
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, ConnectionTable>, ConnectionError> {
        self.table
            .read()
            .map_err(|_| ConnectionError::Internal("lock failed".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, ConnectionTable>, ConnectionError> {
        self.table
            .write()
            .map_err(|_| ConnectionError::Internal("lock failed".to_string()))
    }
}
