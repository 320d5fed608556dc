use crate::TransportError;
use domain::{DeviceMessage, MessageDirection, now_epoch_ms};
use iot_auth::DeviceLookup;
use iot_bus::{DEVICE_MESSAGE_TOPIC, MessageBus};
use iot_connection::ConnectionManager;
use iot_protocol::{Codec, method_from_topic, parse_topic};
use iot_telemetry::{record_upstream_decoded, record_upstream_dropped, record_upstream_received};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 上行 publish 处理器：Topic 解析 → 解码 → 补齐归属 → 投递总线。
pub struct UpstreamHandler {
    topic_prefix: String,
    server_id: String,
    codec: Arc<dyn Codec>,
    lookup: Arc<DeviceLookup>,
    connections: Arc<ConnectionManager>,
    bus: Arc<dyn MessageBus>,
}

impl UpstreamHandler {
    pub fn new(
        topic_prefix: impl Into<String>,
        server_id: impl Into<String>,
        codec: Arc<dyn Codec>,
        lookup: Arc<DeviceLookup>,
        connections: Arc<ConnectionManager>,
        bus: Arc<dyn MessageBus>,
    ) -> Self {
        Self {
            topic_prefix: topic_prefix.into(),
            server_id: server_id.into(),
            codec,
            lookup,
            connections,
            bus,
        }
    }

    /// 处理一条 publish；失败时已记录丢弃，调用方只需忽略。
    pub async fn handle_publish(
        &self,
        topic: &str,
        payload: &[u8],
    ) -> Result<DeviceMessage, TransportError> {
        record_upstream_received();
        let result = self.process(topic, payload).await;
        if let Err(err) = &result {
            record_upstream_dropped();
            warn!(
                target: "iot.transport",
                topic = %topic,
                payload_size = payload.len(),
                error = %err,
                "upstream_message_dropped"
            );
        }
        result
    }

    async fn process(&self, topic: &str, payload: &[u8]) -> Result<DeviceMessage, TransportError> {
        let parts = parse_topic(&self.topic_prefix, topic)?;
        let mut message = self.codec.decode(payload)?;
        if message.method.is_empty() {
            message.method = method_from_topic(&parts.rest);
        }
        let device = self
            .lookup
            .find(&parts.product_key, &parts.device_name)
            .await
            .map_err(|err| TransportError::Lookup(err.to_string()))?
            .ok_or_else(|| TransportError::UnknownDevice {
                product_key: parts.product_key.clone(),
                device_name: parts.device_name.clone(),
            })?;
        record_upstream_decoded();

        message.id = uuid::Uuid::new_v4().to_string();
        message.device_id = device.device_id.clone();
        message.tenant_id = device.tenant_id.clone();
        message.server_id = self.server_id.clone();
        message.report_time_ms = now_epoch_ms();
        message.direction = MessageDirection::Upstream;

        self.touch_heartbeat(&device.device_id);

        self.bus
            .post(DEVICE_MESSAGE_TOPIC, message.clone())
            .await
            .map_err(|err| TransportError::Bus(err.to_string()))?;
        info!(
            target: "iot.transport",
            device_id = %message.device_id,
            method = %message.method,
            request_id = %message.request_id,
            "upstream_message_posted"
        );
        Ok(message)
    }

    /// 有会话的设备每次上行都刷新心跳。
    fn touch_heartbeat(&self, device_id: &str) {
        match self.connections.client_id_for_device(device_id) {
            Ok(Some(client_id)) => {
                if let Err(err) = self.connections.update_heartbeat(&client_id) {
                    warn!(target: "iot.transport", device_id = %device_id, error = %err, "heartbeat_update_failed");
                }
            }
            Ok(None) => {
                debug!(target: "iot.transport", device_id = %device_id, "upstream_without_session");
            }
            Err(err) => {
                warn!(target: "iot.transport", device_id = %device_id, error = %err, "heartbeat_update_failed");
            }
        }
    }
}
