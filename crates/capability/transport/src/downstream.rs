use crate::TransportError;
use async_trait::async_trait;
use domain::DeviceMessage;
use iot_bus::{BusError, Subscriber, gateway_downstream_topic};
use iot_protocol::{Codec, build_downstream_topic};
use iot_storage::DeviceStore;
use iot_telemetry::{record_downstream_failed, record_downstream_sent};
use std::sync::Arc;
use tracing::{info, warn};

/// 下行发布接口（MQTT 客户端或测试桩）。
#[async_trait]
pub trait DownstreamPublisher: Send + Sync {
    /// 以 QoS 1 发布。
    async fn publish(&self, topic: String, payload: Vec<u8>) -> Result<(), TransportError>;
}

/// 构造下行 Topic 并编码发布。
pub struct DownstreamSender {
    topic_prefix: String,
    codec: Arc<dyn Codec>,
    publisher: Arc<dyn DownstreamPublisher>,
}

impl DownstreamSender {
    pub fn new(
        topic_prefix: impl Into<String>,
        codec: Arc<dyn Codec>,
        publisher: Arc<dyn DownstreamPublisher>,
    ) -> Self {
        Self {
            topic_prefix: topic_prefix.into(),
            codec,
            publisher,
        }
    }

    pub async fn send_downstream_message(
        &self,
        product_key: &str,
        device_name: &str,
        message: &DeviceMessage,
    ) -> Result<(), TransportError> {
        let topic = build_downstream_topic(
            &self.topic_prefix,
            product_key,
            device_name,
            &message.method,
            message.code.is_some(),
        );
        let payload = self.codec.encode(message)?;
        let payload_size = payload.len();
        match self.publisher.publish(topic.clone(), payload).await {
            Ok(()) => {
                record_downstream_sent();
                info!(
                    target: "iot.transport",
                    device_id = %message.device_id,
                    topic = %topic,
                    request_id = %message.request_id,
                    payload_size,
                    "downstream_message_published"
                );
                Ok(())
            }
            Err(err) => {
                record_downstream_failed();
                warn!(
                    target: "iot.transport",
                    device_id = %message.device_id,
                    topic = %topic,
                    error = %err,
                    "downstream_publish_failed"
                );
                Err(err)
            }
        }
    }
}

/// 订阅本实例下行主题，按 deviceID 找到 productKey/deviceName 后发布。
pub struct DownstreamSubscriber {
    server_id: String,
    devices: Arc<dyn DeviceStore>,
    sender: Arc<DownstreamSender>,
}

impl DownstreamSubscriber {
    pub fn new(
        server_id: impl Into<String>,
        devices: Arc<dyn DeviceStore>,
        sender: Arc<DownstreamSender>,
    ) -> Self {
        Self {
            server_id: server_id.into(),
            devices,
            sender,
        }
    }
}

#[async_trait]
impl Subscriber for DownstreamSubscriber {
    fn topic(&self) -> String {
        gateway_downstream_topic(&self.server_id)
    }

    fn group(&self) -> &str {
        "transport-downstream"
    }

    async fn on_message(&self, message: DeviceMessage) -> Result<(), BusError> {
        let device = self
            .devices
            .find_device(&message.device_id)
            .await
            .map_err(|err| BusError::Subscriber(err.to_string()))?
            .ok_or_else(|| {
                BusError::Subscriber(format!("device not found: {}", message.device_id))
            })?;
        self.sender
            .send_downstream_message(&device.product_key, &device.device_name, &message)
            .await
            .map_err(|err| BusError::Subscriber(err.to_string()))
    }
}
