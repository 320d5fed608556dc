//! # MQTT 传输适配
//!
//! - **上行**：`{prefix}/{productKey}/{deviceName}/...` 的 publish 经默认 Codec 解码，
//!   补齐设备归属后投递到总线主题 `iot_device_message`
//! - **下行**：`send_downstream_message` 构造下行 Topic、编码后以 QoS 1 发布；
//!   [`DownstreamSubscriber`] 订阅本实例的 `iot_gateway_downstream_{serverID}`
//!
//! 格式错误或来路不明的流量只丢弃并记录，不影响 Broker 连接。

mod downstream;
mod mqtt;
mod upstream;

use iot_protocol::ProtocolError;
use std::time::Duration;

pub use downstream::{DownstreamPublisher, DownstreamSender, DownstreamSubscriber};
pub use mqtt::MqttTransport;
pub use upstream::UpstreamHandler;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("mqtt connect error: {0}")]
    Connect(String),
    #[error("mqtt publish error: {0}")]
    Publish(String),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error("unknown device: {product_key}&{device_name}")]
    UnknownDevice {
        product_key: String,
        device_name: String,
    },
    #[error("device lookup error: {0}")]
    Lookup(String),
    #[error("bus error: {0}")]
    Bus(String),
}

/// MQTT 传输配置。
#[derive(Debug, Clone)]
pub struct MqttTransportConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub client_id: String,
    pub keep_alive: Duration,
    /// 等待 ConnAck 的期限
    pub connect_timeout: Duration,
    /// 事件循环出错后是否继续轮询（rumqttc 在下一次 poll 时重连）
    pub auto_reconnect: bool,
    pub reconnect_delay: Duration,
    pub clean_session: bool,
    /// 默认上行过滤器之外的附加订阅
    pub subscribe_topics: Vec<String>,
    pub topic_prefix: String,
}

impl Default for MqttTransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 1883,
            username: None,
            password: None,
            client_id: "iot-gateway".to_string(),
            keep_alive: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            auto_reconnect: true,
            reconnect_delay: Duration::from_millis(2000),
            clean_session: true,
            subscribe_topics: Vec::new(),
            topic_prefix: "/sys".to_string(),
        }
    }
}

impl MqttTransportConfig {
    /// 默认上行过滤器加配置的附加过滤器，去重后保持顺序。
    pub fn subscription_filters(&self) -> Vec<String> {
        let mut filters = iot_protocol::upstream_filters(&self.topic_prefix);
        for topic in &self.subscribe_topics {
            let topic = topic.trim();
            if !topic.is_empty() && !filters.iter().any(|item| item == topic) {
                filters.push(topic.to_string());
            }
        }
        filters
    }
}
