use crate::DeviceMessageService;
use async_trait::async_trait;
use domain::DeviceMessage;
use iot_bus::{BusError, DEVICE_MESSAGE_TOPIC, Subscriber};
use std::sync::Arc;

/// `iot_device_message` 的订阅者。
pub struct UpstreamMessageSubscriber {
    service: Arc<DeviceMessageService>,
}

impl UpstreamMessageSubscriber {
    pub fn new(service: Arc<DeviceMessageService>) -> Self {
        Self { service }
    }
}

#[async_trait]
impl Subscriber for UpstreamMessageSubscriber {
    fn topic(&self) -> String {
        DEVICE_MESSAGE_TOPIC.to_string()
    }

    fn group(&self) -> &str {
        "pipeline-upstream"
    }

    async fn on_message(&self, message: DeviceMessage) -> Result<(), BusError> {
        self.service
            .handle_upstream_device_message(message)
            .await
            .map_err(|err| BusError::Subscriber(err.to_string()))
    }
}
