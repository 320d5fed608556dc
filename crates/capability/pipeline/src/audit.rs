use crate::PipelineConfig;
use domain::DeviceMessage;
use iot_bus::BoundedSpawner;
use iot_storage::{DeviceMessageRecord, DeviceMessageStore};
use iot_telemetry::record_audit_failure;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

/// 异步审计写入，受有界任务池约束，停机时排空。
pub struct AuditWriter {
    store: Arc<dyn DeviceMessageStore>,
    spawner: BoundedSpawner,
}

impl AuditWriter {
    pub fn new(store: Arc<dyn DeviceMessageStore>, config: PipelineConfig) -> Self {
        Self {
            store,
            spawner: BoundedSpawner::new("audit", config.audit_max_in_flight, config.audit_timeout),
        }
    }

    pub fn store(&self) -> &Arc<dyn DeviceMessageStore> {
        &self.store
    }

    /// 投递一条审计写入；不等待落库结果。
    pub async fn record(&self, message: &DeviceMessage) {
        let record = to_record(message);
        let store = self.store.clone();
        let spawned = self
            .spawner
            .spawn(async move {
                let message_id = record.message_id.clone();
                if let Err(err) = store.append_message(record).await {
                    record_audit_failure();
                    warn!(target: "iot.pipeline", message_id = %message_id, error = %err, "audit_write_failed");
                }
            })
            .await;
        if let Err(err) = spawned {
            record_audit_failure();
            warn!(target: "iot.pipeline", message_id = %message.id, error = %err, "audit_rejected");
        }
    }

    pub async fn drain(&self, deadline: Duration) -> bool {
        self.spawner.drain(deadline).await
    }
}

fn to_record(message: &DeviceMessage) -> DeviceMessageRecord {
    DeviceMessageRecord {
        message_id: message.id.clone(),
        request_id: message.request_id.clone(),
        tenant_id: message.tenant_id.clone(),
        device_id: message.device_id.clone(),
        server_id: message.server_id.clone(),
        method: message.method.clone(),
        direction: message.direction.as_str().to_string(),
        code: message.code,
        payload: serde_json::to_string(message).unwrap_or_else(|_| "{}".to_string()),
        report_time_ms: message.report_time_ms,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use domain::MessageDirection;

    #[test]
    fn record_keeps_routing_fields() {
        let message = DeviceMessage {
            id: "m-1".to_string(),
            request_id: "r-1".to_string(),
            method: "thing.property.set".to_string(),
            device_id: "dev-1".to_string(),
            server_id: "gw-1".to_string(),
            direction: MessageDirection::Downstream,
            report_time_ms: 42,
            ..Default::default()
        };
        let record = to_record(&message);
        assert_eq!(record.direction, "downstream");
        assert_eq!(record.server_id, "gw-1");
        assert!(record.payload.contains("\"requestId\":\"r-1\""));
    }
}
