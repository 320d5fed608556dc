use crate::{AuditWriter, PipelineError, SendMessageRequest};
use async_trait::async_trait;
use domain::{
    DeviceMessage, DeviceState, MessageDirection, MessagePayload, method, now_epoch_ms,
};
use iot_bus::{DEVICE_MESSAGE_TOPIC, MessageBus, gateway_downstream_topic};
use iot_ota::{OtaCommandSender, OtaError, OtaService};
use iot_storage::{
    DeviceMessageRecord, DevicePropertyRecord, DevicePropertyStore, DeviceRecord, DeviceStore,
    DeviceUpdate, GatewayDirectory,
};
use iot_telemetry::record_reply_sent;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 分发结果：被丢弃的消息不回复。
enum Dispatched {
    Handled,
    Dropped,
}

/// 设备消息服务。
pub struct DeviceMessageService {
    devices: Arc<dyn DeviceStore>,
    properties: Arc<dyn DevicePropertyStore>,
    directory: Arc<dyn GatewayDirectory>,
    bus: Arc<dyn MessageBus>,
    audit: AuditWriter,
    ota: Arc<OtaService>,
}

impl DeviceMessageService {
    pub fn new(
        devices: Arc<dyn DeviceStore>,
        properties: Arc<dyn DevicePropertyStore>,
        directory: Arc<dyn GatewayDirectory>,
        bus: Arc<dyn MessageBus>,
        audit: AuditWriter,
        ota: Arc<OtaService>,
    ) -> Self {
        Self {
            devices,
            properties,
            directory,
            bus,
            audit,
            ota,
        }
    }

    pub fn ota(&self) -> &Arc<OtaService> {
        &self.ota
    }

    /// 业务侧发送：新 UUID 同时作为 `id` 与 `requestId`。
    pub async fn send_device_message(
        &self,
        device_id: &str,
        request: SendMessageRequest,
    ) -> Result<DeviceMessage, PipelineError> {
        if request.method.trim().is_empty() {
            return Err(PipelineError::InvalidMessage("method is required".to_string()));
        }
        let device = self.require_device(device_id).await?;
        let id = uuid::Uuid::new_v4().to_string();
        let direction = request
            .direction
            .unwrap_or_else(|| MessageDirection::infer(request.code, request.data.as_ref()));
        let message = DeviceMessage {
            request_id: id.clone(),
            id,
            method: request.method.trim().to_string(),
            params: request.params,
            data: request.data,
            code: request.code,
            msg: request.msg,
            report_time_ms: now_epoch_ms(),
            direction,
            ..Default::default()
        };
        self.send(&device, message).await
    }

    /// 内部发送：补齐设备归属后按方向路由。
    pub async fn send(
        &self,
        device: &DeviceRecord,
        mut message: DeviceMessage,
    ) -> Result<DeviceMessage, PipelineError> {
        message.device_id = device.device_id.clone();
        message.tenant_id = device.tenant_id.clone();
        match message.direction {
            MessageDirection::Upstream => {
                self.bus
                    .post(DEVICE_MESSAGE_TOPIC, message.clone())
                    .await
                    .map_err(|err| PipelineError::Bus(err.to_string()))?;
                debug!(
                    target: "iot.pipeline",
                    device_id = %message.device_id,
                    method = %message.method,
                    "upstream_message_injected"
                );
            }
            MessageDirection::Downstream => {
                let server_id = self.resolve_owner(&message).await?;
                message.server_id = server_id;
                self.audit.record(&message).await;
                self.bus
                    .post(&gateway_downstream_topic(&message.server_id), message.clone())
                    .await
                    .map_err(|err| PipelineError::Bus(err.to_string()))?;
                info!(
                    target: "iot.pipeline",
                    device_id = %message.device_id,
                    method = %message.method,
                    server_id = %message.server_id,
                    request_id = %message.request_id,
                    "downstream_message_routed"
                );
            }
        }
        Ok(message)
    }

    /// 处理一条上行消息：审计、分发，必要时回复。
    pub async fn handle_upstream_device_message(
        &self,
        message: DeviceMessage,
    ) -> Result<(), PipelineError> {
        self.audit.record(&message).await;
        let device = self.require_device(&message.device_id).await?;
        if message.is_reply() {
            debug!(
                target: "iot.pipeline",
                device_id = %device.device_id,
                method = %message.method,
                request_id = %message.request_id,
                code = ?message.code,
                "device_reply_received"
            );
            return Ok(());
        }

        let result = self.dispatch(&device, &message).await;
        let outcome = match &result {
            Ok(Dispatched::Handled) => Some((0, "success".to_string())),
            Ok(Dispatched::Dropped) => None,
            Err(err) => {
                warn!(
                    target: "iot.pipeline",
                    device_id = %device.device_id,
                    method = %message.method,
                    error = %err,
                    "upstream_handle_failed"
                );
                Some((err.reply_code(), err.to_string()))
            }
        };
        if let Some((code, msg)) = outcome
            && method::reply_required(&message.method)
            && !message.server_id.is_empty()
        {
            let reply = message.reply(uuid::Uuid::new_v4().to_string(), code, msg, now_epoch_ms());
            match self.send(&device, reply).await {
                Ok(_) => record_reply_sent(),
                Err(err) => warn!(
                    target: "iot.pipeline",
                    device_id = %device.device_id,
                    request_id = %message.request_id,
                    error = %err,
                    "reply_send_failed"
                ),
            }
        }
        result.map(|_| ())
    }

    /// 推送 OTA 任务的升级指令。
    pub async fn push_ota_task(&self, task_id: &str) -> Result<usize, PipelineError> {
        Ok(self.ota.push_task(task_id, self).await?)
    }

    pub async fn property_history(
        &self,
        device_id: &str,
        identifier: &str,
    ) -> Result<Vec<DevicePropertyRecord>, PipelineError> {
        self.require_device(device_id).await?;
        Ok(self
            .properties
            .list_property_history(device_id, identifier)
            .await?)
    }

    pub async fn device_messages(
        &self,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<DeviceMessageRecord>, PipelineError> {
        self.require_device(device_id).await?;
        Ok(self
            .audit
            .store()
            .list_device_messages(device_id, limit)
            .await?)
    }

    /// 停机时排空审计任务。
    pub async fn drain(&self, deadline: Duration) -> bool {
        self.audit.drain(deadline).await
    }

    async fn dispatch(
        &self,
        device: &DeviceRecord,
        message: &DeviceMessage,
    ) -> Result<Dispatched, PipelineError> {
        let payload = message
            .payload()
            .map_err(|err| PipelineError::InvalidMessage(err.to_string()))?;
        match payload {
            MessagePayload::StateUpdate(state) => {
                self.update_state(device, state, message).await?;
            }
            MessagePayload::PropertyPost(params) => {
                self.append_properties(device, &params, message.report_time_ms)
                    .await?;
            }
            MessagePayload::EventPost(event) => {
                info!(
                    target: "iot.pipeline",
                    device_id = %device.device_id,
                    identifier = event.identifier.as_deref().unwrap_or(""),
                    "device_event_accepted"
                );
            }
            MessagePayload::OtaProgress(progress) => {
                self.ota
                    .update_ota_record_progress(device, &progress)
                    .await?;
            }
            MessagePayload::Generic => {
                warn!(
                    target: "iot.pipeline",
                    device_id = %device.device_id,
                    method = %message.method,
                    "unsupported_method_dropped"
                );
                return Ok(Dispatched::Dropped);
            }
        }
        Ok(Dispatched::Handled)
    }

    /// 更新设备状态并维护网关目录。
    ///
    /// 上线按会话绑定；下线仅在目录仍指向同一实例、同一会话时解绑。
    /// 目录已被其他会话占有时，迟到的下线不改写设备状态。
    async fn update_state(
        &self,
        device: &DeviceRecord,
        state: DeviceState,
        message: &DeviceMessage,
    ) -> Result<(), PipelineError> {
        let server_id = message.server_id.as_str();
        let session_id = message.session_id().unwrap_or("");
        if !server_id.is_empty() {
            match state {
                DeviceState::Online => {
                    self.directory
                        .bind(&device.device_id, server_id, session_id)
                        .await?;
                }
                DeviceState::Offline => {
                    let unbound = self
                        .directory
                        .unbind_if_owner(&device.device_id, server_id, session_id)
                        .await?;
                    if !unbound
                        && let Some(owner) = self.directory.owner(&device.device_id).await?
                    {
                        info!(
                            target: "iot.pipeline",
                            device_id = %device.device_id,
                            server_id = %server_id,
                            session_id = %session_id,
                            owner = %owner,
                            "stale_offline_ignored"
                        );
                        return Ok(());
                    }
                }
                DeviceState::Inactive => {}
            }
        }
        let update = DeviceUpdate {
            state: Some(state),
            ..Default::default()
        };
        self.devices
            .update_device(&device.device_id, update)
            .await?
            .ok_or_else(|| PipelineError::DeviceNotExists(device.device_id.clone()))?;
        info!(
            target: "iot.pipeline",
            device_id = %device.device_id,
            state = state.as_str(),
            server_id = %server_id,
            "device_state_updated"
        );
        Ok(())
    }

    /// 每次上报为每个标识符追加一行历史。
    async fn append_properties(
        &self,
        device: &DeviceRecord,
        params: &Map<String, Value>,
        report_time_ms: i64,
    ) -> Result<(), PipelineError> {
        let report_time_ms = if report_time_ms > 0 {
            report_time_ms
        } else {
            now_epoch_ms()
        };
        let rows: Vec<DevicePropertyRecord> = params
            .iter()
            .map(|(identifier, value)| DevicePropertyRecord {
                device_id: device.device_id.clone(),
                tenant_id: device.tenant_id.clone(),
                identifier: identifier.clone(),
                value: property_text(value),
                report_time_ms,
            })
            .collect();
        if rows.is_empty() {
            return Ok(());
        }
        let count = rows.len();
        self.properties.append_properties(rows).await?;
        debug!(target: "iot.pipeline", device_id = %device.device_id, count, "device_properties_appended");
        Ok(())
    }

    async fn resolve_owner(&self, message: &DeviceMessage) -> Result<String, PipelineError> {
        if !message.server_id.is_empty() {
            return Ok(message.server_id.clone());
        }
        self.directory
            .owner(&message.device_id)
            .await?
            .ok_or_else(|| PipelineError::GatewayUnavailable(message.device_id.clone()))
    }

    async fn require_device(&self, device_id: &str) -> Result<DeviceRecord, PipelineError> {
        self.devices
            .find_device(device_id)
            .await?
            .ok_or_else(|| PipelineError::DeviceNotExists(device_id.to_string()))
    }
}

#[async_trait]
impl OtaCommandSender for DeviceMessageService {
    async fn send_upgrade(&self, message: DeviceMessage) -> Result<(), OtaError> {
        let device = self
            .require_device(&message.device_id)
            .await
            .map_err(|err| OtaError::Dispatch(err.to_string()))?;
        self.send(&device, message)
            .await
            .map(|_| ())
            .map_err(|err| OtaError::Dispatch(err.to_string()))
    }
}

/// 字符串原样保存，其余值保存 JSON 文本。
fn property_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}
