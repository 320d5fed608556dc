//! 规范设备消息。
//!
//! 所有编解码器都与 [`DeviceMessage`] 互相转换；消息按事件创建，
//! 除异步审计行外不做保留。

use crate::method;
use crate::payload::{MessagePayload, PayloadError};
use crate::status::DeviceState;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

const SESSION_PARAM: &str = "sessionId";

/// 消息方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageDirection {
    /// 设备发往平台。
    #[default]
    Upstream,
    /// 平台发往设备。
    Downstream,
}

impl MessageDirection {
    /// 未显式给出方向时的推断：`code` 与 `data` 均为空视为上行。
    pub fn infer(code: Option<i32>, data: Option<&Value>) -> Self {
        let has_data = matches!(data, Some(value) if !value.is_null());
        if code.is_none() && !has_data {
            MessageDirection::Upstream
        } else {
            MessageDirection::Downstream
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MessageDirection::Upstream => "upstream",
            MessageDirection::Downstream => "downstream",
        }
    }

    /// 按名称解析（忽略大小写）。
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "upstream" => Some(MessageDirection::Upstream),
            "downstream" => Some(MessageDirection::Downstream),
            _ => None,
        }
    }
}

/// 规范设备消息。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceMessage {
    pub id: String,
    pub request_id: String,
    pub method: String,
    pub params: Option<Map<String, Value>>,
    pub data: Option<Value>,
    pub code: Option<i32>,
    pub msg: Option<String>,
    pub device_id: String,
    pub tenant_id: String,
    /// 设备当前所在的网关实例。
    pub server_id: String,
    pub report_time_ms: i64,
    pub direction: MessageDirection,
}

impl DeviceMessage {
    /// 构造上下线生命周期消息（`params: {state}`）。
    pub fn lifecycle(
        id: impl Into<String>,
        device_id: impl Into<String>,
        tenant_id: impl Into<String>,
        server_id: impl Into<String>,
        state: DeviceState,
        report_time_ms: i64,
    ) -> Self {
        let id = id.into();
        let mut params = Map::new();
        params.insert("state".to_string(), Value::String(state.as_str().to_string()));
        Self {
            request_id: id.clone(),
            id,
            method: method::STATE_UPDATE.to_string(),
            params: Some(params),
            device_id: device_id.into(),
            tenant_id: tenant_id.into(),
            server_id: server_id.into(),
            report_time_ms,
            direction: MessageDirection::Upstream,
            ..Default::default()
        }
    }

    /// 在生命周期消息上附带会话标识。
    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.params
            .get_or_insert_with(Map::new)
            .insert(SESSION_PARAM.to_string(), Value::String(session_id.into()));
        self
    }

    /// 生命周期消息携带的会话标识。
    pub fn session_id(&self) -> Option<&str> {
        self.params
            .as_ref()
            .and_then(|params| params.get(SESSION_PARAM))
            .and_then(Value::as_str)
    }

    /// 基于当前上行消息合成回复：保留 requestID，方法追加 `_reply`。
    pub fn reply(&self, id: impl Into<String>, code: i32, msg: impl Into<String>, now_ms: i64) -> Self {
        Self {
            id: id.into(),
            request_id: self.request_id.clone(),
            method: method::reply_method(&self.method),
            params: None,
            data: None,
            code: Some(code),
            msg: Some(msg.into()),
            device_id: self.device_id.clone(),
            tenant_id: self.tenant_id.clone(),
            server_id: self.server_id.clone(),
            report_time_ms: now_ms,
            direction: MessageDirection::Downstream,
        }
    }

    pub fn is_reply(&self) -> bool {
        method::is_reply(&self.method)
    }

    /// 按方法族解析类型化载荷。
    pub fn payload(&self) -> Result<MessagePayload, PayloadError> {
        MessagePayload::parse(&self.method, self.params.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn infer_direction() {
        assert_eq!(MessageDirection::infer(None, None), MessageDirection::Upstream);
        assert_eq!(
            MessageDirection::infer(None, Some(&Value::Null)),
            MessageDirection::Upstream
        );
        assert_eq!(MessageDirection::infer(Some(0), None), MessageDirection::Downstream);
        assert_eq!(
            MessageDirection::infer(None, Some(&json!({"k": 1}))),
            MessageDirection::Downstream
        );
    }

    #[test]
    fn lifecycle_message_carries_state() {
        let message = DeviceMessage::lifecycle("m-1", "dev-1", "t-1", "gw-1", DeviceState::Online, 7);
        assert_eq!(message.method, method::STATE_UPDATE);
        assert_eq!(message.request_id, "m-1");
        assert_eq!(
            message.params.as_ref().and_then(|p| p.get("state")),
            Some(&json!("online"))
        );
    }

    #[test]
    fn lifecycle_session_round_trips_through_params() {
        let message = DeviceMessage::lifecycle("m-1", "dev-1", "t-1", "gw-1", DeviceState::Offline, 7)
            .with_session("sess-1");
        assert_eq!(message.session_id(), Some("sess-1"));
        assert_eq!(
            message.params.as_ref().and_then(|p| p.get("state")),
            Some(&json!("offline"))
        );
        assert_eq!(DeviceMessage::default().session_id(), None);
    }

    #[test]
    fn reply_keeps_request_id() {
        let mut request = DeviceMessage::default();
        request.request_id = "req-9".to_string();
        request.method = method::PROPERTY_POST.to_string();
        request.device_id = "dev-1".to_string();
        let reply = request.reply("r-1", 0, "success", 10);
        assert_eq!(reply.request_id, "req-9");
        assert_eq!(reply.method, "thing.event.property.post_reply");
        assert_eq!(reply.code, Some(0));
        assert_eq!(reply.direction, MessageDirection::Downstream);
        assert!(reply.is_reply());
    }
}
