//! 按方法族区分的类型化载荷。
//!
//! 线上格式仍是 JSON 的 `params` 对象，这里只在解码时做校验与分类。

use crate::method;
use crate::status::{DeviceState, OtaRecordStatus};
use serde_json::{Map, Value};

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("missing params for {0}")]
    MissingParams(String),
    #[error("invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
}

impl PayloadError {
    fn invalid(field: &str, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.to_string(),
            reason: reason.into(),
        }
    }
}

/// 事件上报。
#[derive(Debug, Clone, PartialEq)]
pub struct EventPost {
    pub identifier: Option<String>,
    pub params: Map<String, Value>,
}

/// OTA 进度上报。
#[derive(Debug, Clone, PartialEq)]
pub struct OtaProgress {
    pub version: Option<String>,
    pub status: OtaRecordStatus,
    pub progress: Option<u8>,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MessagePayload {
    PropertyPost(Map<String, Value>),
    EventPost(EventPost),
    StateUpdate(DeviceState),
    OtaProgress(OtaProgress),
    /// 回复、下行命令与未登记方法，不做结构约束。
    Generic,
}

impl MessagePayload {
    pub fn parse(method_name: &str, params: Option<&Map<String, Value>>) -> Result<Self, PayloadError> {
        if method::is_reply(method_name) {
            return Ok(MessagePayload::Generic);
        }
        match method_name {
            method::PROPERTY_POST => {
                let params = params.ok_or_else(|| PayloadError::MissingParams(method_name.to_string()))?;
                Ok(MessagePayload::PropertyPost(params.clone()))
            }
            method::EVENT_POST => {
                let params = params.cloned().unwrap_or_default();
                let identifier = params
                    .get("identifier")
                    .and_then(Value::as_str)
                    .map(str::to_string);
                Ok(MessagePayload::EventPost(EventPost { identifier, params }))
            }
            method::STATE_UPDATE => {
                let params = params.ok_or_else(|| PayloadError::MissingParams(method_name.to_string()))?;
                let state = match params.get("state").and_then(Value::as_str) {
                    Some("online") => DeviceState::Online,
                    Some("offline") => DeviceState::Offline,
                    Some(other) => return Err(PayloadError::invalid("state", other)),
                    None => return Err(PayloadError::invalid("state", "missing")),
                };
                Ok(MessagePayload::StateUpdate(state))
            }
            method::OTA_PROGRESS => {
                let params = params.ok_or_else(|| PayloadError::MissingParams(method_name.to_string()))?;
                parse_ota_progress(params).map(MessagePayload::OtaProgress)
            }
            _ => Ok(MessagePayload::Generic),
        }
    }
}

fn parse_ota_progress(params: &Map<String, Value>) -> Result<OtaProgress, PayloadError> {
    let status = match params.get("status") {
        Some(Value::Number(number)) => number
            .as_i64()
            .and_then(OtaRecordStatus::from_code)
            .ok_or_else(|| PayloadError::invalid("status", number.to_string()))?,
        Some(Value::String(text)) => text
            .trim()
            .parse::<i64>()
            .ok()
            .and_then(OtaRecordStatus::from_code)
            .or_else(|| OtaRecordStatus::from_name(text))
            .ok_or_else(|| PayloadError::invalid("status", text.as_str()))?,
        Some(other) => return Err(PayloadError::invalid("status", other.to_string())),
        None => return Err(PayloadError::invalid("status", "missing")),
    };
    let progress = match params.get("progress") {
        None | Some(Value::Null) => None,
        Some(value) => {
            let number = value
                .as_u64()
                .filter(|number| *number <= 100)
                .ok_or_else(|| PayloadError::invalid("progress", value.to_string()))?;
            Some(number as u8)
        }
    };
    Ok(OtaProgress {
        version: params.get("version").and_then(Value::as_str).map(str::to_string),
        status,
        progress,
        description: params
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}
