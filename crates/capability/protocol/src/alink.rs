//! Alink JSON 编解码器
//!
//! 线上结构：`{id, version:"1.0", method?, params?, data?, code?, msg?}`。
//! `id` 承载消息的 requestID；请求不带 `code`，回复带 `code`（0 为成功）。

use crate::codec::Codec;
use crate::error::ProtocolError;
use domain::{DeviceMessage, MessageDirection, MessagePayload};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const ALINK_CODEC_TYPE: &str = "Alink";
pub const ALINK_VERSION: &str = "1.0";

#[derive(Debug, Serialize, Deserialize)]
struct AlinkFrame {
    #[serde(default)]
    id: Value,
    #[serde(default)]
    version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    code: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    msg: Option<String>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AlinkCodec;

impl Codec for AlinkCodec {
    fn codec_type(&self) -> &str {
        ALINK_CODEC_TYPE
    }

    fn encode(&self, message: &DeviceMessage) -> Result<Vec<u8>, ProtocolError> {
        let frame = AlinkFrame {
            id: Value::String(message.request_id.clone()),
            version: Some(ALINK_VERSION.to_string()),
            method: (!message.method.is_empty()).then(|| message.method.clone()),
            params: message.params.clone().map(Value::Object),
            data: message.data.clone(),
            code: message.code,
            msg: message.msg.clone(),
        };
        serde_json::to_vec(&frame).map_err(|err| ProtocolError::Encode(err.to_string()))
    }

    fn decode(&self, payload: &[u8]) -> Result<DeviceMessage, ProtocolError> {
        let frame: AlinkFrame = serde_json::from_slice(payload)
            .map_err(|err| ProtocolError::InvalidPayload(err.to_string()))?;
        let version = frame.version.unwrap_or_default();
        if version != ALINK_VERSION {
            return Err(ProtocolError::UnsupportedVersion(version));
        }
        let request_id = id_to_string(&frame.id)?;
        let params = normalize_params(frame.params)?;
        let method = frame.method.unwrap_or_default();
        if !method.is_empty() {
            MessagePayload::parse(&method, params.as_ref())
                .map_err(|err| ProtocolError::InvalidParams(err.to_string()))?;
        }
        Ok(DeviceMessage {
            id: request_id.clone(),
            request_id,
            method,
            params,
            data: frame.data.filter(|value| !value.is_null()),
            code: frame.code,
            msg: frame.msg,
            direction: MessageDirection::Upstream,
            ..Default::default()
        })
    }
}

fn id_to_string(id: &Value) -> Result<String, ProtocolError> {
    match id {
        Value::String(text) => Ok(text.clone()),
        Value::Number(number) => Ok(number.to_string()),
        Value::Null => Ok(String::new()),
        other => Err(ProtocolError::InvalidPayload(format!("id: {}", other))),
    }
}

/// params 统一为字符串键的对象；非对象时按 JSON 文本再解析一次。
fn normalize_params(params: Option<Value>) -> Result<Option<Map<String, Value>>, ProtocolError> {
    match params {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(Value::String(text)) => serde_json::from_str::<Map<String, Value>>(&text)
            .map(Some)
            .map_err(|err| ProtocolError::InvalidParams(err.to_string())),
        Some(other) => Err(ProtocolError::InvalidParams(format!(
            "params must be an object, got {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decode_property_post() {
        let payload =
            br#"{"id":"1","version":"1.0","method":"thing.event.property.post","params":{"temp":"21.5"}}"#;
        let message = AlinkCodec.decode(payload).expect("decode");
        assert_eq!(message.request_id, "1");
        assert_eq!(message.method, "thing.event.property.post");
        assert_eq!(
            message.params.as_ref().and_then(|p| p.get("temp")),
            Some(&json!("21.5"))
        );
        assert!(message.code.is_none());
    }

    #[test]
    fn decode_rejects_other_versions() {
        let payload = br#"{"id":"1","version":"2.0","method":"thing.event.post"}"#;
        assert!(matches!(
            AlinkCodec.decode(payload),
            Err(ProtocolError::UnsupportedVersion(version)) if version == "2.0"
        ));
        let missing = br#"{"id":"1","method":"thing.event.post"}"#;
        assert!(matches!(
            AlinkCodec.decode(missing),
            Err(ProtocolError::UnsupportedVersion(_))
        ));
    }

    #[test]
    fn decode_accepts_numeric_id_and_string_params() {
        let payload = br#"{"id":42,"version":"1.0","method":"thing.event.property.post","params":"{\"hum\":60}"}"#;
        let message = AlinkCodec.decode(payload).expect("decode");
        assert_eq!(message.request_id, "42");
        assert_eq!(
            message.params.as_ref().and_then(|p| p.get("hum")),
            Some(&json!(60))
        );
    }

    #[test]
    fn decode_validates_method_params() {
        let payload = br#"{"id":"1","version":"1.0","method":"thing.ota.progress","params":{"status":99}}"#;
        assert!(matches!(
            AlinkCodec.decode(payload),
            Err(ProtocolError::InvalidParams(_))
        ));
        let array = br#"{"id":"1","version":"1.0","method":"thing.event.post","params":[1,2]}"#;
        assert!(matches!(
            AlinkCodec.decode(array),
            Err(ProtocolError::InvalidParams(_))
        ));
    }

    #[test]
    fn decode_rejects_malformed_json() {
        assert!(matches!(
            AlinkCodec.decode(b"not json"),
            Err(ProtocolError::InvalidPayload(_))
        ));
    }

    #[test]
    fn encode_reply_carries_code_and_request_id() {
        let message = DeviceMessage {
            id: "m-1".to_string(),
            request_id: "req-1".to_string(),
            method: "thing.event.property.post_reply".to_string(),
            code: Some(0),
            msg: Some("success".to_string()),
            ..Default::default()
        };
        let bytes = AlinkCodec.encode(&message).expect("encode");
        let value: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(value["id"], json!("req-1"));
        assert_eq!(value["version"], json!("1.0"));
        assert_eq!(value["code"], json!(0));
        assert!(value.get("params").is_none());
    }
}
