//! Codec 契约与注册表

use crate::alink::{ALINK_CODEC_TYPE, AlinkCodec};
use crate::error::ProtocolError;
use domain::DeviceMessage;
use std::collections::HashMap;
use std::sync::Arc;

/// 规范消息与线上字节之间的编解码器。
pub trait Codec: Send + Sync {
    /// 注册表中的类型名
    fn codec_type(&self) -> &str;

    fn encode(&self, message: &DeviceMessage) -> Result<Vec<u8>, ProtocolError>;

    fn decode(&self, payload: &[u8]) -> Result<DeviceMessage, ProtocolError>;
}

/// 类型名 → 编解码器实例。
#[derive(Clone, Default)]
pub struct CodecRegistry {
    codecs: HashMap<String, Arc<dyn Codec>>,
}

impl CodecRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 同名注册会覆盖旧实例。
    pub fn register(&mut self, codec: Arc<dyn Codec>) {
        self.codecs.insert(codec.codec_type().to_string(), codec);
    }

    pub fn get(&self, codec_type: &str) -> Option<Arc<dyn Codec>> {
        self.codecs.get(codec_type).cloned()
    }

    /// 按类型名取编解码器，空类型名回落到 `Alink`。
    pub fn resolve(&self, codec_type: &str) -> Result<Arc<dyn Codec>, ProtocolError> {
        let codec_type = if codec_type.trim().is_empty() {
            ALINK_CODEC_TYPE
        } else {
            codec_type
        };
        self.get(codec_type)
            .ok_or_else(|| ProtocolError::UnknownCodec(codec_type.to_string()))
    }

    pub fn codec_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.codecs.keys().cloned().collect();
        types.sort();
        types
    }
}

/// 默认注册表：只注册 `Alink`。
pub fn default_registry() -> CodecRegistry {
    let mut registry = CodecRegistry::new();
    registry.register(Arc::new(AlinkCodec));
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_registry_has_alink() {
        let registry = default_registry();
        assert_eq!(registry.codec_types(), vec!["Alink".to_string()]);
        assert!(registry.resolve("Alink").is_ok());
        assert!(registry.resolve("").is_ok());
        assert!(matches!(
            registry.resolve("Modbus"),
            Err(ProtocolError::UnknownCodec(name)) if name == "Modbus"
        ));
    }
}
