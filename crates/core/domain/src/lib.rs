//! 设备网关核心领域模型：规范消息、方法目录、类型化载荷与状态枚举。

pub mod message;
pub mod method;
pub mod payload;
pub mod status;

pub use message::{DeviceMessage, MessageDirection};
pub use payload::{EventPost, MessagePayload, OtaProgress, PayloadError};
pub use status::{DeviceState, OtaRecordStatus, OtaTaskStatus};

/// 获取当前时间戳（毫秒）。
pub fn now_epoch_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as i64
}
