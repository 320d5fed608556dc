//! # 编解码能力模块
//!
//! 负责规范消息 [`domain::DeviceMessage`] 与线上字节之间的双向转换：
//! - **Codec**：`encode` / `decode` / `codec_type` 契约
//! - **CodecRegistry**：类型名 → 编解码器实例，默认注册 `Alink`
//! - **Topic**：上行 Topic 解析、下行 Topic 构造
//!
//! ## 数据流
//!
//! ```text
//! MQTT publish (topic, bytes)
//!       │
//!       ├── parse_topic ──► (productKey, deviceName, rest)
//!       ▼
//! CodecRegistry::resolve(codec_type).decode(bytes)
//!       │
//!       ▼
//! DeviceMessage ──► MessageBus
//! ```
//!
//! ## Alink 报文
//!
//! ```json
//! {"id":"1","version":"1.0","method":"thing.event.property.post","params":{"temp":"21.5"}}
//! {"id":"1","version":"1.0","code":0,"msg":"success","data":{}}
//! ```

mod alink;
mod codec;
mod error;
mod topic;

pub use alink::{ALINK_CODEC_TYPE, ALINK_VERSION, AlinkCodec};
pub use codec::{Codec, CodecRegistry, default_registry};
pub use error::ProtocolError;
pub use topic::{
    TopicParts, build_downstream_topic, method_from_topic, parse_topic, upstream_filters,
};
