//! 内存存储实现模块
//!
//! 用于本地演示（未配置数据库/Redis 时）和测试。
//!
//! 包含以下实现：
//! - DeviceStore: InMemoryDeviceStore
//! - DevicePropertyStore: InMemoryDevicePropertyStore
//! - OtaFirmwareStore / OtaTaskStore / OtaTaskRecordStore: InMemoryOta*Store
//! - DeviceMessageStore: InMemoryDeviceMessageStore
//! - KvCache: InMemoryKvCache
//! - GatewayDirectory: InMemoryGatewayDirectory

pub mod cache;
pub mod device;
pub mod directory;
pub mod message;
pub mod ota;
pub mod property;

pub use cache::*;
pub use device::*;
pub use directory::*;
pub use message::*;
pub use ota::*;
pub use property::*;
