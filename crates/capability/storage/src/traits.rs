//! 存储接口 Trait 定义
//!
//! 定义网关使用的外部仓储接口：
//! - DeviceStore：设备存储
//! - DevicePropertyStore：属性历史
//! - OtaFirmwareStore / OtaTaskStore / OtaTaskRecordStore：OTA
//! - DeviceMessageStore：消息审计
//! - KvCache：带 TTL 的字符串缓存
//! - GatewayDirectory：设备 → 网关实例目录
//!
//! 设计原则：
//! - 所有接口返回 StorageError
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use crate::models::{
    DeviceMessageRecord, DevicePropertyRecord, DeviceRecord, DeviceUpdate, OtaFirmwareRecord,
    OtaRecordProgress, OtaTask, OtaTaskRecord,
};
use async_trait::async_trait;
use domain::OtaTaskStatus;

/// 设备存储接口
#[async_trait]
pub trait DeviceStore: Send + Sync {
    /// 按设备 ID 查找
    async fn find_device(&self, device_id: &str) -> Result<Option<DeviceRecord>, StorageError>;

    /// 按 (productKey, deviceName) 查找
    async fn find_by_product_key_and_name(
        &self,
        product_key: &str,
        device_name: &str,
    ) -> Result<Option<DeviceRecord>, StorageError>;

    /// 列出产品下的全部设备
    async fn list_by_product_key(
        &self,
        product_key: &str,
    ) -> Result<Vec<DeviceRecord>, StorageError>;

    /// 创建设备
    async fn create_device(&self, record: DeviceRecord) -> Result<DeviceRecord, StorageError>;

    /// 字段级原子更新，设备不存在时返回 `None`
    async fn update_device(
        &self,
        device_id: &str,
        update: DeviceUpdate,
    ) -> Result<Option<DeviceRecord>, StorageError>;
}

/// 设备属性历史接口
///
/// 每次上报为每个标识符追加一行，从不覆盖。
#[async_trait]
pub trait DevicePropertyStore: Send + Sync {
    async fn append_properties(&self, records: Vec<DevicePropertyRecord>)
    -> Result<(), StorageError>;

    /// 按上报时间倒序
    async fn list_property_history(
        &self,
        device_id: &str,
        identifier: &str,
    ) -> Result<Vec<DevicePropertyRecord>, StorageError>;
}

/// OTA 固件接口
#[async_trait]
pub trait OtaFirmwareStore: Send + Sync {
    async fn find_firmware(
        &self,
        firmware_id: &str,
    ) -> Result<Option<OtaFirmwareRecord>, StorageError>;

    async fn create_firmware(
        &self,
        record: OtaFirmwareRecord,
    ) -> Result<OtaFirmwareRecord, StorageError>;
}

/// OTA 任务接口
#[async_trait]
pub trait OtaTaskStore: Send + Sync {
    async fn create_task(&self, task: OtaTask) -> Result<OtaTask, StorageError>;

    async fn find_task(&self, task_id: &str) -> Result<Option<OtaTask>, StorageError>;

    /// 状态迁移（仅当当前状态为 `from` 时生效）
    async fn transition_task_status(
        &self,
        task_id: &str,
        from: OtaTaskStatus,
        to: OtaTaskStatus,
    ) -> Result<bool, StorageError>;

    async fn update_task_counts(
        &self,
        task_id: &str,
        total_count: i32,
        success_count: i32,
    ) -> Result<(), StorageError>;
}

/// OTA 升级记录接口
#[async_trait]
pub trait OtaTaskRecordStore: Send + Sync {
    async fn create_records(&self, records: Vec<OtaTaskRecord>) -> Result<(), StorageError>;

    async fn list_records_by_task(&self, task_id: &str)
    -> Result<Vec<OtaTaskRecord>, StorageError>;

    /// 设备的未终结记录，按 `created_at_ms`、`record_id` 升序
    async fn list_open_records_by_device(
        &self,
        device_id: &str,
    ) -> Result<Vec<OtaTaskRecord>, StorageError>;

    /// 仅当记录仍未终结（Wait/Pushed/Upgrading）时写入；
    /// 记录不存在或已终结返回 `None`
    async fn update_record_progress(
        &self,
        record_id: &str,
        progress: OtaRecordProgress,
    ) -> Result<Option<OtaTaskRecord>, StorageError>;

    /// 将任务下全部未终结记录置为 Failed，返回受影响行数
    async fn fail_open_records(
        &self,
        task_id: &str,
        description: &str,
        updated_at_ms: i64,
    ) -> Result<u64, StorageError>;
}

/// 设备消息审计接口
#[async_trait]
pub trait DeviceMessageStore: Send + Sync {
    async fn append_message(&self, record: DeviceMessageRecord) -> Result<(), StorageError>;

    /// 按上报时间倒序
    async fn list_device_messages(
        &self,
        device_id: &str,
        limit: i64,
    ) -> Result<Vec<DeviceMessageRecord>, StorageError>;
}

/// 带 TTL 的字符串缓存
#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    async fn set_ex(&self, key: &str, value: &str, ttl_seconds: u64) -> Result<(), StorageError>;

    async fn delete(&self, key: &str) -> Result<(), StorageError>;
}

/// 设备 → 网关实例目录
///
/// 由生命周期消息维护，下行路由以其为准。
#[async_trait]
pub trait GatewayDirectory: Send + Sync {
    /// 覆盖设备归属，记录承载会话
    async fn bind(
        &self,
        device_id: &str,
        server_id: &str,
        session_id: &str,
    ) -> Result<(), StorageError>;

    async fn owner(&self, device_id: &str) -> Result<Option<String>, StorageError>;

    /// 仅当当前归属的实例与会话都一致时解绑
    async fn unbind_if_owner(
        &self,
        device_id: &str,
        server_id: &str,
        session_id: &str,
    ) -> Result<bool, StorageError>;
}
