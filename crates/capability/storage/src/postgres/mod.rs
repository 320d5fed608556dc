//! # PostgreSQL 存储实现模块
//!
//! 本模块提供网关所用仓储接口的 PostgreSQL 实现，用于生产环境。
//!
//! ## 设计原则
//!
//! 1. **参数化查询**：所有 SQL 查询使用参数绑定，防止 SQL 注入
//! 2. **字段级更新**：设备更新使用 `coalesce`，状态与固件并发写入互不覆盖
//! 3. **条件迁移**：OTA 任务状态迁移带 `status = $from` 条件，依靠影响行数判定
//! 4. **连接池管理**：所有 `Pg*Store` 共享同一个连接池
//!
//! ## 包含的实现
//!
//! - **DeviceStore** (`device.rs`)
//! - **DevicePropertyStore** (`property.rs`)：只追加，不做 upsert
//! - **OtaFirmwareStore / OtaTaskStore / OtaTaskRecordStore** (`ota.rs`)
//! - **DeviceMessageStore** (`message.rs`)：审计行，payload 为 jsonb
//!
//! ## 数据库模式要求
//!
//! - `iot_devices`：(device_id, tenant_id, product_key, device_name, device_secret, state smallint, firmware_id)，
//!   `(product_key, device_name)` 唯一
//! - `iot_device_properties`：(device_id, tenant_id, identifier, value, report_time)
//! - `iot_ota_firmwares`：(firmware_id, tenant_id, product_key, version, file_url, file_size,
//!   file_digest_algorithm, file_digest_value)
//! - `iot_ota_tasks`：(task_id, tenant_id, name, firmware_id, status smallint, device_scope,
//!   total_count, success_count, created_at)
//! - `iot_ota_task_records`：(record_id, task_id, tenant_id, device_id, firmware_id, from_firmware_id,
//!   status smallint, progress smallint, description, created_at, updated_at)
//! - `iot_device_messages`：(message_id, request_id, tenant_id, device_id, server_id, method,
//!   direction, code, payload jsonb, report_time)
//!
//! ## 索引
//!
//! - `iot_device_properties (device_id, identifier, report_time desc)`
//! - `iot_ota_task_records (device_id, status)`、`(task_id)`
//! - `iot_device_messages (device_id, report_time desc)`
//!
//! ## 错误处理
//!
//! 所有存储操作返回 `Result<T, StorageError>`，`sqlx::Error` 自动转换；
//! 库中出现无法识别的状态码时同样返回 `StorageError`。

pub mod device;
pub mod message;
pub mod ota;
pub mod property;

pub use device::*;
pub use message::*;
pub use ota::*;
pub use property::*;
