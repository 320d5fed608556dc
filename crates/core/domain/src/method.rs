//! 设备消息方法目录。
//!
//! 上行方法由设备发起（生命周期消息由网关合成），下行方法由平台发起；
//! 任意方法追加 `_reply` 后缀即为对应的回复。

/// 设备上下线（网关合成，永不回复）。
pub const STATE_UPDATE: &str = "thing.lifecycle.state.update";
/// 属性上报。
pub const PROPERTY_POST: &str = "thing.event.property.post";
/// 事件上报。
pub const EVENT_POST: &str = "thing.event.post";
/// OTA 升级进度上报。
pub const OTA_PROGRESS: &str = "thing.ota.progress";

/// 属性设置。
pub const PROPERTY_SET: &str = "thing.property.set";
/// 服务调用。
pub const SERVICE_INVOKE: &str = "thing.service.invoke";
/// OTA 升级推送。
pub const OTA_UPGRADE: &str = "thing.ota.upgrade";

pub const REPLY_SUFFIX: &str = "_reply";

/// 不需要回复的上行方法。
const REPLY_DISABLED: &[&str] = &[STATE_UPDATE];

pub fn is_reply(method: &str) -> bool {
    method.ends_with(REPLY_SUFFIX)
}

pub fn reply_method(method: &str) -> String {
    format!("{}{}", method, REPLY_SUFFIX)
}

/// 是否需要为该上行方法合成回复。
pub fn reply_required(method: &str) -> bool {
    !is_reply(method) && !REPLY_DISABLED.contains(&method)
}
