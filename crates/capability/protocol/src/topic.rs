//! MQTT Topic 规则
//!
//! 上行：`{prefix}/{productKey}/{deviceName}/thing/...`
//! 下行：`{prefix}/{productKey}/{deviceName}/{method 中 . 替换为 /}[_reply]`

use crate::error::ProtocolError;
use domain::method;

/// 上行 Topic 解析结果。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicParts {
    pub product_key: String,
    pub device_name: String,
    /// 设备名之后的剩余层级（不含前导 `/`）
    pub rest: String,
}

/// 默认订阅的上行 Topic 过滤器。
pub fn upstream_filters(prefix: &str) -> Vec<String> {
    let prefix = prefix.trim_end_matches('/');
    [
        method::PROPERTY_POST,
        method::EVENT_POST,
        method::STATE_UPDATE,
        method::OTA_PROGRESS,
    ]
    .iter()
    .map(|name| format!("{}/+/+/{}", prefix, name.replace('.', "/")))
    .collect()
}

pub fn parse_topic(prefix: &str, topic: &str) -> Result<TopicParts, ProtocolError> {
    let invalid = || ProtocolError::InvalidTopic(topic.to_string());
    let prefix = prefix.trim_matches('/');
    let trimmed = topic.trim_matches('/');
    let rest = if prefix.is_empty() {
        trimmed
    } else {
        trimmed
            .strip_prefix(prefix)
            .and_then(|rest| rest.strip_prefix('/'))
            .ok_or_else(invalid)?
    };
    let mut parts = rest.splitn(3, '/');
    let product_key = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let device_name = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    let rest = parts.next().filter(|s| !s.is_empty()).ok_or_else(invalid)?;
    Ok(TopicParts {
        product_key: product_key.to_string(),
        device_name: device_name.to_string(),
        rest: rest.to_string(),
    })
}

/// 由 Topic 剩余层级推导方法名（报文缺少 method 时使用）。
pub fn method_from_topic(rest: &str) -> String {
    rest.trim_matches('/').replace('/', ".")
}

/// 构造下行 Topic；携带响应码时追加 `_reply`。
///
/// 方法名原样转换，已经以 `_reply` 结尾的回复方法不再重复追加。
pub fn build_downstream_topic(
    prefix: &str,
    product_key: &str,
    device_name: &str,
    method_name: &str,
    has_code: bool,
) -> String {
    let base = method_name.replace('.', "/");
    let suffix = if has_code && !method::is_reply(method_name) {
        method::REPLY_SUFFIX
    } else {
        ""
    };
    format!(
        "{}/{}/{}/{}{}",
        prefix.trim_end_matches('/'),
        product_key,
        device_name,
        base,
        suffix
    )
}
