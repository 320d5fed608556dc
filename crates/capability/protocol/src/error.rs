//! 协议错误类型定义

/// 编解码与 Topic 解析错误
///
/// 在传输适配层被完全吸收（记录日志后丢弃），不会传到业务处理器。
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// 报文不是合法 JSON 或字段类型不符
    #[error("invalid payload: {0}")]
    InvalidPayload(String),

    /// 不支持的协议版本
    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),

    /// params 不符合方法族约束
    #[error("invalid params: {0}")]
    InvalidParams(String),

    /// Topic 不在前缀下或层级不足
    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    /// 未注册的编解码器类型
    #[error("unknown codec: {0}")]
    UnknownCodec(String),

    /// 编码失败
    #[error("encode error: {0}")]
    Encode(String),
}
