use std::time::Duration;

/// 心跳扫描配置
#[derive(Debug, Clone, Copy)]
pub struct HeartbeatConfig {
    /// 超过该时长未刷新心跳的会话被清理
    pub timeout: Duration,
    /// 扫描间隔
    pub interval: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(180),
            interval: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_six_intervals() {
        let config = HeartbeatConfig::default();
        assert_eq!(config.timeout, config.interval * 6);
    }
}
