//! 网关运行配置加载。
//!
//! 全部来自环境变量（`.env` 由二进制先行加载）；缺省取默认值，格式错误返回
//! [`ConfigError::Invalid`]。

use std::env;
use std::time::Duration;

/// 配置加载错误。
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required env: {0}")]
    Missing(String),
    #[error("invalid value for {0}: {1}")]
    Invalid(String, String),
}

/// 网关运行配置。
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub http_addr: String,
    /// 未设置时使用内存仓储
    pub database_url: Option<String>,
    /// 未设置时使用内存缓存与内存网关目录
    pub redis_url: Option<String>,
    pub server_id: String,
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: Option<String>,
    pub mqtt_password: Option<String>,
    pub mqtt_client_id: String,
    pub mqtt_keep_alive_seconds: u64,
    pub mqtt_connect_timeout_seconds: u64,
    pub mqtt_auto_reconnect: bool,
    pub mqtt_reconnect_delay_ms: u64,
    pub mqtt_clean_session: bool,
    pub mqtt_subscribe_topics: Vec<String>,
    pub mqtt_topic_prefix: String,
    pub codec_type: String,
    pub heartbeat_timeout_seconds: u64,
    pub heartbeat_interval_seconds: u64,
    pub max_connections: usize,
    pub bus_max_in_flight: usize,
    pub bus_dispatch_timeout_ms: u64,
    pub audit_timeout_ms: u64,
    pub shutdown_drain_timeout_ms: u64,
    pub device_auth_cache_ttl_seconds: u64,
}

impl AppConfig {
    /// 从环境变量读取配置。
    pub fn from_env() -> Result<Self, ConfigError> {
        let http_addr = env::var("IOT_HTTP_ADDR").unwrap_or_else(|_| "127.0.0.1:8090".to_string());
        let database_url = read_optional("IOT_DATABASE_URL");
        let redis_url = read_optional("IOT_REDIS_URL");
        let server_id = read_optional("IOT_SERVER_ID")
            .unwrap_or_else(|| format!("gateway-{}", uuid::Uuid::new_v4()));
        let mqtt_host = env::var("IOT_MQTT_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let mqtt_port = read_u16_with_default("IOT_MQTT_PORT", 1883)?;
        let mqtt_username = read_optional("IOT_MQTT_USERNAME");
        let mqtt_password = read_optional("IOT_MQTT_PASSWORD");
        let mqtt_client_id = read_optional("IOT_MQTT_CLIENT_ID")
            .unwrap_or_else(|| format!("iot-gateway-{}", server_id));
        let mqtt_keep_alive_seconds = read_u64_with_default("IOT_MQTT_KEEP_ALIVE_SECONDS", 60)?;
        let mqtt_connect_timeout_seconds =
            read_u64_with_default("IOT_MQTT_CONNECT_TIMEOUT_SECONDS", 10)?;
        let mqtt_auto_reconnect = read_bool_with_default("IOT_MQTT_AUTO_RECONNECT", true)?;
        let mqtt_reconnect_delay_ms = read_u64_with_default("IOT_MQTT_RECONNECT_DELAY_MS", 2000)?;
        let mqtt_clean_session = read_bool_with_default("IOT_MQTT_CLEAN_SESSION", true)?;
        let mqtt_subscribe_topics = split_topics(&env::var("IOT_MQTT_SUBSCRIBE_TOPICS").unwrap_or_default());
        let mqtt_topic_prefix =
            env::var("IOT_MQTT_TOPIC_PREFIX").unwrap_or_else(|_| "/sys".to_string());
        let codec_type = read_optional("IOT_CODEC_TYPE").unwrap_or_else(|| "Alink".to_string());
        let heartbeat_timeout_seconds = read_u64_with_default("IOT_HEARTBEAT_TIMEOUT_SECONDS", 180)?;
        let heartbeat_interval_seconds =
            read_u64_with_default("IOT_HEARTBEAT_INTERVAL_SECONDS", 30)?;
        let max_connections = read_usize_with_default("IOT_MAX_CONNECTIONS", 10_000)?;
        let bus_max_in_flight = read_usize_with_default("IOT_BUS_MAX_IN_FLIGHT", 256)?;
        let bus_dispatch_timeout_ms = read_u64_with_default("IOT_BUS_DISPATCH_TIMEOUT_MS", 10_000)?;
        let audit_timeout_ms = read_u64_with_default("IOT_AUDIT_TIMEOUT_MS", 5000)?;
        let shutdown_drain_timeout_ms =
            read_u64_with_default("IOT_SHUTDOWN_DRAIN_TIMEOUT_MS", 10_000)?;
        let device_auth_cache_ttl_seconds =
            read_u64_with_default("IOT_DEVICE_AUTH_CACHE_TTL_SECONDS", 3600)?;

        if heartbeat_interval_seconds == 0 {
            return Err(ConfigError::Invalid(
                "IOT_HEARTBEAT_INTERVAL_SECONDS".to_string(),
                "0".to_string(),
            ));
        }
        if bus_max_in_flight == 0 {
            return Err(ConfigError::Invalid(
                "IOT_BUS_MAX_IN_FLIGHT".to_string(),
                "0".to_string(),
            ));
        }

        Ok(Self {
            http_addr,
            database_url,
            redis_url,
            server_id,
            mqtt_host,
            mqtt_port,
            mqtt_username,
            mqtt_password,
            mqtt_client_id,
            mqtt_keep_alive_seconds,
            mqtt_connect_timeout_seconds,
            mqtt_auto_reconnect,
            mqtt_reconnect_delay_ms,
            mqtt_clean_session,
            mqtt_subscribe_topics,
            mqtt_topic_prefix,
            codec_type,
            heartbeat_timeout_seconds,
            heartbeat_interval_seconds,
            max_connections,
            bus_max_in_flight,
            bus_dispatch_timeout_ms,
            audit_timeout_ms,
            shutdown_drain_timeout_ms,
            device_auth_cache_ttl_seconds,
        })
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_secs(self.heartbeat_timeout_seconds)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_seconds)
    }

    pub fn bus_dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.bus_dispatch_timeout_ms)
    }

    pub fn audit_timeout(&self) -> Duration {
        Duration::from_millis(self.audit_timeout_ms)
    }

    pub fn shutdown_drain_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_drain_timeout_ms)
    }
}

fn read_u16_with_default(key: &str, default: u16) -> Result<u16, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u16>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_u64_with_default(key: &str, default: u64) -> Result<u64, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<u64>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_usize_with_default(key: &str, default: usize) -> Result<usize, ConfigError> {
    let value = match env::var(key) {
        Ok(value) => value,
        Err(_) => return Ok(default),
    };
    value
        .parse::<usize>()
        .map_err(|_| ConfigError::Invalid(key.to_string(), value))
}

fn read_optional(key: &str) -> Option<String> {
    match env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value),
        _ => None,
    }
}

fn read_bool_with_default(key: &str, default: bool) -> Result<bool, ConfigError> {
    match env::var(key) {
        Ok(value) => parse_bool(&value).ok_or_else(|| ConfigError::Invalid(key.to_string(), value)),
        Err(_) => Ok(default),
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "on" | "yes" => Some(true),
        "0" | "false" | "off" | "no" => Some(false),
        _ => None,
    }
}

/// 逗号分隔的订阅过滤器，忽略空项。
fn split_topics(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|topic| !topic.is_empty())
        .map(str::to_string)
        .collect()
}
