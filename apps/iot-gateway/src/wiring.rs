//! 网关装配模块
//!
//! 按配置选择仓储实现（PostgreSQL/Redis 或内存），组装总线、连接管理、设备认证、
//! OTA 与消息流水线，并把流水线订阅到总线。MQTT 连接由 `main` 建立后再挂上下行订阅者。

use crate::AppState;
use iot_auth::{DeviceAuthService, DeviceLookup};
use iot_bus::{BusConfig, LocalMessageBus, MessageBus};
use iot_config::AppConfig;
use iot_connection::ConnectionManager;
use iot_ota::OtaService;
use iot_pipeline::{AuditWriter, DeviceMessageService, PipelineConfig, UpstreamMessageSubscriber};
use iot_protocol::{Codec, default_registry};
use iot_storage::{
    DeviceMessageStore, DevicePropertyStore, DeviceStore, GatewayDirectory,
    InMemoryDeviceMessageStore, InMemoryDevicePropertyStore, InMemoryDeviceStore,
    InMemoryGatewayDirectory, InMemoryKvCache, InMemoryOtaFirmwareStore,
    InMemoryOtaTaskRecordStore, InMemoryOtaTaskStore, KvCache, OtaFirmwareStore,
    OtaTaskRecordStore, OtaTaskStore, PgDeviceMessageStore, PgDevicePropertyStore, PgDeviceStore,
    PgOtaFirmwareStore, PgOtaTaskRecordStore, PgOtaTaskStore, RedisGatewayDirectory,
    RedisKvCache, connect_pool,
};
use iot_transport::{
    DownstreamPublisher, DownstreamSender, DownstreamSubscriber, MqttTransportConfig,
    UpstreamHandler,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

type BoxError = Box<dyn std::error::Error>;

/// 网关读写的全部外部仓储。
#[derive(Clone)]
pub struct Stores {
    pub devices: Arc<dyn DeviceStore>,
    pub properties: Arc<dyn DevicePropertyStore>,
    pub messages: Arc<dyn DeviceMessageStore>,
    pub cache: Arc<dyn KvCache>,
    pub directory: Arc<dyn GatewayDirectory>,
    pub firmwares: Arc<dyn OtaFirmwareStore>,
    pub tasks: Arc<dyn OtaTaskStore>,
    pub records: Arc<dyn OtaTaskRecordStore>,
}

impl Stores {
    /// 全内存仓储（未配置数据库与 Redis 时使用）。
    pub fn in_memory() -> Self {
        Self {
            devices: Arc::new(InMemoryDeviceStore::new()),
            properties: Arc::new(InMemoryDevicePropertyStore::new()),
            messages: Arc::new(InMemoryDeviceMessageStore::new()),
            cache: Arc::new(InMemoryKvCache::new()),
            directory: Arc::new(InMemoryGatewayDirectory::new()),
            firmwares: Arc::new(InMemoryOtaFirmwareStore::new()),
            tasks: Arc::new(InMemoryOtaTaskStore::new()),
            records: Arc::new(InMemoryOtaTaskRecordStore::new()),
        }
    }

    /// 设置了 `IOT_DATABASE_URL` 用 PostgreSQL，设置了 `IOT_REDIS_URL` 用 Redis。
    pub async fn from_config(config: &AppConfig) -> Result<Self, BoxError> {
        let mut stores = Self::in_memory();
        match &config.database_url {
            Some(url) => {
                let pool = connect_pool(url).await?;
                stores.devices = Arc::new(PgDeviceStore::new(pool.clone()));
                stores.properties = Arc::new(PgDevicePropertyStore::new(pool.clone()));
                stores.messages = Arc::new(PgDeviceMessageStore::new(pool.clone()));
                stores.firmwares = Arc::new(PgOtaFirmwareStore::new(pool.clone()));
                stores.tasks = Arc::new(PgOtaTaskStore::new(pool.clone()));
                stores.records = Arc::new(PgOtaTaskRecordStore::new(pool));
                info!(target: "iot.http", "postgres_stores_enabled");
            }
            None => warn!(target: "iot.http", "database_url_missing_using_in_memory_stores"),
        }
        match &config.redis_url {
            Some(url) => {
                stores.cache = Arc::new(RedisKvCache::connect(url)?);
                stores.directory = Arc::new(RedisGatewayDirectory::connect(url)?);
                info!(target: "iot.http", "redis_cache_enabled");
            }
            None => warn!(target: "iot.http", "redis_url_missing_using_in_memory_directory"),
        }
        Ok(stores)
    }
}

/// 组装完成的网关（MQTT 之外的全部组件）。
pub struct Gateway {
    pub state: AppState,
    pub bus: Arc<LocalMessageBus>,
    pub lookup: Arc<DeviceLookup>,
    pub devices: Arc<dyn DeviceStore>,
    pub codec: Arc<dyn Codec>,
}

/// 组装总线、连接管理、认证、OTA 与流水线，并注册上行订阅者。
pub fn assemble(config: &AppConfig, stores: Stores) -> Result<Gateway, BoxError> {
    let codec = default_registry().resolve(&config.codec_type)?;
    let bus = Arc::new(LocalMessageBus::new(BusConfig {
        max_in_flight: config.bus_max_in_flight,
        dispatch_timeout: config.bus_dispatch_timeout(),
    }));
    let bus_handle: Arc<dyn MessageBus> = bus.clone();

    let connections = Arc::new(ConnectionManager::new(
        bus_handle.clone(),
        config.server_id.clone(),
        config.max_connections,
    ));
    let lookup = Arc::new(DeviceLookup::new(
        stores.devices.clone(),
        stores.cache,
        config.device_auth_cache_ttl_seconds,
    ));
    let auth = Arc::new(DeviceAuthService::new(lookup.clone()));

    let ota = Arc::new(OtaService::new(
        stores.firmwares,
        stores.tasks,
        stores.records,
        stores.devices.clone(),
    ));
    let audit = AuditWriter::new(
        stores.messages,
        PipelineConfig {
            audit_max_in_flight: config.bus_max_in_flight,
            audit_timeout: config.audit_timeout(),
        },
    );
    let messages = Arc::new(DeviceMessageService::new(
        stores.devices.clone(),
        stores.properties,
        stores.directory,
        bus_handle,
        audit,
        ota,
    ));
    bus.register(Arc::new(UpstreamMessageSubscriber::new(messages.clone())))?;

    Ok(Gateway {
        state: AppState {
            server_id: config.server_id.clone(),
            auth,
            connections,
            messages,
        },
        bus,
        lookup,
        devices: stores.devices,
        codec,
    })
}

impl Gateway {
    /// MQTT 上行处理器。
    pub fn upstream_handler(&self, config: &AppConfig) -> Arc<UpstreamHandler> {
        Arc::new(UpstreamHandler::new(
            config.mqtt_topic_prefix.clone(),
            config.server_id.clone(),
            self.codec.clone(),
            self.lookup.clone(),
            self.state.connections.clone(),
            self.bus.clone(),
        ))
    }

    /// 订阅本实例的下行主题，经给定出口发布到 Broker。
    pub fn register_downstream(
        &self,
        config: &AppConfig,
        publisher: Arc<dyn DownstreamPublisher>,
    ) -> Result<(), BoxError> {
        let sender = Arc::new(DownstreamSender::new(
            config.mqtt_topic_prefix.clone(),
            self.codec.clone(),
            publisher,
        ));
        self.bus.register(Arc::new(DownstreamSubscriber::new(
            config.server_id.clone(),
            self.devices.clone(),
            sender,
        )))?;
        Ok(())
    }

    /// 关闭总线并在期限内排空在途分发与审计写入。
    pub async fn shutdown(&self, deadline: Duration) -> bool {
        self.bus.close();
        let bus_drained = self.bus.drain(deadline).await;
        let audit_drained = self.state.messages.drain(deadline).await;
        bus_drained && audit_drained
    }
}

/// 由运行配置生成 MQTT 传输配置。
pub fn mqtt_config(config: &AppConfig) -> MqttTransportConfig {
    MqttTransportConfig {
        host: config.mqtt_host.clone(),
        port: config.mqtt_port,
        username: config.mqtt_username.clone(),
        password: config.mqtt_password.clone(),
        client_id: config.mqtt_client_id.clone(),
        keep_alive: Duration::from_secs(config.mqtt_keep_alive_seconds),
        connect_timeout: Duration::from_secs(config.mqtt_connect_timeout_seconds),
        auto_reconnect: config.mqtt_auto_reconnect,
        reconnect_delay: Duration::from_millis(config.mqtt_reconnect_delay_ms),
        clean_session: config.mqtt_clean_session,
        subscribe_topics: config.mqtt_subscribe_topics.clone(),
        topic_prefix: config.mqtt_topic_prefix.clone(),
    }
}
