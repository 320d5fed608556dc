//! 进程内消息总线。
//!
//! 订阅者按主题注册；`post` 对当时的订阅者列表取快照，逐个派发到该主题的有界任务池。
//! 尽力而为、不持久化：`post` 之后才注册的订阅者收不到该消息，
//! 同主题订阅者之间以及相继的 `post` 之间都不保证顺序。
//!
//! 每个主题各有一份许可，订阅者在分发中向其他主题投递（如上行处理投递下行回复）
//! 不会等待自身占用的许可。订阅者不应在分发中向自己订阅的主题投递。

mod spawner;

use async_trait::async_trait;
use domain::DeviceMessage;
use iot_telemetry::{record_bus_dispatched, record_bus_posted, record_bus_rejected};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

pub use spawner::BoundedSpawner;

/// 所有上行消息进入的主题。
pub const DEVICE_MESSAGE_TOPIC: &str = "iot_device_message";

/// 某个网关实例的下行主题 `iot_gateway_downstream_{serverID}`。
pub fn gateway_downstream_topic(server_id: &str) -> String {
    format!("iot_gateway_downstream_{}", server_id)
}

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("message bus closed")]
    Closed,
    #[error("subscriber failed: {0}")]
    Subscriber(String),
    #[error("bus internal error: {0}")]
    Internal(String),
}

/// 总线订阅者。
#[async_trait]
pub trait Subscriber: Send + Sync {
    fn topic(&self) -> String;

    /// 订阅组，仅用于日志区分。
    fn group(&self) -> &str {
        "default"
    }

    async fn on_message(&self, message: DeviceMessage) -> Result<(), BusError>;
}

/// 消息总线接口；分布式实现可替换进程内实现。
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// 追加订阅者；不去重，运行期不移除。
    fn register(&self, subscriber: Arc<dyn Subscriber>) -> Result<(), BusError>;

    async fn post(&self, topic: &str, message: DeviceMessage) -> Result<(), BusError>;

    fn close(&self);

    /// 关闭并等待在途分发，超过期限返回 `false`。
    async fn drain(&self, deadline: Duration) -> bool;
}

#[derive(Debug, Clone, Copy)]
pub struct BusConfig {
    pub max_in_flight: usize,
    pub dispatch_timeout: Duration,
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            max_in_flight: 256,
            dispatch_timeout: Duration::from_millis(10_000),
        }
    }
}

#[derive(Default)]
struct TopicPools {
    closed: bool,
    by_topic: HashMap<String, BoundedSpawner>,
}

/// 进程内总线实现。
pub struct LocalMessageBus {
    subscribers: RwLock<HashMap<String, Vec<Arc<dyn Subscriber>>>>,
    pools: Mutex<TopicPools>,
    config: BusConfig,
}

impl LocalMessageBus {
    pub fn new(config: BusConfig) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            pools: Mutex::new(TopicPools::default()),
            config,
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.subscribers
            .read()
            .map(|map| map.get(topic).map(Vec::len).unwrap_or(0))
            .unwrap_or(0)
    }

    /// 所有主题的在途分发数。
    pub fn in_flight(&self) -> usize {
        self.pools
            .lock()
            .map(|pools| pools.by_topic.values().map(BoundedSpawner::in_flight).sum())
            .unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.pools.lock().map(|pools| pools.closed).unwrap_or(true)
    }

    /// 取主题的任务池，首次投递时创建；总线关闭后返回 `Closed`。
    fn pool(&self, topic: &str) -> Result<BoundedSpawner, BusError> {
        let mut pools = self
            .pools
            .lock()
            .map_err(|_| BusError::Internal("lock failed".to_string()))?;
        if pools.closed {
            return Err(BusError::Closed);
        }
        let config = self.config;
        Ok(pools
            .by_topic
            .entry(topic.to_string())
            .or_insert_with(|| {
                BoundedSpawner::new("bus", config.max_in_flight, config.dispatch_timeout)
            })
            .clone())
    }

    fn close_pools(&self) -> Vec<BoundedSpawner> {
        match self.pools.lock() {
            Ok(mut pools) => {
                pools.closed = true;
                let spawners: Vec<BoundedSpawner> = pools.by_topic.values().cloned().collect();
                for spawner in &spawners {
                    spawner.close();
                }
                spawners
            }
            Err(_) => Vec::new(),
        }
    }

    fn snapshot(&self, topic: &str) -> Result<Vec<Arc<dyn Subscriber>>, BusError> {
        let map = self
            .subscribers
            .read()
            .map_err(|_| BusError::Internal("lock failed".to_string()))?;
        Ok(map.get(topic).cloned().unwrap_or_default())
    }
}

impl Default for LocalMessageBus {
    fn default() -> Self {
        Self::new(BusConfig::default())
    }
}

#[async_trait]
impl MessageBus for LocalMessageBus {
    fn register(&self, subscriber: Arc<dyn Subscriber>) -> Result<(), BusError> {
        let topic = subscriber.topic();
        let group = subscriber.group().to_string();
        let mut map = self
            .subscribers
            .write()
            .map_err(|_| BusError::Internal("lock failed".to_string()))?;
        map.entry(topic.clone()).or_default().push(subscriber);
        debug!(target: "iot.bus", topic = %topic, group = %group, "subscriber_registered");
        Ok(())
    }

    async fn post(&self, topic: &str, message: DeviceMessage) -> Result<(), BusError> {
        if self.is_closed() {
            record_bus_rejected();
            return Err(BusError::Closed);
        }
        let subscribers = self.snapshot(topic)?;
        record_bus_posted();
        if subscribers.is_empty() {
            debug!(target: "iot.bus", topic = %topic, message_id = %message.id, "no_subscriber");
            return Ok(());
        }
        let pool = match self.pool(topic) {
            Ok(pool) => pool,
            Err(err) => {
                record_bus_rejected();
                return Err(err);
            }
        };
        for subscriber in subscribers {
            let message = message.clone();
            let topic = topic.to_string();
            let result = pool
                .spawn(async move {
                    let started = Instant::now();
                    let message_id = message.id.clone();
                    let outcome = subscriber.on_message(message).await;
                    record_bus_dispatched(started.elapsed().as_millis() as u64);
                    if let Err(err) = outcome {
                        warn!(
                            target: "iot.bus",
                            topic = %topic,
                            group = %subscriber.group(),
                            message_id = %message_id,
                            error = %err,
                            "subscriber_failed"
                        );
                    }
                })
                .await;
            if let Err(err) = result {
                record_bus_rejected();
                return Err(err);
            }
        }
        Ok(())
    }

    fn close(&self) {
        self.close_pools();
    }

    async fn drain(&self, deadline: Duration) -> bool {
        let started = Instant::now();
        let mut drained = true;
        for spawner in self.close_pools() {
            let remaining = deadline.saturating_sub(started.elapsed());
            drained &= spawner.drain(remaining).await;
        }
        drained
    }
}
