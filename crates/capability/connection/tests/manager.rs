use async_trait::async_trait;
use domain::{DeviceMessage, method};
use iot_bus::{BusError, DEVICE_MESSAGE_TOPIC, MessageBus, Subscriber};
use iot_connection::{ConnectionError, ConnectionInfo, ConnectionManager, HeartbeatConfig};
use serde_json::json;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Default)]
struct RecordingBus {
    posted: Mutex<Vec<(String, DeviceMessage)>>,
}

impl RecordingBus {
    fn states(&self) -> Vec<(String, String)> {
        self.posted
            .lock()
            .expect("lock")
            .iter()
            .map(|(_, message)| {
                let state = message
                    .params
                    .as_ref()
                    .and_then(|params| params.get("state"))
                    .and_then(|value| value.as_str())
                    .unwrap_or_default()
                    .to_string();
                (message.device_id.clone(), state)
            })
            .collect()
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    fn register(&self, _subscriber: Arc<dyn Subscriber>) -> Result<(), BusError> {
        Ok(())
    }

    async fn post(&self, topic: &str, message: DeviceMessage) -> Result<(), BusError> {
        self.posted
            .lock()
            .expect("lock")
            .push((topic.to_string(), message));
        Ok(())
    }

    fn close(&self) {}

    async fn drain(&self, _deadline: Duration) -> bool {
        true
    }
}

fn info(device_id: &str) -> ConnectionInfo {
    ConnectionInfo {
        device_id: device_id.to_string(),
        tenant_id: "tenant-1".to_string(),
        product_key: "prodX".to_string(),
        device_name: device_id.to_string(),
        authenticated: true,
        ..Default::default()
    }
}

#[tokio::test]
async fn register_and_unregister_track_online_state() {
    let bus = Arc::new(RecordingBus::default());
    let manager = ConnectionManager::new(bus.clone(), "gw-1", 10);

    manager
        .register_connection("client-a", info("dev-a"))
        .await
        .expect("register");
    assert!(manager.is_device_online("dev-a").expect("online"));
    assert_eq!(manager.online_device_count().expect("count"), 1);
    assert_eq!(
        manager.client_id_for_device("dev-a").expect("index"),
        Some("client-a".to_string())
    );
    let stored = manager
        .connection("client-a")
        .expect("lookup")
        .expect("connection");
    assert_eq!(stored.server_id, "gw-1");
    assert!(stored.connected_at_ms > 0);

    let removed = manager
        .unregister_connection("client-a")
        .await
        .expect("unregister");
    assert!(removed.is_some());
    assert!(!manager.is_device_online("dev-a").expect("online"));
    assert_eq!(manager.online_device_count().expect("count"), 0);

    let posted = bus.posted.lock().expect("lock").clone();
    assert_eq!(posted.len(), 2);
    assert!(posted.iter().all(|(topic, message)| {
        topic == DEVICE_MESSAGE_TOPIC
            && message.method == method::STATE_UPDATE
            && message.server_id == "gw-1"
    }));
    assert_eq!(
        posted[0].1.params.as_ref().and_then(|p| p.get("state")),
        Some(&json!("online"))
    );
    assert_eq!(
        bus.states(),
        vec![
            ("dev-a".to_string(), "online".to_string()),
            ("dev-a".to_string(), "offline".to_string())
        ]
    );
    // 同一会话的上线与下线携带相同的 sessionId
    assert_eq!(posted[0].1.session_id(), Some(stored.session_id.as_str()));
    assert_eq!(posted[1].1.session_id(), Some(stored.session_id.as_str()));
}

#[tokio::test]
async fn each_registration_gets_a_new_session() {
    let bus = Arc::new(RecordingBus::default());
    let manager = ConnectionManager::new(bus.clone(), "gw-1", 10);
    manager
        .register_connection("client-a", info("dev-a"))
        .await
        .expect("first");
    let first = manager
        .connection("client-a")
        .expect("lookup")
        .expect("connection")
        .session_id;
    manager
        .unregister_connection("client-a")
        .await
        .expect("unregister");
    manager
        .register_connection("client-a", info("dev-a"))
        .await
        .expect("second");
    let second = manager
        .connection("client-a")
        .expect("lookup")
        .expect("connection")
        .session_id;
    assert!(!first.is_empty());
    assert_ne!(first, second);
}

#[tokio::test]
async fn unregister_unknown_client_posts_nothing() {
    let bus = Arc::new(RecordingBus::default());
    let manager = ConnectionManager::new(bus.clone(), "gw-1", 10);
    assert!(
        manager
            .unregister_connection("ghost")
            .await
            .expect("unregister")
            .is_none()
    );
    assert!(!manager.update_heartbeat("ghost").expect("heartbeat"));
    assert!(bus.posted.lock().expect("lock").is_empty());
}

#[tokio::test]
async fn limit_rejects_new_clients() {
    let bus = Arc::new(RecordingBus::default());
    let manager = ConnectionManager::new(bus, "gw-1", 1);
    manager
        .register_connection("client-a", info("dev-a"))
        .await
        .expect("register");
    let result = manager.register_connection("client-b", info("dev-b")).await;
    assert!(matches!(result, Err(ConnectionError::LimitReached(1))));
    assert_eq!(manager.online_device_count().expect("count"), 1);
}

#[tokio::test]
async fn reconnect_replaces_previous_session() {
    let bus = Arc::new(RecordingBus::default());
    let manager = ConnectionManager::new(bus, "gw-1", 10);
    manager
        .register_connection("client-a", info("dev-a"))
        .await
        .expect("register");
    manager
        .register_connection("client-a2", info("dev-a"))
        .await
        .expect("register again");
    assert_eq!(manager.online_device_count().expect("count"), 1);
    assert_eq!(
        manager.client_id_for_device("dev-a").expect("index"),
        Some("client-a2".to_string())
    );

    // 旧会话的断开事件不影响新会话
    manager
        .unregister_connection("client-a")
        .await
        .expect("unregister");
    assert!(manager.is_device_online("dev-a").expect("online"));
}

#[tokio::test]
async fn sweep_evicts_only_stale_sessions() {
    let bus = Arc::new(RecordingBus::default());
    let manager = ConnectionManager::new(bus.clone(), "gw-1", 10);
    manager
        .register_connection("client-a", info("dev-a"))
        .await
        .expect("register");
    manager
        .register_connection("client-b", info("dev-b"))
        .await
        .expect("register");

    tokio::time::sleep(Duration::from_millis(120)).await;
    assert!(manager.update_heartbeat("client-b").expect("heartbeat"));

    let evicted = manager
        .sweep_expired(Duration::from_millis(60))
        .await
        .expect("sweep");
    assert_eq!(evicted, vec!["client-a".to_string()]);
    assert!(!manager.is_device_online("dev-a").expect("online"));
    assert!(manager.is_device_online("dev-b").expect("online"));

    let offline: Vec<_> = bus
        .states()
        .into_iter()
        .filter(|(_, state)| state == "offline")
        .collect();
    assert_eq!(offline, vec![("dev-a".to_string(), "offline".to_string())]);
}

#[tokio::test]
async fn heartbeat_checker_evicts_within_an_interval() {
    let bus = Arc::new(RecordingBus::default());
    let manager = Arc::new(ConnectionManager::new(bus.clone(), "gw-1", 10));
    manager
        .register_connection("client-a", info("dev-a"))
        .await
        .expect("register");

    let cancel = CancellationToken::new();
    let handle = manager.start_heartbeat_checker(
        HeartbeatConfig {
            timeout: Duration::from_millis(50),
            interval: Duration::from_millis(20),
        },
        cancel.clone(),
    );

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!manager.is_device_online("dev-a").expect("online"));

    cancel.cancel();
    handle.await.expect("checker stops");

    let offline = bus
        .states()
        .into_iter()
        .filter(|(_, state)| state == "offline")
        .count();
    assert_eq!(offline, 1);
}

#[tokio::test]
async fn zero_interval_checker_runs_instead_of_panicking() {
    let bus = Arc::new(RecordingBus::default());
    let manager = Arc::new(ConnectionManager::new(bus, "gw-1", 10));
    let cancel = CancellationToken::new();
    let handle = manager.start_heartbeat_checker(
        HeartbeatConfig {
            timeout: Duration::from_secs(60),
            interval: Duration::ZERO,
        },
        cancel.clone(),
    );
    tokio::time::sleep(Duration::from_millis(20)).await;
    cancel.cancel();
    handle.await.expect("checker stops cleanly");
}
