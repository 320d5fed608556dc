use async_trait::async_trait;
use domain::DeviceMessage;
use iot_bus::{
    BusConfig, BusError, DEVICE_MESSAGE_TOPIC, LocalMessageBus, MessageBus, Subscriber,
    gateway_downstream_topic,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

struct Collector {
    topic: String,
    delay: Duration,
    tx: mpsc::UnboundedSender<DeviceMessage>,
}

#[async_trait]
impl Subscriber for Collector {
    fn topic(&self) -> String {
        self.topic.clone()
    }

    async fn on_message(&self, message: DeviceMessage) -> Result<(), BusError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.tx
            .send(message)
            .map_err(|err| BusError::Subscriber(err.to_string()))
    }
}

fn collector(
    topic: &str,
    delay: Duration,
) -> (Arc<Collector>, mpsc::UnboundedReceiver<DeviceMessage>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (
        Arc::new(Collector {
            topic: topic.to_string(),
            delay,
            tx,
        }),
        rx,
    )
}

fn message(id: &str) -> DeviceMessage {
    DeviceMessage {
        id: id.to_string(),
        request_id: id.to_string(),
        method: "thing.event.post".to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn subscriber_registered_before_post_receives_message() {
    let bus = LocalMessageBus::default();
    let (first, mut first_rx) = collector(DEVICE_MESSAGE_TOPIC, Duration::ZERO);
    let (second, mut second_rx) = collector(DEVICE_MESSAGE_TOPIC, Duration::ZERO);
    bus.register(first).expect("register");
    bus.register(second).expect("register");

    bus.post(DEVICE_MESSAGE_TOPIC, message("m-1"))
        .await
        .expect("post");

    let got = tokio::time::timeout(Duration::from_secs(1), first_rx.recv())
        .await
        .expect("first in time")
        .expect("first message");
    assert_eq!(got.id, "m-1");
    let got = tokio::time::timeout(Duration::from_secs(1), second_rx.recv())
        .await
        .expect("second in time")
        .expect("second message");
    assert_eq!(got.id, "m-1");
}

#[tokio::test]
async fn subscriber_registered_after_post_misses_message() {
    let bus = LocalMessageBus::default();
    bus.post(DEVICE_MESSAGE_TOPIC, message("early"))
        .await
        .expect("post without subscribers");
    let (late, mut late_rx) = collector(DEVICE_MESSAGE_TOPIC, Duration::ZERO);
    bus.register(late).expect("register");

    assert!(bus.drain(Duration::from_secs(1)).await);
    assert!(late_rx.try_recv().is_err());
}

#[tokio::test]
async fn topics_are_isolated() {
    let bus = LocalMessageBus::default();
    let topic = gateway_downstream_topic("gw-1");
    assert_eq!(topic, "iot_gateway_downstream_gw-1");
    let (sub, mut rx) = collector(&topic, Duration::ZERO);
    bus.register(sub).expect("register");

    bus.post(&gateway_downstream_topic("gw-2"), message("other"))
        .await
        .expect("post");
    assert!(bus.drain(Duration::from_secs(1)).await);
    assert!(rx.try_recv().is_err());
    assert_eq!(bus.subscriber_count(&topic), 1);
}

#[tokio::test]
async fn drain_waits_for_slow_subscriber_and_post_after_close_fails() {
    let bus = LocalMessageBus::new(BusConfig {
        max_in_flight: 4,
        dispatch_timeout: Duration::from_secs(5),
    });
    let (slow, mut rx) = collector(DEVICE_MESSAGE_TOPIC, Duration::from_millis(150));
    bus.register(slow).expect("register");
    bus.post(DEVICE_MESSAGE_TOPIC, message("slow"))
        .await
        .expect("post");

    assert!(bus.drain(Duration::from_secs(2)).await);
    let got = rx.try_recv().expect("delivered before drain returned");
    assert_eq!(got.id, "slow");

    assert!(matches!(
        bus.post(DEVICE_MESSAGE_TOPIC, message("late")).await,
        Err(BusError::Closed)
    ));
}

/// 把收到的消息转投到另一个主题。
struct Relay {
    bus: Arc<LocalMessageBus>,
    target: String,
}

#[async_trait]
impl Subscriber for Relay {
    fn topic(&self) -> String {
        DEVICE_MESSAGE_TOPIC.to_string()
    }

    async fn on_message(&self, message: DeviceMessage) -> Result<(), BusError> {
        self.bus.post(&self.target, message).await
    }
}

#[tokio::test]
async fn relay_from_dispatch_does_not_wait_on_own_pool() {
    let bus = Arc::new(LocalMessageBus::new(BusConfig {
        max_in_flight: 1,
        dispatch_timeout: Duration::from_millis(500),
    }));
    let target = gateway_downstream_topic("gw-1");
    let (sink, mut rx) = collector(&target, Duration::from_millis(5));
    bus.register(sink).expect("register sink");
    bus.register(Arc::new(Relay {
        bus: bus.clone(),
        target: target.clone(),
    }))
    .expect("register relay");

    for i in 0..16 {
        bus.post(DEVICE_MESSAGE_TOPIC, message(&format!("m-{i}")))
            .await
            .expect("post");
    }

    let mut received = 0;
    while received < 16 {
        tokio::time::timeout(Duration::from_millis(400), rx.recv())
            .await
            .expect("relayed before dispatch timeout")
            .expect("relayed message");
        received += 1;
    }
    assert!(bus.drain(Duration::from_secs(2)).await);
    assert!(bus.is_closed());
}
