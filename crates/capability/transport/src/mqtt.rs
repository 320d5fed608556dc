use crate::downstream::DownstreamPublisher;
use crate::upstream::UpstreamHandler;
use crate::{MqttTransportConfig, TransportError};
use async_trait::async_trait;
use rumqttc::{AsyncClient, ConnectReturnCode, Event, EventLoop, MqttOptions, Packet, QoS};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// Broker 连接：事件循环驱动上行，客户端句柄用于下行发布。
#[derive(Clone)]
pub struct MqttTransport {
    client: AsyncClient,
}

impl MqttTransport {
    /// 建立客户端并启动事件循环；每次 ConnAck 成功后重新订阅。
    pub fn connect(
        config: MqttTransportConfig,
        handler: Arc<UpstreamHandler>,
        cancel: CancellationToken,
    ) -> Result<(Self, JoinHandle<()>), TransportError> {
        if config.host.trim().is_empty() {
            return Err(TransportError::Connect("mqtt host is empty".to_string()));
        }
        let mut options = MqttOptions::new(config.client_id.clone(), config.host.clone(), config.port);
        options.set_keep_alive(config.keep_alive);
        options.set_clean_session(config.clean_session);
        if let (Some(username), Some(password)) = (config.username.clone(), config.password.clone()) {
            options.set_credentials(username, password);
        }
        let (client, eventloop) = AsyncClient::new(options, 10);
        let filters = config.subscription_filters();
        info!(
            target: "iot.transport",
            host = %config.host,
            port = config.port,
            client_id = %config.client_id,
            filters = filters.len(),
            "mqtt_transport_starting"
        );
        let handle = tokio::spawn(run_event_loop(
            eventloop,
            client.clone(),
            handler,
            filters,
            config,
            cancel,
        ));
        Ok((Self { client }, handle))
    }

    pub async fn disconnect(&self) -> Result<(), TransportError> {
        self.client
            .disconnect()
            .await
            .map_err(|err| TransportError::Connect(err.to_string()))
    }
}

#[async_trait]
impl DownstreamPublisher for MqttTransport {
    async fn publish(&self, topic: String, payload: Vec<u8>) -> Result<(), TransportError> {
        self.client
            .publish(topic, QoS::AtLeastOnce, false, payload)
            .await
            .map_err(|err| TransportError::Publish(err.to_string()))
    }
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    client: AsyncClient,
    handler: Arc<UpstreamHandler>,
    filters: Vec<String>,
    config: MqttTransportConfig,
    cancel: CancellationToken,
) {
    let mut connected = false;
    loop {
        let polled = tokio::select! {
            _ = cancel.cancelled() => break,
            polled = poll_once(&mut eventloop, connected, config.connect_timeout) => polled,
        };
        match polled {
            Ok(Event::Incoming(Packet::ConnAck(ack))) => {
                if ack.code == ConnectReturnCode::Success {
                    connected = true;
                    info!(
                        target: "iot.transport",
                        session_present = ack.session_present,
                        "mqtt_connected"
                    );
                    spawn_subscribe(client.clone(), filters.clone());
                } else {
                    connected = false;
                    warn!(target: "iot.transport", code = ?ack.code, "mqtt_connect_refused");
                }
            }
            Ok(Event::Incoming(Packet::Publish(publish))) => {
                dispatch_publish(handler.clone(), publish.topic, publish.payload.to_vec());
            }
            Ok(_) => {}
            Err(err) => {
                connected = false;
                warn!(target: "iot.transport", error = %err, "mqtt_eventloop_error");
                if !config.auto_reconnect {
                    break;
                }
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(config.reconnect_delay) => {}
                }
            }
        }
    }
    info!(target: "iot.transport", "mqtt_eventloop_stopped");
}

/// 未连上时 poll 受连接期限约束。
async fn poll_once(
    eventloop: &mut EventLoop,
    connected: bool,
    connect_timeout: Duration,
) -> Result<Event, TransportError> {
    if connected {
        return eventloop
            .poll()
            .await
            .map_err(|err| TransportError::Connect(err.to_string()));
    }
    match tokio::time::timeout(connect_timeout, eventloop.poll()).await {
        Ok(polled) => polled.map_err(|err| TransportError::Connect(err.to_string())),
        Err(_) => Err(TransportError::Connect(format!(
            "no connack within {}ms",
            connect_timeout.as_millis()
        ))),
    }
}

/// 订阅请求走客户端队列，放到独立任务里避免阻塞事件循环。
fn spawn_subscribe(client: AsyncClient, filters: Vec<String>) {
    tokio::spawn(async move {
        for filter in filters {
            match client.subscribe(filter.clone(), QoS::AtLeastOnce).await {
                Ok(()) => info!(target: "iot.transport", filter = %filter, "mqtt_subscribed"),
                Err(err) => {
                    warn!(target: "iot.transport", filter = %filter, error = %err, "mqtt_subscribe_failed")
                }
            }
        }
    });
}

/// 每条 publish 一个任务；处理器 panic 只影响这一条消息。
fn dispatch_publish(handler: Arc<UpstreamHandler>, topic: String, payload: Vec<u8>) {
    let guarded_topic = topic.clone();
    let task = tokio::spawn(async move {
        let _ = handler.handle_publish(&topic, &payload).await;
    });
    tokio::spawn(async move {
        if let Err(err) = task.await
            && err.is_panic()
        {
            iot_telemetry::record_upstream_dropped();
            error!(target: "iot.transport", topic = %guarded_topic, "upstream_handler_panicked");
        }
    });
}
