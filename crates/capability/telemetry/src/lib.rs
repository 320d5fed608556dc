//! 追踪、请求 ID 与网关计数指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 请求级追踪标识。
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// 指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub upstream_received: u64,
    pub upstream_decoded: u64,
    pub upstream_dropped: u64,
    pub downstream_sent: u64,
    pub downstream_failed: u64,
    pub bus_posted: u64,
    pub bus_dispatched: u64,
    pub bus_timeouts: u64,
    pub bus_rejected: u64,
    pub bus_dispatch_latency_ms_total: u64,
    pub bus_dispatch_latency_ms_count: u64,
    pub auth_success: u64,
    pub auth_failure: u64,
    pub connections_registered: u64,
    pub connections_evicted: u64,
    pub replies_sent: u64,
    pub audit_failures: u64,
    pub ota_progress_updates: u64,
}

/// 进程级计数指标。
pub struct TelemetryMetrics {
    upstream_received: AtomicU64,
    upstream_decoded: AtomicU64,
    upstream_dropped: AtomicU64,
    downstream_sent: AtomicU64,
    downstream_failed: AtomicU64,
    bus_posted: AtomicU64,
    bus_dispatched: AtomicU64,
    bus_timeouts: AtomicU64,
    bus_rejected: AtomicU64,
    bus_dispatch_latency_ms_total: AtomicU64,
    bus_dispatch_latency_ms_count: AtomicU64,
    auth_success: AtomicU64,
    auth_failure: AtomicU64,
    connections_registered: AtomicU64,
    connections_evicted: AtomicU64,
    replies_sent: AtomicU64,
    audit_failures: AtomicU64,
    ota_progress_updates: AtomicU64,
}

impl TelemetryMetrics {
    pub fn new() -> Self {
        Self {
            upstream_received: AtomicU64::new(0),
            upstream_decoded: AtomicU64::new(0),
            upstream_dropped: AtomicU64::new(0),
            downstream_sent: AtomicU64::new(0),
            downstream_failed: AtomicU64::new(0),
            bus_posted: AtomicU64::new(0),
            bus_dispatched: AtomicU64::new(0),
            bus_timeouts: AtomicU64::new(0),
            bus_rejected: AtomicU64::new(0),
            bus_dispatch_latency_ms_total: AtomicU64::new(0),
            bus_dispatch_latency_ms_count: AtomicU64::new(0),
            auth_success: AtomicU64::new(0),
            auth_failure: AtomicU64::new(0),
            connections_registered: AtomicU64::new(0),
            connections_evicted: AtomicU64::new(0),
            replies_sent: AtomicU64::new(0),
            audit_failures: AtomicU64::new(0),
            ota_progress_updates: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            upstream_received: self.upstream_received.load(Ordering::Relaxed),
            upstream_decoded: self.upstream_decoded.load(Ordering::Relaxed),
            upstream_dropped: self.upstream_dropped.load(Ordering::Relaxed),
            downstream_sent: self.downstream_sent.load(Ordering::Relaxed),
            downstream_failed: self.downstream_failed.load(Ordering::Relaxed),
            bus_posted: self.bus_posted.load(Ordering::Relaxed),
            bus_dispatched: self.bus_dispatched.load(Ordering::Relaxed),
            bus_timeouts: self.bus_timeouts.load(Ordering::Relaxed),
            bus_rejected: self.bus_rejected.load(Ordering::Relaxed),
            bus_dispatch_latency_ms_total: self
                .bus_dispatch_latency_ms_total
                .load(Ordering::Relaxed),
            bus_dispatch_latency_ms_count: self
                .bus_dispatch_latency_ms_count
                .load(Ordering::Relaxed),
            auth_success: self.auth_success.load(Ordering::Relaxed),
            auth_failure: self.auth_failure.load(Ordering::Relaxed),
            connections_registered: self.connections_registered.load(Ordering::Relaxed),
            connections_evicted: self.connections_evicted.load(Ordering::Relaxed),
            replies_sent: self.replies_sent.load(Ordering::Relaxed),
            audit_failures: self.audit_failures.load(Ordering::Relaxed),
            ota_progress_updates: self.ota_progress_updates.load(Ordering::Relaxed),
        }
    }
}

impl Default for TelemetryMetrics {
    fn default() -> Self {
        Self::new()
    }
}

static METRICS: OnceLock<TelemetryMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static TelemetryMetrics {
    METRICS.get_or_init(TelemetryMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的 request_id 与 trace_id。
pub fn new_request_ids() -> RequestIds {
    RequestIds {
        request_id: uuid::Uuid::new_v4().to_string(),
        trace_id: uuid::Uuid::new_v4().to_string(),
    }
}

/// 记录收到的上行 MQTT 报文。
pub fn record_upstream_received() {
    metrics().upstream_received.fetch_add(1, Ordering::Relaxed);
}

/// 记录解码成功的上行报文。
pub fn record_upstream_decoded() {
    metrics().upstream_decoded.fetch_add(1, Ordering::Relaxed);
}

/// 记录丢弃的上行报文（Topic 非法、解码失败、设备未知）。
pub fn record_upstream_dropped() {
    metrics().upstream_dropped.fetch_add(1, Ordering::Relaxed);
}

pub fn record_downstream_sent() {
    metrics().downstream_sent.fetch_add(1, Ordering::Relaxed);
}

pub fn record_downstream_failed() {
    metrics().downstream_failed.fetch_add(1, Ordering::Relaxed);
}

pub fn record_bus_posted() {
    metrics().bus_posted.fetch_add(1, Ordering::Relaxed);
}

/// 记录一次订阅者分发完成及其耗时（毫秒）。
pub fn record_bus_dispatched(latency_ms: u64) {
    let metrics = metrics();
    metrics.bus_dispatched.fetch_add(1, Ordering::Relaxed);
    metrics
        .bus_dispatch_latency_ms_total
        .fetch_add(latency_ms, Ordering::Relaxed);
    metrics
        .bus_dispatch_latency_ms_count
        .fetch_add(1, Ordering::Relaxed);
}

pub fn record_bus_timeout() {
    metrics().bus_timeouts.fetch_add(1, Ordering::Relaxed);
}

/// 记录总线关闭后被拒绝的投递。
pub fn record_bus_rejected() {
    metrics().bus_rejected.fetch_add(1, Ordering::Relaxed);
}

pub fn record_auth_success() {
    metrics().auth_success.fetch_add(1, Ordering::Relaxed);
}

pub fn record_auth_failure() {
    metrics().auth_failure.fetch_add(1, Ordering::Relaxed);
}

pub fn record_connection_registered() {
    metrics()
        .connections_registered
        .fetch_add(1, Ordering::Relaxed);
}

/// 记录心跳超时被清理的连接。
pub fn record_connection_evicted() {
    metrics().connections_evicted.fetch_add(1, Ordering::Relaxed);
}

pub fn record_reply_sent() {
    metrics().replies_sent.fetch_add(1, Ordering::Relaxed);
}

pub fn record_audit_failure() {
    metrics().audit_failures.fetch_add(1, Ordering::Relaxed);
}

pub fn record_ota_progress_update() {
    metrics()
        .ota_progress_updates
        .fetch_add(1, Ordering::Relaxed);
}
