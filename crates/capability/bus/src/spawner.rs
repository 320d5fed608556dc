use crate::BusError;
use iot_telemetry::record_bus_timeout;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::task::TaskTracker;
use tracing::warn;

/// 有界任务派发器。
///
/// - 信号量限制在途任务数，许可耗尽时 `spawn` 等待（背压）
/// - 每个任务包一层超时
/// - `close` 后拒绝新任务，`drain` 等待在途任务结束
#[derive(Clone)]
pub struct BoundedSpawner {
    name: &'static str,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
    task_timeout: Duration,
}

impl BoundedSpawner {
    pub fn new(name: &'static str, max_in_flight: usize, task_timeout: Duration) -> Self {
        Self {
            name,
            permits: Arc::new(Semaphore::new(max_in_flight.max(1))),
            tracker: TaskTracker::new(),
            task_timeout,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn task_timeout(&self) -> Duration {
        self.task_timeout
    }

    pub fn is_closed(&self) -> bool {
        self.tracker.is_closed()
    }

    /// 当前在途任务数。
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub async fn spawn<F>(&self, task: F) -> Result<(), BusError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if self.tracker.is_closed() {
            return Err(BusError::Closed);
        }
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| BusError::Closed)?;
        let name = self.name;
        let deadline = self.task_timeout;
        self.tracker.spawn(async move {
            let _permit = permit;
            if tokio::time::timeout(deadline, task).await.is_err() {
                record_bus_timeout();
                warn!(
                    target: "iot.bus",
                    pool = name,
                    timeout_ms = deadline.as_millis() as u64,
                    "bounded_task_timed_out"
                );
            }
        });
        Ok(())
    }

    /// 停止接收新任务；等待许可的调用方随之返回 `Closed`。
    pub fn close(&self) {
        self.tracker.close();
        self.permits.close();
    }

    /// 关闭并等待在途任务，超过期限返回 `false`。
    pub async fn drain(&self, deadline: Duration) -> bool {
        self.close();
        tokio::time::timeout(deadline, self.tracker.wait())
            .await
            .is_ok()
    }
}
