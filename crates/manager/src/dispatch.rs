use kanshi_core::config::NotifyConfig;
use kanshi_core::monitor::entity::CycleReport;
use kanshi_core::notify::port::NotificationSink;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// # Summary
/// 尽力而为的通知分发器，把周期报告与周期完成解耦。
///
/// # Invariants
/// - 队列有界，满时丢弃新报告并记录警告，调度器永远不会因此阻塞。
/// - 单个通知端失败或超时只记录日志，不影响其他通知端。
pub struct NotificationDispatcher {
    tx: Mutex<Option<mpsc::Sender<Arc<CycleReport>>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl NotificationDispatcher {
    /// # Summary
    /// 创建分发器并启动后台分发协程。
    ///
    /// # Arguments
    /// * `sinks` - 所有通知端，按顺序逐个发布。
    /// * `config` - 队列容量与单次发布超时。
    pub fn spawn(sinks: Vec<Arc<dyn NotificationSink>>, config: &NotifyConfig) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity);
        let worker = tokio::spawn(run(sinks, rx, config.publish_timeout()));
        Self {
            tx: Mutex::new(Some(tx)),
            worker: Mutex::new(Some(worker)),
        }
    }

    /// 将报告放入队列，不等待发布完成
    pub fn enqueue(&self, report: Arc<CycleReport>) {
        let guard = self.tx.lock().unwrap_or_else(|p| p.into_inner());
        let Some(tx) = guard.as_ref() else {
            debug!("Dispatcher closed, dropping report for cycle {}", report.cycle_id);
            return;
        };
        match tx.try_send(report) {
            Ok(()) => {}
            Err(TrySendError::Full(report)) => {
                warn!("Notification queue full, dropping report for cycle {}", report.cycle_id);
            }
            Err(TrySendError::Closed(report)) => {
                warn!("Notification worker gone, dropping report for cycle {}", report.cycle_id);
            }
        }
    }

    /// # Summary
    /// 关闭队列并等待已入队的报告发布完成。
    ///
    /// # Arguments
    /// * `grace` - 最长等待时间，超时后放弃剩余报告。
    pub async fn shutdown(&self, grace: Duration) {
        drop(self.tx.lock().unwrap_or_else(|p| p.into_inner()).take());
        let worker = self.worker.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(worker) = worker {
            match tokio::time::timeout(grace, worker).await {
                Ok(Ok(())) => debug!("Notification worker drained"),
                Ok(Err(e)) => warn!("Notification worker failed: {}", e),
                Err(_) => warn!("Notification worker did not drain within {:?}", grace),
            }
        }
    }
}

async fn run(sinks: Vec<Arc<dyn NotificationSink>>, mut rx: mpsc::Receiver<Arc<CycleReport>>, timeout: Duration) {
    info!("Notification worker started with {} sink(s)", sinks.len());
    while let Some(report) = rx.recv().await {
        for sink in &sinks {
            match tokio::time::timeout(timeout, sink.publish(&report)).await {
                Ok(Ok(())) => debug!("Sink {} published cycle {}", sink.name(), report.cycle_id),
                Ok(Err(e)) => warn!("Sink {} failed for cycle {}: {}", sink.name(), report.cycle_id, e),
                Err(_) => warn!(
                    "Sink {} timed out after {:?} for cycle {}",
                    sink.name(),
                    timeout,
                    report.cycle_id
                ),
            }
        }
    }
    info!("Notification worker stopped");
}
