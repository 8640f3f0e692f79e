//! 对账轮询器
//!
//! 会话激活时启动唯一一个周期任务，按固定周期调用 StagingStore::refresh，
//! 用 running 标志挡住重入启动，用 CancellationToken 保证拆除后不再有任何
//! 刻度触发、不泄漏计时器。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::core::store::StagingStore;

/// 周期对账轮询器
pub struct ReconciliationPoller {
    period: Duration,
    running: AtomicBool,
    token: Mutex<Option<CancellationToken>>,
}

impl ReconciliationPoller {
    pub fn new(period: Duration) -> Self {
        Self {
            period,
            running: AtomicBool::new(false),
            token: Mutex::new(None),
        }
    }

    /// 启动轮询；已在运行时是空操作（重入激活不会产生第二个计时器）
    pub fn start(&self, store: Arc<StagingStore>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        let token = CancellationToken::new();
        *self.token.lock().expect("poller lock poisoned") = Some(token.clone());

        let period = self.period;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        store.refresh().await;
                    }
                }
            }
            tracing::debug!("Reconciliation poller stopped");
        });
    }

    /// 停止轮询并取消计时器
    pub fn stop(&self) {
        if let Some(token) = self.token.lock().expect("poller lock poisoned").take() {
            token.cancel();
        }
        self.running.store(false, Ordering::SeqCst);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

impl Drop for ReconciliationPoller {
    fn drop(&mut self) {
        self.stop();
    }
}
