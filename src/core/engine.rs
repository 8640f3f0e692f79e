//! 暂存引擎门面
//!
//! 把启停控制、暂存列表、对账轮询、倒计时刻度与到期提交收拢进一个权威对象，
//! 对外只暴露窄读取口（快照 + 事件订阅），不再让两份可变状态互相手工同步。
//! 三个计时面：1 秒倒计时刻度、周期对账轮询、一次性的到期提交；拆除会话时
//! 全部取消，之后不会再有任何刻度触发。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::backend::StagingBackend;
use crate::config::AppConfig;
use crate::core::commit::CommitOrchestrator;
use crate::core::countdown::CountdownClock;
use crate::core::events::EngineEvent;
use crate::core::poller::ReconciliationPoller;
use crate::core::session::{AgentSession, EnablementController};
use crate::core::store::StagingStore;
use crate::core::types::StagedItem;
use crate::persist::SessionPersistence;

/// 当前墙钟时间（毫秒时间戳）
pub fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 引擎计时参数
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// 倒计时刻度周期
    pub tick: Duration,
    /// 对账轮询周期
    pub poll_interval: Duration,
    /// 到期提交每项失败后的立即重试次数
    pub commit_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick: Duration::from_secs(1),
            poll_interval: Duration::from_secs(30),
            commit_retries: 1,
        }
    }
}

impl EngineConfig {
    pub fn from_app(cfg: &AppConfig) -> Self {
        Self {
            tick: Duration::from_secs(cfg.agent.tick_secs.max(1)),
            poll_interval: Duration::from_secs(cfg.agent.poll_interval_secs.max(1)),
            commit_retries: cfg.agent.commit_retries,
        }
    }
}

/// 单个用户的暂存引擎
pub struct StagingEngine {
    user_id: String,
    cfg: EngineConfig,
    backend: Arc<dyn StagingBackend>,
    store: Arc<StagingStore>,
    controller: EnablementController,
    poller: ReconciliationPoller,
    persistence: Option<SessionPersistence>,
    events: broadcast::Sender<EngineEvent>,
    ticker_running: AtomicBool,
    ticker_token: Mutex<Option<CancellationToken>>,
}

impl StagingEngine {
    pub fn new(
        user_id: impl Into<String>,
        backend: Arc<dyn StagingBackend>,
        cfg: EngineConfig,
        persistence: Option<SessionPersistence>,
    ) -> Arc<Self> {
        let user_id = user_id.into();
        let (events, _) = broadcast::channel(256);
        let store = Arc::new(StagingStore::new(
            user_id.clone(),
            Arc::clone(&backend),
            events.clone(),
        ));
        let poller = ReconciliationPoller::new(cfg.poll_interval);
        Arc::new(Self {
            controller: EnablementController::new(events.clone()),
            user_id,
            cfg,
            backend,
            store,
            poller,
            persistence,
            events,
            ticker_running: AtomicBool::new(false),
            ticker_token: Mutex::new(None),
        })
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    /// 订阅引擎事件（展示层的唯一读取契约）
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.events.subscribe()
    }

    /// 当前会话快照
    pub fn session(&self) -> AgentSession {
        self.controller.session()
    }

    /// 当前暂存列表快照
    pub async fn items(&self) -> Vec<StagedItem> {
        self.store.snapshot().await
    }

    /// 列表合计金币数（整币）
    pub async fn total_coins(&self) -> i64 {
        self.store.total_coins().await
    }

    /// 最近一次后台对账是否失败
    pub fn is_stale(&self) -> bool {
        self.store.is_stale()
    }

    /// 上游选品服务把候选商品放进暂存区
    pub async fn stage(&self, candidate: StagedItem) {
        self.store.add(candidate).await;
    }

    /// 用户移除一个暂存项
    pub async fn remove_item(&self, item_id: &str) {
        self.store.remove(item_id).await;
    }

    /// 启用托管窗口；重复启用不缩短已更晚的结束时间
    pub fn enable(self: &Arc<Self>, window: Duration) {
        let end = self.controller.enable(window, now_ms());
        self.persist_end(Some(end));
        self.poller.start(Arc::clone(&self.store));
        self.spawn_ticker();
        tracing::info!("Delegation window enabled until {} for {}", end, self.user_id);
    }

    /// 用户主动停止：不提交，暂存商品留给将来的托管周期
    ///
    /// 本地状态在当前事件循环回合内回到 Disabled；远端停用异步补发，
    /// 失败只提示，下一次对账自然对齐。
    pub fn stop(self: &Arc<Self>) {
        if !self.controller.begin_stop() {
            return;
        }
        self.stop_timers();
        self.persist_end(None);
        tracing::info!("Delegation stopped for {}, staged items kept", self.user_id);

        let backend = Arc::clone(&self.backend);
        let user_id = self.user_id.clone();
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.stop_agent(&user_id).await {
                tracing::warn!("Remote stop failed, local state already disabled: {}", e);
                let _ = events.send(EngineEvent::Notice {
                    text: "停止指令未同步到服务端，稍后会自动对齐".to_string(),
                });
            }
        });
    }

    /// 进程重启后恢复持久化的会话
    ///
    /// 结束时间还在未来：回到 Active，倒计时基线重新捕获；
    /// 已经过去：停机期间窗口关闭了，补跑一次到期提交。
    pub async fn resume(self: &Arc<Self>) -> anyhow::Result<()> {
        let Some(persistence) = &self.persistence else {
            return Ok(());
        };
        let Some(end) = persistence.load()? else {
            return Ok(());
        };
        self.controller.restore(end);
        if end > now_ms() {
            tracing::info!("Resumed delegation window ending at {}", end);
            self.poller.start(Arc::clone(&self.store));
            self.spawn_ticker();
        } else {
            tracing::info!("Persisted window already elapsed, running expiry commit");
            self.store.refresh().await;
            self.handle_expiry().await;
        }
        Ok(())
    }

    /// 拆除会话（导航离开、登出）：取消全部计时器，之后不再有刻度触发
    pub fn teardown(&self) {
        self.stop_timers();
    }

    fn stop_timers(&self) {
        self.poller.stop();
        if let Some(token) = self
            .ticker_token
            .lock()
            .expect("ticker lock poisoned")
            .take()
        {
            token.cancel();
        }
        self.ticker_running.store(false, Ordering::SeqCst);
    }

    fn persist_end(&self, end_ms: Option<i64>) {
        let Some(persistence) = &self.persistence else {
            return;
        };
        let result = match end_ms {
            Some(ms) => persistence.save(ms),
            None => persistence.clear(),
        };
        if let Err(e) = result {
            tracing::warn!("Session persistence failed: {}", e);
        }
    }

    /// 启动 1 秒倒计时刻度任务；已在跑时是空操作（时钟会自行重定向到更晚的结束时间）
    fn spawn_ticker(self: &Arc<Self>) {
        if self.ticker_running.swap(true, Ordering::SeqCst) {
            return;
        }
        let token = CancellationToken::new();
        *self
            .ticker_token
            .lock()
            .expect("ticker lock poisoned") = Some(token.clone());

        let engine = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(engine.cfg.tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut clock: Option<CountdownClock> = None;
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        if let Err(e) = engine.controller.check_invariant() {
                            // 不变量破坏对会话致命：强制关闭并清空倒计时状态
                            engine.controller.force_disable(&e.to_string());
                            engine.poller.stop();
                            engine.persist_end(None);
                            break;
                        }
                        if !engine.controller.is_active() {
                            break;
                        }
                        let Some(end) = engine.controller.end_ms() else {
                            break;
                        };
                        let now = now_ms();
                        let clock_ref = clock.get_or_insert_with(|| CountdownClock::new(end, now));
                        // 重复启用延长了窗口时，时钟在下一个刻度重定向
                        clock_ref.retarget(end, now);
                        let (snap, expired) = clock_ref.tick(now);
                        let _ = engine.events.send(EngineEvent::CountdownTick {
                            days: snap.days,
                            hours: snap.hours,
                            minutes: snap.minutes,
                            seconds: snap.seconds,
                            total_seconds_remaining: snap.total_seconds_remaining,
                            progress_fraction: snap.progress_fraction,
                        });
                        if expired {
                            engine.handle_expiry().await;
                            break;
                        }
                    }
                }
            }
            engine.ticker_running.store(false, Ordering::SeqCst);
        });
    }

    /// 到期提交：快照 → 逐项独立提交 → 只移除成功项 → 回到 Disabled
    async fn handle_expiry(self: &Arc<Self>) {
        // 边沿信号之外再挡一层：只有 Active 会话进入提交
        if !self.controller.begin_expiry() {
            return;
        }
        let _ = self.events.send(EngineEvent::Expired);
        self.poller.stop();

        let snapshot = self.store.snapshot().await;
        let total = snapshot.len();
        let orchestrator = CommitOrchestrator::new(
            Arc::clone(&self.backend),
            self.user_id.clone(),
            self.cfg.commit_retries,
        );
        let (report, committed_ids) = orchestrator.commit_all(snapshot).await;

        // 失败项继续留在暂存区，等下一个托管周期
        self.store.remove_committed(&committed_ids).await;
        if !report.failed.is_empty() {
            let _ = self.events.send(EngineEvent::Notice {
                text: format!("{} 件商品提交失败，已保留在暂存区", report.failed.len()),
            });
        }
        let _ = self.events.send(EngineEvent::CommitFinished {
            committed: report.orders.len(),
            failed: report.failed.len(),
        });
        tracing::info!(
            "Window closed for {}: {}/{} committed, {} failed",
            self.user_id,
            report.orders.len(),
            total,
            report.failed.len()
        );

        if self.controller.finish_expiry() {
            self.persist_end(None);
        } else {
            // 提交期间被重新启用：计时面继续跑
            self.poller.start(Arc::clone(&self.store));
            self.spawn_ticker();
        }
    }
}

impl Drop for StagingEngine {
    fn drop(&mut self) {
        self.stop_timers();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use tokio::time::{sleep, Duration};

    fn item(id: &str, price: i64) -> StagedItem {
        StagedItem::new(id, format!("商品{}", id), price, "数码")
    }

    fn fast_cfg() -> EngineConfig {
        EngineConfig {
            tick: Duration::from_millis(20),
            poll_interval: Duration::from_millis(50),
            commit_retries: 1,
        }
    }

    #[tokio::test]
    async fn test_stop_is_local_and_immediate_when_backend_unreachable() {
        let backend = Arc::new(MockBackend::new());
        backend.set_fail_stop(true);
        let engine = StagingEngine::new("u1", Arc::clone(&backend) as _, fast_cfg(), None);

        engine.enable(Duration::from_secs(3600));
        assert!(engine.session().active);

        engine.stop();
        // 不等远端应答，本地已经是 Disabled
        let session = engine.session();
        assert!(!session.active);
        assert_eq!(session.end_ms, None);
    }

    #[tokio::test]
    async fn test_double_enable_keeps_later_end() {
        let backend = Arc::new(MockBackend::new());
        let engine = StagingEngine::new("u1", Arc::clone(&backend) as _, fast_cfg(), None);

        engine.enable(Duration::from_secs(3600));
        let first_end = engine.session().end_ms.unwrap();
        engine.enable(Duration::from_secs(60));
        assert_eq!(engine.session().end_ms, Some(first_end));
        engine.teardown();
    }

    #[tokio::test]
    async fn test_expiry_commits_and_disables() {
        let backend = Arc::new(MockBackend::new());
        backend.seed(vec![item("a", 5000), item("b", 8000)]).await;
        let engine = StagingEngine::new("u1", Arc::clone(&backend) as _, fast_cfg(), None);

        engine.enable(Duration::from_millis(120));
        sleep(Duration::from_millis(400)).await;

        assert!(!engine.session().active);
        assert!(engine.items().await.is_empty());
        // 服务端暂存区也空了（都转成了订单）
        assert!(backend.server_items().await.is_empty());
    }

    #[tokio::test]
    async fn test_teardown_silences_all_timers() {
        let backend = Arc::new(MockBackend::new());
        let engine = StagingEngine::new("u1", Arc::clone(&backend) as _, fast_cfg(), None);

        engine.enable(Duration::from_secs(3600));
        sleep(Duration::from_millis(80)).await;
        engine.teardown();
        sleep(Duration::from_millis(20)).await;

        let fetches = backend.fetch_calls.load(std::sync::atomic::Ordering::SeqCst);
        let mut rx = engine.subscribe();
        sleep(Duration::from_millis(100)).await;
        // 拆除后：不再轮询，也不再有任何刻度事件
        assert_eq!(
            backend.fetch_calls.load(std::sync::atomic::Ordering::SeqCst),
            fetches
        );
        assert!(rx.try_recv().is_err());
    }
}
