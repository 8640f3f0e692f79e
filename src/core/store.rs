//! 暂存商品列表：本地权威副本
//!
//! refresh 整体替换本地列表（不做合并），保证已提交/已删除的项一定消失；
//! remove 先乐观删本地再异步确认远端，失败只提示、绝不把商品擅自加回来，
//! 下一次 refresh 是唯一权威，会自然纠正一切乐观假设。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};

use crate::backend::StagingBackend;
use crate::core::events::EngineEvent;
use crate::core::types::StagedItem;

/// 暂存列表存储
pub struct StagingStore {
    user_id: String,
    backend: Arc<dyn StagingBackend>,
    items: RwLock<Vec<StagedItem>>,
    /// 最近一次后台刷新是否失败（软错误，展示层可选读取）
    stale: AtomicBool,
    events: broadcast::Sender<EngineEvent>,
}

impl StagingStore {
    pub fn new(
        user_id: impl Into<String>,
        backend: Arc<dyn StagingBackend>,
        events: broadcast::Sender<EngineEvent>,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            backend,
            items: RwLock::new(Vec::new()),
            stale: AtomicBool::new(false),
            events,
        }
    }

    /// 从后端拉取并整体替换本地列表
    ///
    /// 失败时保留旧列表并标记 stale，只记日志；后台轮询失败不打扰用户。
    pub async fn refresh(&self) {
        match self.backend.fetch_pending(&self.user_id).await {
            Ok(fresh) => {
                *self.items.write().await = fresh;
                self.stale.store(false, Ordering::SeqCst);
                self.emit_items().await;
            }
            Err(e) => {
                self.stale.store(true, Ordering::SeqCst);
                tracing::warn!("Pending list refresh failed, keeping previous list: {}", e);
            }
        }
    }

    /// 上游选品服务把候选商品放进暂存区（唯一的写入入口契约）
    pub async fn add(&self, candidate: StagedItem) {
        self.items.write().await.push(candidate);
        self.emit_items().await;
    }

    /// 移除暂存项：本地立即删除，远端删除异步确认
    ///
    /// 远端失败只发提示，不把商品加回来；若删除确实没成功，
    /// 下一次 refresh 会把它带回列表。
    pub async fn remove(&self, item_id: &str) {
        let removed = {
            let mut items = self.items.write().await;
            let before = items.len();
            items.retain(|i| i.id != item_id);
            before != items.len()
        };
        if !removed {
            return;
        }
        self.emit_items().await;

        let backend = Arc::clone(&self.backend);
        let user_id = self.user_id.clone();
        let item_id = item_id.to_string();
        let events = self.events.clone();
        tokio::spawn(async move {
            if let Err(e) = backend.delete_pending(&user_id, &item_id).await {
                tracing::warn!("Remote delete for {} failed: {}", item_id, e);
                let _ = events.send(EngineEvent::Notice {
                    text: "移除未同步成功，列表稍后会自动校正".to_string(),
                });
            }
        });
    }

    /// 提交成功后的本地清理：只删掉给定 ID，提交失败的项保持暂存
    pub async fn remove_committed(&self, item_ids: &[String]) {
        if item_ids.is_empty() {
            return;
        }
        {
            let mut items = self.items.write().await;
            items.retain(|i| !item_ids.contains(&i.id));
        }
        self.emit_items().await;
    }

    /// 当前列表快照（克隆，调用方不会拿到跨回调的陈旧引用）
    pub async fn snapshot(&self) -> Vec<StagedItem> {
        self.items.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.items.read().await.len()
    }

    /// 列表合计金币数（整币）
    pub async fn total_coins(&self) -> i64 {
        self.items.read().await.iter().map(|i| i.coins()).sum()
    }

    pub fn is_stale(&self) -> bool {
        self.stale.load(Ordering::SeqCst)
    }

    async fn emit_items(&self) {
        let items = self.items.read().await;
        let _ = self.events.send(EngineEvent::ItemsChanged {
            count: items.len(),
            total_coins: items.iter().map(|i| i.coins()).sum(),
        });
    }
}
