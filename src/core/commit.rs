//! 到期提交编排
//!
//! 对暂存列表快照逐项独立提交：并发发出，任何一项失败都不拖累其他项；
//! 每项失败后立即重试一次，再失败就如实上报并留在暂存区，等下一个
//! 托管周期或用户处理。主动停止不走这里：停止只暂停委托，不丢弃选择。

use std::sync::Arc;

use futures_util::future::join_all;

use crate::backend::{BackendError, StagingBackend};
use crate::core::types::{Order, StagedItem};

/// 一轮提交的结果：成功订单与仍留在暂存区的失败项
#[derive(Debug, Default)]
pub struct CommitReport {
    pub orders: Vec<Order>,
    pub failed: Vec<(StagedItem, BackendError)>,
}

/// 提交编排器
pub struct CommitOrchestrator {
    backend: Arc<dyn StagingBackend>,
    user_id: String,
    /// 每项失败后的立即重试次数
    retries: u32,
}

impl CommitOrchestrator {
    pub fn new(backend: Arc<dyn StagingBackend>, user_id: impl Into<String>, retries: u32) -> Self {
        Self {
            backend,
            user_id: user_id.into(),
            retries,
        }
    }

    /// 并发提交整份快照，返回逐项结果与成功项的商品 ID
    pub async fn commit_all(&self, items: Vec<StagedItem>) -> (CommitReport, Vec<String>) {
        let futures = items.into_iter().map(|item| self.commit_one(item));
        let results = join_all(futures).await;

        let mut report = CommitReport::default();
        let mut committed_ids = Vec::new();
        for result in results {
            match result {
                Ok((source_id, order)) => {
                    committed_ids.push(source_id);
                    report.orders.push(order);
                }
                Err((item, e)) => {
                    tracing::warn!("Commit for {} failed permanently: {}", item.id, e);
                    report.failed.push((item, e));
                }
            }
        }
        (report, committed_ids)
    }

    async fn commit_one(
        &self,
        item: StagedItem,
    ) -> Result<(String, Order), (StagedItem, BackendError)> {
        let mut attempt = 0;
        loop {
            match self.backend.commit_item(&self.user_id, &item).await {
                Ok(order) => return Ok((item.id, order)),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    tracing::warn!(
                        "Commit for {} failed (attempt {}), retrying: {}",
                        item.id,
                        attempt,
                        e
                    );
                }
                Err(e) => return Err((item, e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use std::sync::atomic::Ordering;

    fn item(id: &str, price: i64) -> StagedItem {
        StagedItem::new(id, format!("商品{}", id), price, "数码")
    }

    #[tokio::test]
    async fn test_partial_failure_isolated_per_item() {
        let backend = Arc::new(MockBackend::new());
        let items = vec![item("a", 5000), item("b", 8000), item("c", 3000)];
        backend.seed(items.clone()).await;
        backend.fail_commit_always("b").await;

        let orchestrator = CommitOrchestrator::new(Arc::clone(&backend) as _, "u1", 1);
        let (report, committed_ids) = orchestrator.commit_all(items).await;

        // b 失败不拖累 a、c
        assert_eq!(report.orders.len(), 2);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0.id, "b");
        assert!(committed_ids.contains(&"a".to_string()));
        assert!(committed_ids.contains(&"c".to_string()));

        // 服务端视角：b 还在暂存区
        let server: Vec<_> = backend.server_items().await.into_iter().map(|i| i.id).collect();
        assert_eq!(server, vec!["b"]);
    }

    #[tokio::test]
    async fn test_single_retry_absorbs_transient_failure() {
        let backend = Arc::new(MockBackend::new());
        let items = vec![item("a", 5000)];
        backend.seed(items.clone()).await;
        backend.fail_commit_times("a", 1).await;

        let orchestrator = CommitOrchestrator::new(Arc::clone(&backend) as _, "u1", 1);
        let (report, committed_ids) = orchestrator.commit_all(items).await;

        assert_eq!(report.orders.len(), 1);
        assert!(report.failed.is_empty());
        assert_eq!(committed_ids, vec!["a"]);
        // 首次失败 + 重试成功 = 两次调用
        assert_eq!(backend.commit_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_as_failure() {
        let backend = Arc::new(MockBackend::new());
        let items = vec![item("a", 5000)];
        backend.seed(items.clone()).await;
        backend.fail_commit_times("a", 2).await;

        let orchestrator = CommitOrchestrator::new(Arc::clone(&backend) as _, "u1", 1);
        let (report, committed_ids) = orchestrator.commit_all(items).await;

        assert!(report.orders.is_empty());
        assert_eq!(report.failed.len(), 1);
        assert!(committed_ids.is_empty());
    }

    #[tokio::test]
    async fn test_empty_snapshot_is_noop() {
        let backend = Arc::new(MockBackend::new());
        let orchestrator = CommitOrchestrator::new(Arc::clone(&backend) as _, "u1", 1);
        let (report, committed_ids) = orchestrator.commit_all(Vec::new()).await;
        assert!(report.orders.is_empty());
        assert!(report.failed.is_empty());
        assert!(committed_ids.is_empty());
        assert_eq!(backend.commit_calls.load(Ordering::SeqCst), 0);
    }
}
