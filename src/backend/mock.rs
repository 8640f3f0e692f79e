//! Mock 后端（用于测试，无需真实服务）
//!
//! 内存中维护一份「服务端」暂存列表，支持按操作注入失败与统计调用次数，
//! 便于覆盖乐观更新、对账与部分提交失败的两条分支。

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{BackendError, StagingBackend};
use crate::core::{Order, StagedItem};

/// Mock 后端：服务端列表 + 可注入的失败
#[derive(Default)]
pub struct MockBackend {
    items: RwLock<Vec<StagedItem>>,
    /// 每个商品剩余的提交失败次数（u32::MAX 表示永远失败）
    commit_failures: RwLock<HashMap<String, u32>>,
    fail_fetch: AtomicBool,
    fail_delete: AtomicBool,
    fail_stop: AtomicBool,
    pub fetch_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub stop_calls: AtomicUsize,
    pub commit_calls: AtomicUsize,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置服务端暂存列表
    pub async fn seed(&self, items: Vec<StagedItem>) {
        *self.items.write().await = items;
    }

    /// 服务端当前列表快照
    pub async fn server_items(&self) -> Vec<StagedItem> {
        self.items.read().await.clone()
    }

    pub fn set_fail_fetch(&self, fail: bool) {
        self.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_delete(&self, fail: bool) {
        self.fail_delete.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_stop(&self, fail: bool) {
        self.fail_stop.store(fail, Ordering::SeqCst);
    }

    /// 指定商品接下来 n 次提交失败
    pub async fn fail_commit_times(&self, item_id: &str, n: u32) {
        self.commit_failures.write().await.insert(item_id.to_string(), n);
    }

    /// 指定商品的提交永远失败
    pub async fn fail_commit_always(&self, item_id: &str) {
        self.commit_failures.write().await.insert(item_id.to_string(), u32::MAX);
    }

    fn unreachable_err() -> BackendError {
        BackendError::Network("connection refused".to_string())
    }
}

#[async_trait]
impl StagingBackend for MockBackend {
    async fn fetch_pending(&self, _user_id: &str) -> Result<Vec<StagedItem>, BackendError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_fetch.load(Ordering::SeqCst) {
            return Err(Self::unreachable_err());
        }
        Ok(self.items.read().await.clone())
    }

    async fn delete_pending(&self, _user_id: &str, item_id: &str) -> Result<(), BackendError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_delete.load(Ordering::SeqCst) {
            return Err(Self::unreachable_err());
        }
        self.items.write().await.retain(|i| i.id != item_id);
        Ok(())
    }

    async fn stop_agent(&self, _user_id: &str) -> Result<(), BackendError> {
        self.stop_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_stop.load(Ordering::SeqCst) {
            return Err(Self::unreachable_err());
        }
        Ok(())
    }

    async fn commit_item(&self, _user_id: &str, item: &StagedItem) -> Result<Order, BackendError> {
        self.commit_calls.fetch_add(1, Ordering::SeqCst);

        let mut failures = self.commit_failures.write().await;
        if let Some(remaining) = failures.get_mut(&item.id) {
            if *remaining == u32::MAX {
                return Err(Self::unreachable_err());
            }
            if *remaining > 0 {
                *remaining -= 1;
                return Err(Self::unreachable_err());
            }
        }
        drop(failures);

        // 提交是移动：服务端暂存列表里对应项随订单产生而消失
        self.items.write().await.retain(|i| i.id != item.id);
        Ok(Order::from_staged(item.clone()))
    }
}
