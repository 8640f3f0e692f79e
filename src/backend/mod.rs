//! 后端服务抽象
//!
//! 所有实现（HTTP / Mock）提供同一组操作：拉取暂存列表、删除暂存项、
//! 停止托管、提交单项为订单。引擎只依赖这个 trait，与传输方式无关。

mod http;
mod mock;

pub use http::HttpBackend;
pub use mock::MockBackend;

use async_trait::async_trait;
use thiserror::Error;

use crate::core::{Order, StagedItem};

/// 后端调用错误
#[derive(Error, Debug, Clone)]
pub enum BackendError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Service rejected request: {status} {message}")]
    Rejected { status: u16, message: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// 暂存后端接口
#[async_trait]
pub trait StagingBackend: Send + Sync {
    /// 拉取用户当前的暂存列表（权威数据源）
    async fn fetch_pending(&self, user_id: &str) -> Result<Vec<StagedItem>, BackendError>;

    /// 按 ID 删除暂存项
    async fn delete_pending(&self, user_id: &str, item_id: &str) -> Result<(), BackendError>;

    /// 停止托管代理（可能失败，本地状态变更不依赖它成功）
    async fn stop_agent(&self, user_id: &str) -> Result<(), BackendError>;

    /// 提交单个暂存项，转化为订单
    async fn commit_item(&self, user_id: &str, item: &StagedItem) -> Result<Order, BackendError>;
}
