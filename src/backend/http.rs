//! HTTP 后端实现（JSON）
//!
//! 路由约定：
//! - GET    /users/{id}/pending              拉取暂存列表
//! - DELETE /users/{id}/pending/{item_id}    删除暂存项
//! - POST   /users/{id}/agent/stop           停止托管
//! - POST   /users/{id}/orders               提交暂存项为订单

use async_trait::async_trait;
use reqwest::Client;

use super::{BackendError, StagingBackend};
use crate::core::{Order, StagedItem};

/// 基于 reqwest 的后端客户端
pub struct HttpBackend {
    client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(base_url: impl Into<String>, request_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(request_timeout_secs))
            .build()
            .unwrap_or_default();
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

/// 非 2xx 响应统一转为 Rejected，保留状态码与响应体
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(BackendError::Rejected {
        status: status.as_u16(),
        message,
    })
}

fn network_err(e: reqwest::Error) -> BackendError {
    BackendError::Network(e.to_string())
}

#[async_trait]
impl StagingBackend for HttpBackend {
    async fn fetch_pending(&self, user_id: &str) -> Result<Vec<StagedItem>, BackendError> {
        let resp = self
            .client
            .get(self.url(&format!("/users/{}/pending", user_id)))
            .send()
            .await
            .map_err(network_err)?;
        check_status(resp)
            .await?
            .json::<Vec<StagedItem>>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }

    async fn delete_pending(&self, user_id: &str, item_id: &str) -> Result<(), BackendError> {
        let resp = self
            .client
            .delete(self.url(&format!("/users/{}/pending/{}", user_id, item_id)))
            .send()
            .await
            .map_err(network_err)?;
        check_status(resp).await?;
        Ok(())
    }

    async fn stop_agent(&self, user_id: &str) -> Result<(), BackendError> {
        let resp = self
            .client
            .post(self.url(&format!("/users/{}/agent/stop", user_id)))
            .send()
            .await
            .map_err(network_err)?;
        check_status(resp).await?;
        Ok(())
    }

    async fn commit_item(&self, user_id: &str, item: &StagedItem) -> Result<Order, BackendError> {
        let resp = self
            .client
            .post(self.url(&format!("/users/{}/orders", user_id)))
            .json(item)
            .send()
            .await
            .map_err(network_err)?;
        check_status(resp)
            .await?
            .json::<Order>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}
