//! 领域类型：暂存商品与订单
//!
//! StagedItem 由上游选品服务产出，只能被移除或提交；提交是「移动」而非复制，
//! 提交成功后 StagedItem 消失、Order 出现，两者不会同时存在。

use serde::{Deserialize, Serialize};

/// 暂存商品（待提交的候选购买项）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StagedItem {
    /// 商品 ID（后端分配）
    pub id: String,
    /// 展示名称
    pub display_name: String,
    /// 预估价（最小货币单位，整数，不允许小数定价）
    pub estimated_price: i64,
    /// 商品图片引用（可选）
    pub image_ref: Option<String>,
    /// 类目
    pub category: String,
    /// 入暂存区时间（毫秒时间戳）
    pub added_at: i64,
}

impl StagedItem {
    pub fn new(id: impl Into<String>, display_name: impl Into<String>, estimated_price: i64, category: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: display_name.into(),
            estimated_price,
            image_ref: None,
            category: category.into(),
            added_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn with_image(mut self, image_ref: impl Into<String>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    /// 展示用「金币」数：向下取整到整币，不展示小数
    pub fn coins(&self) -> i64 {
        self.estimated_price.div_euclid(100)
    }
}

/// 订单状态：提交产生的订单始终为已完成
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    Completed,
}

/// 订单（由暂存商品提交转化而来，创建后不可变）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: String,
    pub name: String,
    /// 成交价（最小货币单位）
    pub price: i64,
    pub category: String,
    /// 购买时间（毫秒时间戳）
    pub purchased_at: i64,
    pub status: OrderStatus,
}

impl Order {
    /// 从暂存商品转化为订单（消费掉 item，体现「移动」语义）
    pub fn from_staged(item: StagedItem) -> Self {
        Self {
            id: format!("order_{}", uuid::Uuid::new_v4()),
            name: item.display_name,
            price: item.estimated_price,
            category: item.category,
            purchased_at: chrono::Utc::now().timestamp_millis(),
            status: OrderStatus::Completed,
        }
    }
}
