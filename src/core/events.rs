//! 引擎事件：展示层消费的唯一读取契约
//!
//! 倒计时刻度、暂存列表变化、非阻塞提示、提交结果等，全部通过 broadcast
//! 推送；展示层只订阅，不直接摸内部状态。

use serde::Serialize;

/// 引擎对外事件（可序列化为 JSON 供前端展示）
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EngineEvent {
    /// 会话启停（active 与结束时间总是一起更新）
    SessionChanged {
        active: bool,
        end_ms: Option<i64>,
    },
    /// 每秒倒计时刻度
    CountdownTick {
        days: i64,
        hours: i64,
        minutes: i64,
        seconds: i64,
        total_seconds_remaining: i64,
        progress_fraction: f64,
    },
    /// 暂存列表变化（新增/移除/整体刷新后）
    ItemsChanged {
        count: usize,
        /// 列表合计金币数（整币，向下取整）
        total_coins: i64,
    },
    /// 非阻塞提示（仅用户主动操作失败时出现，后台轮询失败不提示）
    Notice { text: String },
    /// 托管窗口到期
    Expired,
    /// 到期提交结束：成功转为订单数与仍留在暂存区的失败数
    CommitFinished { committed: usize, failed: usize },
    /// 致命错误（如不变量被破坏导致会话强制关闭）
    Error { text: String },
}
