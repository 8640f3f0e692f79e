//! Magpie - Rust 自动代购暂存引擎
//!
//! 用户把购买决策托管给代理一个限时窗口：候选商品停在可撤销的暂存区，
//! 带实时倒计时展示，窗口关闭时逐项提交为真实订单，期间可随时移除或停止。
//!
//! 模块划分：
//! - **backend**: 后端服务抽象（HTTP / Mock）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 倒计时、会话启停、暂存列表、对账轮询、到期提交
//! - **observability**: 日志初始化
//! - **persist**: 会话结束时间的本地持久化

pub mod backend;
pub mod config;
pub mod core;
pub mod observability;
pub mod persist;

pub use crate::core::{EngineConfig, EngineRegistry, StagingEngine};
