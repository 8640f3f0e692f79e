//! 核心层：倒计时时钟、会话启停、暂存列表、对账轮询与到期提交编排

pub mod commit;
pub mod countdown;
pub mod engine;
pub mod error;
pub mod events;
pub mod poller;
pub mod registry;
pub mod session;
pub mod store;
pub mod types;

pub use commit::{CommitOrchestrator, CommitReport};
pub use countdown::{CountdownClock, CountdownSnapshot};
pub use engine::{now_ms, EngineConfig, StagingEngine};
pub use error::EngineError;
pub use events::EngineEvent;
pub use poller::ReconciliationPoller;
pub use registry::EngineRegistry;
pub use session::{AgentSession, EnablementController, SessionPhase};
pub use store::StagingStore;
pub use types::{Order, OrderStatus, StagedItem};
