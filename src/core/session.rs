//! 托管会话与启停控制
//!
//! 状态机：Disabled → Enabling → Active → (Expiring | Stopping) → Disabled。
//! active 与 end_ms 永远一起写入，不允许只改一半；到期只由倒计时时钟的
//! 边沿信号驱动，控制器自己不看表，避免重复计时器。

use std::sync::Mutex;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::broadcast;

use crate::core::error::EngineError;
use crate::core::events::EngineEvent;

/// 会话阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    Disabled,
    Enabling,
    Active,
    Expiring,
    Stopping,
}

/// 托管会话：启用标志与窗口结束时间（毫秒时间戳），两个字段同生共死
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AgentSession {
    pub active: bool,
    pub end_ms: Option<i64>,
}

impl AgentSession {
    fn disabled() -> Self {
        Self {
            active: false,
            end_ms: None,
        }
    }

    fn active_until(end_ms: i64) -> Self {
        Self {
            active: true,
            end_ms: Some(end_ms),
        }
    }
}

struct ControllerState {
    phase: SessionPhase,
    session: AgentSession,
}

/// 启停控制器：会话状态的唯一写入口
pub struct EnablementController {
    state: Mutex<ControllerState>,
    events: broadcast::Sender<EngineEvent>,
}

impl EnablementController {
    pub fn new(events: broadcast::Sender<EngineEvent>) -> Self {
        Self {
            state: Mutex::new(ControllerState {
                phase: SessionPhase::Disabled,
                session: AgentSession::disabled(),
            }),
            events,
        }
    }

    /// 启用托管窗口，返回生效的结束时间
    ///
    /// 幂等：已激活且现有结束时间更晚时不缩短窗口，只会维持或延长。
    pub fn enable(&self, window: Duration, now_ms: i64) -> i64 {
        let proposed = now_ms + window.as_millis() as i64;
        let mut state = self.state.lock().expect("controller lock poisoned");
        state.phase = SessionPhase::Enabling;
        let end = match state.session.end_ms {
            Some(current) if state.session.active && current > proposed => current,
            _ => proposed,
        };
        state.session = AgentSession::active_until(end);
        state.phase = SessionPhase::Active;
        self.emit_session(&state);
        end
    }

    /// 用户主动停止：本地立即回到 Disabled（远端停用由上层异步补发）
    ///
    /// 返回停止前是否处于激活态。
    pub fn begin_stop(&self) -> bool {
        let mut state = self.state.lock().expect("controller lock poisoned");
        if state.phase == SessionPhase::Disabled {
            return false;
        }
        state.phase = SessionPhase::Stopping;
        state.session = AgentSession::disabled();
        state.phase = SessionPhase::Disabled;
        self.emit_session(&state);
        true
    }

    /// 进入到期提交阶段；只有 Active 会话能进入，挡住重复到期信号
    pub fn begin_expiry(&self) -> bool {
        let mut state = self.state.lock().expect("controller lock poisoned");
        if state.phase != SessionPhase::Active {
            return false;
        }
        state.phase = SessionPhase::Expiring;
        true
    }

    /// 到期提交收尾：回到 Disabled
    ///
    /// 提交期间用户又重新启用（不再是 Expiring）时放弃收尾，返回 false。
    pub fn finish_expiry(&self) -> bool {
        let mut state = self.state.lock().expect("controller lock poisoned");
        if state.phase != SessionPhase::Expiring {
            return false;
        }
        state.session = AgentSession::disabled();
        state.phase = SessionPhase::Disabled;
        self.emit_session(&state);
        true
    }

    /// 不变量被破坏时的强制关闭：清掉会话并广播错误
    pub fn force_disable(&self, reason: &str) {
        tracing::error!("Forcing session disabled: {}", reason);
        let mut state = self.state.lock().expect("controller lock poisoned");
        state.session = AgentSession::disabled();
        state.phase = SessionPhase::Disabled;
        self.emit_session(&state);
        let _ = self.events.send(EngineEvent::Error {
            text: reason.to_string(),
        });
    }

    /// 从持久化状态恢复一个仍在窗口内的会话
    pub fn restore(&self, end_ms: i64) {
        let mut state = self.state.lock().expect("controller lock poisoned");
        state.session = AgentSession::active_until(end_ms);
        state.phase = SessionPhase::Active;
        self.emit_session(&state);
    }

    pub fn session(&self) -> AgentSession {
        self.state.lock().expect("controller lock poisoned").session
    }

    pub fn phase(&self) -> SessionPhase {
        self.state.lock().expect("controller lock poisoned").phase
    }

    pub fn is_active(&self) -> bool {
        self.session().active
    }

    pub fn end_ms(&self) -> Option<i64> {
        self.session().end_ms
    }

    /// 校验会话不变量：active 为真时必须有结束时间
    pub fn check_invariant(&self) -> Result<(), EngineError> {
        let session = self.session();
        if session.active && session.end_ms.is_none() {
            return Err(EngineError::InvariantViolation(
                "session active without an end time".to_string(),
            ));
        }
        Ok(())
    }

    fn emit_session(&self, state: &ControllerState) {
        let _ = self.events.send(EngineEvent::SessionChanged {
            active: state.session.active,
            end_ms: state.session.end_ms,
        });
    }
}
