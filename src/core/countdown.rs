//! 倒计时时钟：纯函数快照 + 边沿触发到期信号
//!
//! 剩余时间每次都从墙钟时间重新推导，不做区间累加，避免计时漂移；
//! 进度分母取「开始观察时刻」的剩余量（而非最初启用时刻），刷新/重启后
//! 进度条依然有意义。到期信号用 fired 标志做边沿触发，只发一次。

use serde::Serialize;

/// 某一刻度的倒计时快照
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CountdownSnapshot {
    pub days: i64,
    pub hours: i64,
    pub minutes: i64,
    pub seconds: i64,
    /// 剩余整秒数（到期后为 0，不出现负数）
    pub total_seconds_remaining: i64,
    /// 剩余量 / 观察起点剩余量，夹在 [0, 1]
    pub progress_fraction: f64,
}

impl CountdownSnapshot {
    /// 到期后的全零快照
    pub fn zeroed() -> Self {
        Self {
            days: 0,
            hours: 0,
            minutes: 0,
            seconds: 0,
            total_seconds_remaining: 0,
            progress_fraction: 0.0,
        }
    }
}

/// 剩余整秒数（向上取整：还差 1ms 也算 1 秒），到期后钳为 0
pub fn remaining_secs(end_ms: i64, now_ms: i64) -> i64 {
    ((end_ms - now_ms).max(0) + 999) / 1000
}

/// 从结束时间、观察基线与当前时间推导快照（纯函数）
pub fn snapshot(end_ms: i64, baseline_secs: i64, now_ms: i64) -> CountdownSnapshot {
    let total = remaining_secs(end_ms, now_ms);
    if total <= 0 {
        return CountdownSnapshot::zeroed();
    }
    let baseline = baseline_secs.max(1);
    CountdownSnapshot {
        days: total / 86_400,
        hours: (total % 86_400) / 3_600,
        minutes: (total % 3_600) / 60,
        seconds: total % 60,
        total_seconds_remaining: total,
        progress_fraction: (total as f64 / baseline as f64).clamp(0.0, 1.0),
    }
}

/// 倒计时时钟：持有结束时间与观察基线，到期只触发一次
#[derive(Debug)]
pub struct CountdownClock {
    end_ms: i64,
    /// 观察起点的剩余秒数（进度条分母）
    baseline_secs: i64,
    fired: bool,
}

impl CountdownClock {
    /// 在「开始观察」的时刻创建，捕获此刻的剩余量作为进度基线
    pub fn new(end_ms: i64, now_ms: i64) -> Self {
        Self {
            end_ms,
            baseline_secs: remaining_secs(end_ms, now_ms).max(1),
            fired: false,
        }
    }

    /// 结束时间被延长时重定向时钟，并重新捕获基线
    pub fn retarget(&mut self, end_ms: i64, now_ms: i64) {
        if !self.fired && end_ms != self.end_ms {
            self.end_ms = end_ms;
            self.baseline_secs = remaining_secs(end_ms, now_ms).max(1);
        }
    }

    pub fn end_ms(&self) -> i64 {
        self.end_ms
    }

    /// 推进一个刻度：返回快照与「本刻度是否到期」（边沿触发，至多一次为 true）
    pub fn tick(&mut self, now_ms: i64) -> (CountdownSnapshot, bool) {
        let snap = snapshot(self.end_ms, self.baseline_secs, now_ms);
        let mut expired = false;
        if snap.total_seconds_remaining <= 0 && !self.fired {
            self.fired = true;
            expired = true;
        }
        (snap, expired)
    }

    pub fn has_fired(&self) -> bool {
        self.fired
    }
}
