//! 发送限流 - 保证两次发送之间至少间隔 `min_interval`
//!
//! 每次调度预留一个发送时间槽，突发的多条通知会被依次排开，
//! 而不是都以同一个 `last_sent_at` 计算延迟。

use std::time::Duration;

use tokio::time::Instant;

/// 发送限流器
#[derive(Debug, Clone)]
pub struct SendThrottle {
    /// 最小发送间隔
    min_interval: Duration,
    /// 最近一次实际发送的时间
    last_sent_at: Option<Instant>,
    /// 下一个可预留的时间槽
    next_slot: Option<Instant>,
}

impl SendThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_sent_at: None,
            next_slot: None,
        }
    }

    /// 为一条新 envelope 计算实际发送（或入队判断）的时间
    pub fn schedule(&mut self, now: Instant) -> Instant {
        let mut due = now;
        if let Some(last) = self.last_sent_at {
            due = due.max(last + self.min_interval);
        }
        if let Some(slot) = self.next_slot {
            due = due.max(slot);
        }
        self.next_slot = Some(due + self.min_interval);
        due
    }

    /// 记录一次实际发送
    pub fn mark_sent(&mut self, at: Instant) {
        self.last_sent_at = Some(at);
    }

    /// 修改最小间隔（已预留的时间槽不变）
    pub fn set_min_interval(&mut self, min_interval: Duration) {
        self.min_interval = min_interval;
    }

    /// 清空发送记录
    pub fn reset(&mut self) {
        self.last_sent_at = None;
        self.next_slot = None;
    }
}
