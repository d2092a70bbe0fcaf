//! 重连退避 - 带随机抖动的指数退避

use std::time::Duration;

use rand::Rng;

/// 重连退避状态
#[derive(Debug, Clone)]
pub struct Backoff {
    current: Duration,
    floor: Duration,
    ceiling: Duration,
    jitter: Duration,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration, jitter: Duration) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            current: floor,
            floor,
            ceiling,
            jitter,
        }
    }

    /// 当前退避值（不含抖动）
    pub fn current(&self) -> Duration {
        self.current
    }

    /// 本次重连的等待时间：当前退避 + [0, jitter] 的随机抖动
    pub fn delay(&self) -> Duration {
        let jitter_ms = self.jitter.as_millis() as u64;
        let extra = if jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_ms)
        };
        self.current + Duration::from_millis(extra)
    }

    /// 重连计时器触发后翻倍，不超过上限
    pub fn advance(&mut self) {
        self.current = self.current.saturating_mul(2).min(self.ceiling);
    }

    /// 连接成功后回到下限
    pub fn reset(&mut self) {
        self.current = self.floor;
    }

    /// 应用新的上下限，当前值裁剪到新范围内
    pub fn reconfigure(&mut self, floor: Duration, ceiling: Duration, jitter: Duration) {
        self.floor = floor;
        self.ceiling = ceiling.max(floor);
        self.jitter = jitter;
        self.current = self.current.clamp(self.floor, self.ceiling);
    }
}
