//! 재연결 백오프 정책.

use std::time::Duration;

use crate::config::StreamConfig;

/// 지수 백오프 재연결 정책.
///
/// `attempt`번째 시도의 지연은 `base * 2^(attempt-1)`이며 `max_delay`로 제한됩니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl ReconnectPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &StreamConfig) -> Self {
        Self::new(
            config.reconnect_attempts,
            config.reconnect_delay,
            config.max_reconnect_delay,
        )
    }

    /// `attempt`(1부터 시작)번째 재연결 전 대기 시간.
    pub fn delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(31);
        self.base_delay
            .checked_mul(1u32 << exponent)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }

    /// 이미 `attempts`번 시도했을 때 다음 시도의 지연. 한도에 도달했으면 `None`.
    pub fn next_delay(&self, attempts: u32) -> Option<Duration> {
        (attempts < self.max_attempts).then(|| self.delay(attempts + 1))
    }
}
