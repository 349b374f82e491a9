//! 스트림 클라이언트 런타임 설정.

use std::time::Duration;

use launchpad_core::StreamSettings;

use crate::error::{StreamError, StreamResult};

/// 스트림 클라이언트 설정.
///
/// 파일 설정(`StreamSettings`)의 밀리초 값을 `Duration`으로 변환해 보관합니다.
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// WebSocket 기본 URL
    pub url: String,
    /// 최대 재연결 시도 횟수
    pub reconnect_attempts: u32,
    /// 재연결 기본 지연
    pub reconnect_delay: Duration,
    /// 재연결 최대 지연
    pub max_reconnect_delay: Duration,
    /// ping 간격
    pub heartbeat_interval: Duration,
    /// pong 대기 시간
    pub pong_timeout: Duration,
    /// 지연 경고 임계치
    pub latency_warn: Duration,
    /// 이벤트 종류당 리스너 경고 임계치
    pub listener_warn_threshold: usize,
    /// 이벤트 브로드캐스트 버퍼 크기
    pub event_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self::from_settings(&StreamSettings::default())
    }
}

impl StreamConfig {
    /// 기본값으로 새 설정을 생성합니다.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// 파일 설정에서 생성합니다.
    pub fn from_settings(settings: &StreamSettings) -> Self {
        Self {
            url: settings.url.clone(),
            reconnect_attempts: settings.reconnect_attempts,
            reconnect_delay: Duration::from_millis(settings.reconnect_delay_ms),
            max_reconnect_delay: Duration::from_millis(settings.max_reconnect_delay_ms),
            heartbeat_interval: Duration::from_millis(settings.heartbeat_interval_ms),
            pong_timeout: Duration::from_millis(settings.pong_timeout_ms),
            latency_warn: Duration::from_millis(settings.latency_warn_ms),
            listener_warn_threshold: settings.listener_warn_threshold,
            event_buffer: settings.event_buffer,
        }
    }

    /// 재연결 정책을 설정합니다.
    pub fn with_reconnect(mut self, attempts: u32, base_delay: Duration) -> Self {
        self.reconnect_attempts = attempts;
        self.reconnect_delay = base_delay;
        self
    }

    /// 하트비트 간격과 pong 대기 시간을 설정합니다.
    pub fn with_heartbeat(mut self, interval: Duration, pong_timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.pong_timeout = pong_timeout;
        self
    }

    /// 설정값을 검증합니다.
    pub fn validate(&self) -> StreamResult<()> {
        let url = url::Url::parse(&self.url)
            .map_err(|e| StreamError::Config(format!("invalid url '{}': {}", self.url, e)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(StreamError::Config(format!(
                "url scheme must be ws or wss: {}",
                self.url
            )));
        }
        if self.reconnect_delay.is_zero() {
            return Err(StreamError::Config("reconnect delay must be > 0".to_string()));
        }
        if self.max_reconnect_delay < self.reconnect_delay {
            return Err(StreamError::Config(
                "max reconnect delay must be >= reconnect delay".to_string(),
            ));
        }
        if self.heartbeat_interval.is_zero() || self.pong_timeout.is_zero() {
            return Err(StreamError::Config(
                "heartbeat interval and pong timeout must be > 0".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(StreamError::Config("event buffer must be > 0".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_settings_converts_durations() {
        let settings = StreamSettings {
            reconnect_delay_ms: 250,
            pong_timeout_ms: 4_000,
            ..Default::default()
        };
        let config = StreamConfig::from_settings(&settings);
        assert_eq!(config.reconnect_delay, Duration::from_millis(250));
        assert_eq!(config.pong_timeout, Duration::from_secs(4));
        assert_eq!(config.max_reconnect_delay, Duration::from_secs(30));
    }

    #[test]
    fn test_builder_and_validate() {
        let config = StreamConfig::new("wss://stream.example.com/ws")
            .with_reconnect(3, Duration::from_millis(500))
            .with_heartbeat(Duration::from_secs(5), Duration::from_secs(2));
        assert!(config.validate().is_ok());
        assert_eq!(config.reconnect_attempts, 3);

        let bad = StreamConfig::new("wss://x").with_reconnect(3, Duration::ZERO);
        assert!(bad.validate().is_err());

        assert!(StreamConfig::new("tcp://x").validate().is_err());
    }
}
