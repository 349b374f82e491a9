//! 설정 관리.
//!
//! 기본값 → TOML 파일 → `LAUNCHPAD__` 접두사 환경 변수 순서로 설정을 병합합니다.
//!
//! ```toml
//! [stream]
//! url = "wss://stream.example.com/ws"
//! reconnect_attempts = 5
//!
//! [logging]
//! level = "info"
//! format = "compact"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

use crate::error::{LaunchpadError, LaunchpadResult};

/// 환경 변수 접두사.
pub const ENV_PREFIX: &str = "LAUNCHPAD";

/// 애플리케이션 설정.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    /// 스트림 연결 설정
    #[serde(default)]
    pub stream: StreamSettings,
    /// 로깅 설정
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// 시세 스트림 연결 설정.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamSettings {
    /// WebSocket 기본 URL
    pub url: String,
    /// 최대 재연결 시도 횟수
    pub reconnect_attempts: u32,
    /// 재연결 기본 지연 (밀리초)
    pub reconnect_delay_ms: u64,
    /// 재연결 최대 지연 (밀리초)
    pub max_reconnect_delay_ms: u64,
    /// 하트비트(ping) 간격 (밀리초)
    pub heartbeat_interval_ms: u64,
    /// pong 응답 대기 시간 (밀리초)
    pub pong_timeout_ms: u64,
    /// 이 값을 넘는 왕복 지연은 경고로 기록 (밀리초)
    pub latency_warn_ms: u64,
    /// 이벤트 종류당 리스너 수 경고 임계치
    pub listener_warn_threshold: usize,
    /// 이벤트 브로드캐스트 버퍼 크기
    pub event_buffer: usize,
    /// 연결 ID를 저장할 세션 파일 (없으면 메모리에만 저장)
    pub session_file: Option<PathBuf>,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            url: "ws://127.0.0.1:8080/ws".to_string(),
            reconnect_attempts: 5,
            reconnect_delay_ms: 1_000,
            max_reconnect_delay_ms: 30_000,
            heartbeat_interval_ms: 30_000,
            pong_timeout_ms: 10_000,
            latency_warn_ms: 1_000,
            listener_warn_threshold: 10,
            event_buffer: 1_024,
            session_file: None,
        }
    }
}

impl StreamSettings {
    /// 설정값을 검증합니다.
    pub fn validate(&self) -> LaunchpadResult<()> {
        let url = Url::parse(&self.url)
            .map_err(|e| LaunchpadError::Config(format!("잘못된 스트림 URL '{}': {}", self.url, e)))?;
        if !matches!(url.scheme(), "ws" | "wss") {
            return Err(LaunchpadError::Config(format!(
                "스트림 URL은 ws:// 또는 wss:// 이어야 합니다: {}",
                self.url
            )));
        }
        if self.reconnect_delay_ms == 0 {
            return Err(LaunchpadError::Config(
                "reconnect_delay_ms는 0보다 커야 합니다".to_string(),
            ));
        }
        if self.max_reconnect_delay_ms < self.reconnect_delay_ms {
            return Err(LaunchpadError::Config(
                "max_reconnect_delay_ms는 reconnect_delay_ms 이상이어야 합니다".to_string(),
            ));
        }
        if self.heartbeat_interval_ms == 0 || self.pong_timeout_ms == 0 {
            return Err(LaunchpadError::Config(
                "하트비트 간격과 pong 타임아웃은 0보다 커야 합니다".to_string(),
            ));
        }
        if self.event_buffer == 0 {
            return Err(LaunchpadError::Config(
                "event_buffer는 0보다 커야 합니다".to_string(),
            ));
        }
        Ok(())
    }
}

/// 로깅 설정.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// 로그 레벨
    pub level: String,
    /// 로그 형식 (pretty, json, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl AppConfig {
    /// 파일과 환경 변수에서 설정을 로드합니다.
    ///
    /// `path`가 `None`이면 기본값과 환경 변수만 사용합니다.
    pub fn load(path: Option<&Path>) -> LaunchpadResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let app: AppConfig = config.try_deserialize()?;
        app.stream.validate()?;
        Ok(app)
    }

    /// 기본 경로(`config/launchpad.toml`)가 있으면 로드하고, 없으면 기본값을 사용합니다.
    pub fn load_default() -> LaunchpadResult<Self> {
        let path = Path::new("config/launchpad.toml");
        if path.exists() {
            Self::load(Some(path))
        } else {
            Self::load(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let settings = StreamSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.reconnect_attempts, 5);
        assert_eq!(settings.reconnect_delay_ms, 1_000);
        assert_eq!(settings.max_reconnect_delay_ms, 30_000);
    }

    #[test]
    fn test_validate_rejects_http_scheme() {
        let settings = StreamSettings {
            url: "https://example.com".to_string(),
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_delays() {
        let settings = StreamSettings {
            reconnect_delay_ms: 5_000,
            max_reconnect_delay_ms: 1_000,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_load_from_file_with_partial_sections() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[stream]
url = "wss://stream.example.com/ws"
reconnect_attempts = 3
heartbeat_interval_ms = 15000

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.stream.url, "wss://stream.example.com/ws");
        assert_eq!(config.stream.reconnect_attempts, 3);
        assert_eq!(config.stream.heartbeat_interval_ms, 15_000);
        assert_eq!(config.stream.pong_timeout_ms, 10_000);
        assert_eq!(config.logging.format, "json");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_load_rejects_invalid_file_values() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[stream]\nurl = \"not a url\"").unwrap();
        assert!(AppConfig::load(Some(file.path())).is_err());
    }
}
