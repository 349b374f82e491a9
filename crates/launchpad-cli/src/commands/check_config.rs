//! 유효 설정 출력.

use anyhow::{Context, Result};
use launchpad_core::AppConfig;
use launchpad_stream::StreamConfig;

/// 병합된 설정을 TOML로 렌더링합니다.
///
/// 파일 값과 `LAUNCHPAD__` 환경 변수가 모두 반영된 결과입니다.
pub fn render_config(config: &AppConfig) -> Result<String> {
    StreamConfig::from_settings(&config.stream)
        .validate()
        .context("스트림 설정 검증 실패")?;
    toml::to_string_pretty(config).context("설정 직렬화 실패")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_default_config() {
        let rendered = render_config(&AppConfig::default()).unwrap();
        assert!(rendered.contains("[stream]"));
        assert!(rendered.contains("reconnect_attempts = 5"));
        assert!(rendered.contains("max_reconnect_delay_ms = 30000"));
        assert!(rendered.contains("[logging]"));
        assert!(!rendered.contains("session_file"));

        let parsed: AppConfig = toml::from_str(&rendered).unwrap();
        assert_eq!(parsed.stream, AppConfig::default().stream);
    }

    #[test]
    fn test_render_rejects_invalid_stream_url() {
        let mut config = AppConfig::default();
        config.stream.url = "http://example.com".to_string();
        assert!(render_config(&config).is_err());
    }
}
