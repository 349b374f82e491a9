//! 구독 요청과 정규화된 구독 키.
//!
//! 같은 토큰/채널/인터벌 조합은 인자 순서와 관계없이 항상 같은 키로
//! 정규화됩니다. 구독 레지스트리는 이 키를 기준으로 참조 카운트를 관리합니다.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::channel::Channel;

/// 구독 요청.
///
/// # 예제
///
/// ```
/// use launchpad_core::{Channel, SubscriptionRequest};
///
/// let request = SubscriptionRequest::new("0xTOKEN", [Channel::Kline])
///     .with_intervals(["1m", "5m"])
///     .real_time_only(true);
///
/// assert_eq!(request.key().intervals(), &["1m".to_string(), "5m".to_string()]);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionRequest {
    /// 토큰 주소
    pub token: String,
    /// 구독할 채널
    pub channels: Vec<Channel>,
    /// 캔들 인터벌 (비어 있으면 서버 기본값)
    #[serde(default)]
    pub intervals: Vec<String>,
    /// 실시간 데이터만 수신할지 여부
    #[serde(default)]
    pub real_time_only: bool,
}

impl SubscriptionRequest {
    /// 새 구독 요청을 생성합니다.
    pub fn new(token: impl Into<String>, channels: impl IntoIterator<Item = Channel>) -> Self {
        Self {
            token: token.into(),
            channels: channels.into_iter().collect(),
            intervals: Vec::new(),
            real_time_only: false,
        }
    }

    /// 인터벌을 설정합니다.
    pub fn with_intervals<I, S>(mut self, intervals: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.intervals = intervals.into_iter().map(Into::into).collect();
        self
    }

    /// 실시간 전용 옵션을 설정합니다.
    pub fn real_time_only(mut self, enabled: bool) -> Self {
        self.real_time_only = enabled;
        self
    }

    /// 정규화된 구독 키를 반환합니다.
    pub fn key(&self) -> SubscriptionKey {
        SubscriptionKey::new(&self.token, &self.channels, &self.intervals)
    }
}

/// 정규화된 구독 키.
///
/// 채널과 인터벌은 정렬 및 중복 제거된 상태로 저장됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    token: String,
    channels: Vec<Channel>,
    intervals: Vec<String>,
}

impl SubscriptionKey {
    /// 새 구독 키를 생성합니다.
    pub fn new<S: AsRef<str>>(token: &str, channels: &[Channel], intervals: &[S]) -> Self {
        let mut channels = channels.to_vec();
        channels.sort_unstable();
        channels.dedup();

        let mut intervals: Vec<String> = intervals
            .iter()
            .map(|interval| interval.as_ref().trim().to_string())
            .filter(|interval| !interval.is_empty())
            .collect();
        intervals.sort_unstable();
        intervals.dedup();

        Self {
            token: token.to_string(),
            channels,
            intervals,
        }
    }

    /// 토큰 주소.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// 정렬된 채널 목록.
    pub fn channels(&self) -> &[Channel] {
        &self.channels
    }

    /// 정렬된 인터벌 목록.
    pub fn intervals(&self) -> &[String] {
        &self.intervals
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let channels: Vec<&str> = self.channels.iter().map(Channel::as_str).collect();
        write!(
            f,
            "{}|{}|{}",
            self.token,
            channels.join(","),
            self.intervals.join(",")
        )
    }
}
