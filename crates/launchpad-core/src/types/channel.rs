//! 스트림 채널 정의.
//!
//! 서버가 제공하는 실시간 채널(`kline`, `trade`)을 나타냅니다.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{LaunchpadError, LaunchpadResult};

/// 실시간 스트림 채널.
///
/// `Ord`가 구현되어 있어 구독 키에서 정렬된 채널 목록을 만들 수 있습니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    /// 캔들(OHLCV) 업데이트
    Kline,
    /// 체결 업데이트
    Trade,
}

impl Channel {
    /// 와이어 형식 채널 이름을 반환합니다.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Kline => "kline",
            Channel::Trade => "trade",
        }
    }

    /// 모든 채널 반환.
    pub fn all() -> [Channel; 2] {
        [Channel::Kline, Channel::Trade]
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Channel {
    type Err = LaunchpadError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "kline" => Ok(Channel::Kline),
            "trade" => Ok(Channel::Trade),
            other => Err(LaunchpadError::InvalidInput(format!(
                "알 수 없는 채널: {}",
                other
            ))),
        }
    }
}

/// 쉼표로 구분된 채널 목록을 파싱합니다 (예: `"kline,trade"`).
pub fn parse_channels(list: &str) -> LaunchpadResult<Vec<Channel>> {
    let channels = list
        .split(',')
        .filter(|part| !part.trim().is_empty())
        .map(Channel::from_str)
        .collect::<LaunchpadResult<Vec<_>>>()?;

    if channels.is_empty() {
        return Err(LaunchpadError::InvalidInput(
            "채널 목록이 비어 있습니다".to_string(),
        ));
    }
    Ok(channels)
}
