//! 시장 데이터 페이로드.
//!
//! 스트림 서버가 전송하는 캔들/체결 페이로드와, 차트 레이어가 사용하는
//! 정밀 소수점 캔들 타입을 정의합니다.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::serde_helpers::{deserialize_opt_string_or_number, deserialize_string_or_number};
use crate::error::{LaunchpadError, LaunchpadResult};

/// 캔들 페이로드 (`{t,o,h,l,c,v}`).
///
/// 가격과 거래량은 정밀도 손실을 막기 위해 문자열로 전송됩니다.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KlinePayload {
    /// 캔들 시작 시간
    pub t: i64,
    /// 시가
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub o: String,
    /// 고가
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub h: String,
    /// 저가
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub l: String,
    /// 종가
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub c: String,
    /// 거래량
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub v: String,
}

impl KlinePayload {
    /// 소수점 캔들로 변환합니다.
    ///
    /// `t`는 초 또는 밀리초 단위일 수 있으며, 10^12 미만이면 초로 간주합니다.
    pub fn to_candle(&self) -> LaunchpadResult<Candle> {
        let open_time = timestamp_to_datetime(self.t)?;
        let candle = Candle {
            open_time,
            open: parse_decimal("o", &self.o)?,
            high: parse_decimal("h", &self.h)?,
            low: parse_decimal("l", &self.l)?,
            close: parse_decimal("c", &self.c)?,
            volume: parse_decimal("v", &self.v)?,
        };

        if candle.high < candle.low {
            return Err(LaunchpadError::InvalidInput(format!(
                "고가({})가 저가({})보다 낮습니다",
                candle.high, candle.low
            )));
        }
        Ok(candle)
    }
}

/// OHLCV 캔들.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Candle {
    /// 캔들 시작 시간
    pub open_time: DateTime<Utc>,
    /// 시가
    pub open: Decimal,
    /// 고가
    pub high: Decimal,
    /// 저가
    pub low: Decimal,
    /// 종가
    pub close: Decimal,
    /// 거래량
    pub volume: Decimal,
}

impl Candle {
    /// 캔들 범위(고가 - 저가)를 반환합니다.
    pub fn range(&self) -> Decimal {
        self.high - self.low
    }

    /// 양봉(종가 > 시가)인지 확인합니다.
    pub fn is_bullish(&self) -> bool {
        self.close > self.open
    }

    /// 시가 대비 등락률(%)을 반환합니다.
    pub fn change_pct(&self) -> Option<Decimal> {
        if self.open.is_zero() {
            return None;
        }
        Some((self.close - self.open) / self.open * Decimal::from(100))
    }
}

/// 체결 방향.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TradeSide {
    /// 매수
    Buy,
    /// 매도
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "buy"),
            TradeSide::Sell => write!(f, "sell"),
        }
    }
}

/// 체결 페이로드.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradePayload {
    /// 체결 ID
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub trade_id: String,
    /// 트랜잭션 해시
    #[serde(default)]
    pub tx_hash: Option<String>,
    /// 체결 가격
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub price: String,
    /// 체결 수량 (토큰 단위)
    #[serde(deserialize_with = "deserialize_string_or_number")]
    pub quantity: String,
    /// 체결 대금 (호가 자산 단위)
    #[serde(default, deserialize_with = "deserialize_opt_string_or_number")]
    pub quote_qty: Option<String>,
    /// 거래량
    #[serde(default, deserialize_with = "deserialize_opt_string_or_number")]
    pub vol: Option<String>,
    /// 매수/매도
    pub side: TradeSide,
    /// 체결 시간
    pub timestamp: i64,
    /// 매수자 주소
    #[serde(default)]
    pub buyer: Option<String>,
    /// 매도자 주소
    #[serde(default)]
    pub seller: Option<String>,
    /// 본딩 커브 진행률 (%)
    #[serde(default)]
    pub progress_pct: Option<f64>,
}

impl TradePayload {
    /// 체결 가격을 Decimal로 반환합니다.
    pub fn price_decimal(&self) -> LaunchpadResult<Decimal> {
        parse_decimal("price", &self.price)
    }

    /// 체결 수량을 Decimal로 반환합니다.
    pub fn quantity_decimal(&self) -> LaunchpadResult<Decimal> {
        parse_decimal("quantity", &self.quantity)
    }

    /// 체결 시간을 반환합니다.
    pub fn executed_at(&self) -> LaunchpadResult<DateTime<Utc>> {
        timestamp_to_datetime(self.timestamp)
    }
}

fn parse_decimal(field: &str, value: &str) -> LaunchpadResult<Decimal> {
    // 지수 표기(1e-9)까지 허용
    Decimal::from_str(value)
        .or_else(|_| Decimal::from_scientific(value))
        .map_err(|e| LaunchpadError::Parse(format!("{} 필드 '{}': {}", field, value, e)))
}

fn timestamp_to_datetime(ts: i64) -> LaunchpadResult<DateTime<Utc>> {
    let parsed = if ts.abs() < 1_000_000_000_000 {
        DateTime::from_timestamp(ts, 0)
    } else {
        DateTime::from_timestamp_millis(ts)
    };
    parsed.ok_or_else(|| LaunchpadError::Parse(format!("잘못된 타임스탬프: {}", ts)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn sample_kline() -> KlinePayload {
        serde_json::from_str(r#"{"t":1700000000,"o":"1.0","h":"1.2","l":"0.9","c":"1.1","v":"1000"}"#)
            .unwrap()
    }

    #[test]
    fn test_kline_to_candle() {
        let candle = sample_kline().to_candle().unwrap();
        assert_eq!(candle.open, dec!(1.0));
        assert_eq!(candle.high, dec!(1.2));
        assert_eq!(candle.low, dec!(0.9));
        assert_eq!(candle.close, dec!(1.1));
        assert_eq!(candle.volume, dec!(1000));
        assert_eq!(candle.open_time.timestamp(), 1_700_000_000);
        assert!(candle.is_bullish());
        assert_eq!(candle.range(), dec!(0.3));
    }

    #[test]
    fn test_kline_millisecond_timestamp() {
        let mut kline = sample_kline();
        kline.t = 1_700_000_000_123;
        let candle = kline.to_candle().unwrap();
        assert_eq!(candle.open_time.timestamp_millis(), 1_700_000_000_123);
    }

    #[test]
    fn test_kline_accepts_numeric_prices() {
        let kline: KlinePayload =
            serde_json::from_str(r#"{"t":1,"o":1.5,"h":2,"l":1,"c":1.75,"v":10}"#).unwrap();
        assert_eq!(kline.o, "1.5");
        assert_eq!(kline.to_candle().unwrap().close, dec!(1.75));
    }

    #[test]
    fn test_kline_rejects_inverted_range() {
        let mut kline = sample_kline();
        kline.h = "0.5".to_string();
        assert!(kline.to_candle().is_err());
    }

    #[test]
    fn test_kline_rejects_garbage_price() {
        let mut kline = sample_kline();
        kline.c = "abc".to_string();
        let err = kline.to_candle().unwrap_err();
        assert!(err.is_input_error());
    }

    #[test]
    fn test_candle_change_pct() {
        let candle = sample_kline().to_candle().unwrap();
        assert_eq!(candle.change_pct(), Some(dec!(10)));
    }

    #[test]
    fn test_trade_payload_deserialize() {
        let json = r#"{
            "tradeId": 7,
            "txHash": "0xabc",
            "price": "0.00000123",
            "quantity": "1500",
            "quoteQty": "0.001845",
            "vol": 0.001845,
            "side": "buy",
            "timestamp": 1700000000000,
            "buyer": "0xbuyer",
            "seller": "0xcurve",
            "progressPct": 42.5
        }"#;

        let trade: TradePayload = serde_json::from_str(json).unwrap();
        assert_eq!(trade.trade_id, "7");
        assert_eq!(trade.side, TradeSide::Buy);
        assert_eq!(trade.price_decimal().unwrap(), dec!(0.00000123));
        assert_eq!(trade.quantity_decimal().unwrap(), dec!(1500));
        assert_eq!(trade.vol.as_deref(), Some("0.001845"));
        assert_eq!(trade.progress_pct, Some(42.5));
        assert_eq!(trade.executed_at().unwrap().timestamp(), 1_700_000_000);
    }

    #[test]
    fn test_scientific_notation_price() {
        assert_eq!(parse_decimal("price", "1.5e-3").unwrap(), dec!(0.0015));
    }
}
