//! WebSocket 와이어 메시지.
//!
//! 송신 메시지는 `{type, requestId, timestamp, data}` 형태의 JSON 객체이며,
//! 수신 메시지는 `type` 필드로 구분되는 태그 유니온입니다. 서버는 일부 필드를
//! 최상위 또는 `data` 안에 보내므로 수신 메시지는 `serde_json::Value`에서
//! 직접 분류합니다.

use launchpad_core::{Channel, KlinePayload, TradePayload};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::error::{StreamError, StreamResult};

// ============================================================================
// 송신 메시지
// ============================================================================

/// 송신 메시지 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundKind {
    Ping,
    Subscribe,
    Unsubscribe,
}

/// 송신 메시지.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMessage {
    #[serde(rename = "type")]
    pub kind: OutboundKind,
    pub request_id: String,
    pub timestamp: i64,
    pub data: OutboundPayload,
}

/// 송신 메시지 본문.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OutboundPayload {
    Ping(PingData),
    Subscription(SubscriptionData),
}

/// ping 본문.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingData {
    /// 송신 시점의 로컬 시간 (밀리초)
    pub client_time: i64,
}

/// subscribe/unsubscribe 본문.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscriptionData {
    pub tokens: Vec<String>,
    pub channels: Vec<Channel>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intervals: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<SubscribeOptions>,
}

/// subscribe 옵션.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeOptions {
    pub real_time_only: bool,
}

impl OutboundMessage {
    /// ping 메시지를 생성합니다.
    pub fn ping(request_id: impl Into<String>, now_ms: i64) -> Self {
        Self {
            kind: OutboundKind::Ping,
            request_id: request_id.into(),
            timestamp: now_ms,
            data: OutboundPayload::Ping(PingData { client_time: now_ms }),
        }
    }

    /// subscribe 메시지를 생성합니다. 인터벌이 비어 있으면 필드를 생략합니다.
    pub fn subscribe(
        request_id: impl Into<String>,
        now_ms: i64,
        token: &str,
        channels: &[Channel],
        intervals: &[String],
        real_time_only: bool,
    ) -> Self {
        Self {
            kind: OutboundKind::Subscribe,
            request_id: request_id.into(),
            timestamp: now_ms,
            data: OutboundPayload::Subscription(SubscriptionData {
                tokens: vec![token.to_string()],
                channels: channels.to_vec(),
                intervals: (!intervals.is_empty()).then(|| intervals.to_vec()),
                options: Some(SubscribeOptions { real_time_only }),
            }),
        }
    }

    /// unsubscribe 메시지를 생성합니다.
    pub fn unsubscribe(
        request_id: impl Into<String>,
        now_ms: i64,
        token: &str,
        channels: &[Channel],
    ) -> Self {
        Self {
            kind: OutboundKind::Unsubscribe,
            request_id: request_id.into(),
            timestamp: now_ms,
            data: OutboundPayload::Subscription(SubscriptionData {
                tokens: vec![token.to_string()],
                channels: channels.to_vec(),
                intervals: None,
                options: None,
            }),
        }
    }

    /// 준비 전에는 큐에 보관되어야 하는 구독 트래픽인지 확인.
    pub fn is_subscription(&self) -> bool {
        matches!(self.kind, OutboundKind::Subscribe | OutboundKind::Unsubscribe)
    }

    /// JSON 문자열로 직렬화합니다.
    pub fn to_json(&self) -> StreamResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

// ============================================================================
// 수신 메시지
// ============================================================================

/// `kline_update` 메시지.
///
/// 소비자에게는 수신한 JSON이 그대로 전달됩니다. 토큰/인터벌/캔들은 원본에서
/// 읽어낸 보조 뷰이며, 형식이 맞지 않으면 `None`이 되고 메시지는 그대로 전달됩니다.
#[derive(Debug, Clone, PartialEq)]
pub struct KlineUpdateMessage {
    raw: Value,
    token: Option<String>,
    interval: Option<String>,
    kline: Option<KlinePayload>,
}

impl KlineUpdateMessage {
    /// 원본 JSON에서 생성합니다.
    pub fn from_value(raw: Value) -> Self {
        let body = raw.get("data");
        let text = |field: &str| {
            body.and_then(|d| d.get(field))
                .and_then(Value::as_str)
                .map(str::to_owned)
        };
        let token = text("tokenAddress");
        let interval = text("interval");
        let kline = body
            .and_then(|d| d.get("data"))
            .and_then(|candle| KlinePayload::deserialize(candle).ok());

        Self {
            raw,
            token,
            interval,
            kline,
        }
    }

    /// 수신한 메시지 원본.
    pub fn raw(&self) -> &Value {
        &self.raw
    }

    pub fn into_raw(self) -> Value {
        self.raw
    }

    /// 토큰 주소.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    /// 캔들 인터벌.
    pub fn interval(&self) -> Option<&str> {
        self.interval.as_deref()
    }

    /// 캔들 페이로드. 스키마가 맞지 않으면 `None`.
    pub fn kline(&self) -> Option<&KlinePayload> {
        self.kline.as_ref()
    }
}

impl Serialize for KlineUpdateMessage {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.raw.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for KlineUpdateMessage {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

/// `trade_update` 메시지.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeUpdateMessage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
    pub data: TradeUpdateData,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// `trade_update.data`. 소비자에게는 이 본문이 전달됩니다.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TradeUpdateData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_address: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    pub data: TradePayload,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// pong 메시지.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PongMessage {
    /// ping에 담아 보낸 로컬 시간 (서버가 그대로 반환)
    pub client_time: Option<i64>,
    /// 서버 시간
    pub server_time: Option<i64>,
}

/// 서버가 보낸 `{type:"error"}` 프레임.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

/// 레거시 `data` 메시지의 채널.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LegacyChannel {
    Kline,
    Trade,
    Other(Option<String>),
}

/// 분류된 수신 메시지.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundMessage {
    /// 핸드셰이크 (연결 ID 발급)
    Connected { connection_id: String },
    Pong(PongMessage),
    /// 서버 ping (기록만 함)
    Ping,
    /// 구독 확인 (`subscribe`/`subscribed` 모두 허용)
    Subscribed(Value),
    /// 구독 해제 확인 (`unsubscribe`/`unsubscribed` 모두 허용)
    Unsubscribed(Value),
    KlineUpdate(Box<KlineUpdateMessage>),
    TradeUpdate(Box<TradeUpdateMessage>),
    /// 레거시 채널 형식
    Data { channel: LegacyChannel, message: Value },
    Error(ServerError),
    /// 알 수 없는 `type`
    Unknown { kind: Option<String>, message: Value },
}

impl InboundMessage {
    /// 파싱된 JSON 문서 하나를 분류합니다.
    ///
    /// 알 수 없는 타입은 `Unknown`이 되고, 알려진 타입의 스키마가 맞지 않으면
    /// `StreamError::InvalidMessage`를 반환합니다.
    pub fn classify(value: Value) -> StreamResult<Self> {
        let kind = value.get("type").and_then(Value::as_str).map(str::to_owned);
        let Some(kind) = kind else {
            return Ok(InboundMessage::Unknown {
                kind: None,
                message: value,
            });
        };

        match kind.as_str() {
            "connected" => {
                let connection_id = lookup(&value, "connectionId")
                    .and_then(Value::as_str)
                    .filter(|id| !id.is_empty())
                    .map(str::to_owned)
                    .ok_or_else(|| StreamError::invalid("connected", "missing connectionId"))?;
                Ok(InboundMessage::Connected { connection_id })
            }
            "pong" => Ok(InboundMessage::Pong(PongMessage {
                client_time: lookup(&value, "clientTime").and_then(as_millis),
                server_time: lookup(&value, "serverTime").and_then(as_millis),
            })),
            "ping" => Ok(InboundMessage::Ping),
            "subscribe" | "subscribed" => Ok(InboundMessage::Subscribed(value)),
            "unsubscribe" | "unsubscribed" => Ok(InboundMessage::Unsubscribed(value)),
            "kline_update" => Ok(InboundMessage::KlineUpdate(Box::new(
                KlineUpdateMessage::from_value(value),
            ))),
            "trade_update" => serde_json::from_value(value)
                .map(|m| InboundMessage::TradeUpdate(Box::new(m)))
                .map_err(|e| StreamError::invalid("trade_update", e)),
            "data" => {
                let channel = match lookup(&value, "channel").and_then(Value::as_str) {
                    Some("kline") => LegacyChannel::Kline,
                    Some("trade") => LegacyChannel::Trade,
                    other => LegacyChannel::Other(other.map(str::to_owned)),
                };
                Ok(InboundMessage::Data {
                    channel,
                    message: value,
                })
            }
            "error" => Ok(InboundMessage::Error(ServerError {
                code: lookup(&value, "code").and_then(|code| match code {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                }),
                message: lookup(&value, "message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown server error")
                    .to_string(),
                details: lookup(&value, "details").cloned(),
            })),
            _ => Ok(InboundMessage::Unknown {
                kind: Some(kind),
                message: value,
            }),
        }
    }
}

/// 최상위에서 먼저 찾고, 없으면 `data` 객체 안에서 찾습니다.
fn lookup<'a>(value: &'a Value, field: &str) -> Option<&'a Value> {
    value
        .get(field)
        .or_else(|| value.get("data").and_then(|data| data.get(field)))
        .filter(|v| !v.is_null())
}

fn as_millis(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_subscribe_wire_format() {
        let msg = OutboundMessage::subscribe(
            "req-1",
            1_700_000_000_000,
            "0xTOKEN",
            &[Channel::Kline],
            &["1m".to_string()],
            false,
        );
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({
                "type": "subscribe",
                "requestId": "req-1",
                "timestamp": 1_700_000_000_000i64,
                "data": {
                    "tokens": ["0xTOKEN"],
                    "channels": ["kline"],
                    "intervals": ["1m"],
                    "options": {"realTimeOnly": false}
                }
            })
        );
        assert!(msg.is_subscription());
    }

    #[test]
    fn test_subscribe_omits_empty_intervals() {
        let msg = OutboundMessage::subscribe("r", 0, "0xT", &[Channel::Trade], &[], true);
        let value = serde_json::to_value(&msg).unwrap();
        assert!(value["data"].get("intervals").is_none());
        assert_eq!(value["data"]["options"]["realTimeOnly"], json!(true));
    }

    #[test]
    fn test_unsubscribe_and_ping_wire_format() {
        let unsub = serde_json::to_value(OutboundMessage::unsubscribe(
            "r",
            5,
            "0xT",
            &[Channel::Kline, Channel::Trade],
        ))
        .unwrap();
        assert_eq!(
            unsub["data"],
            json!({"tokens": ["0xT"], "channels": ["kline", "trade"]})
        );

        let ping = OutboundMessage::ping("p", 42);
        assert!(!ping.is_subscription());
        let value = serde_json::to_value(&ping).unwrap();
        assert_eq!(value["type"], json!("ping"));
        assert_eq!(value["data"], json!({"clientTime": 42}));
    }

    #[test]
    fn test_classify_connected_top_level_and_nested() {
        let top = InboundMessage::classify(json!({"type": "connected", "connectionId": "abc"}));
        assert_eq!(
            top.unwrap(),
            InboundMessage::Connected {
                connection_id: "abc".to_string()
            }
        );

        let nested =
            InboundMessage::classify(json!({"type": "connected", "data": {"connectionId": "x"}}));
        assert!(matches!(nested.unwrap(), InboundMessage::Connected { connection_id } if connection_id == "x"));

        let missing = InboundMessage::classify(json!({"type": "connected"}));
        assert!(missing.unwrap_err().is_message_scoped());
    }

    #[test]
    fn test_classify_pong() {
        let pong = InboundMessage::classify(
            json!({"type": "pong", "data": {"clientTime": 100, "serverTime": "150"}}),
        )
        .unwrap();
        assert_eq!(
            pong,
            InboundMessage::Pong(PongMessage {
                client_time: Some(100),
                server_time: Some(150),
            })
        );
    }

    #[test]
    fn test_classify_confirmation_aliases() {
        for kind in ["subscribe", "subscribed"] {
            let msg = InboundMessage::classify(json!({"type": kind})).unwrap();
            assert!(matches!(msg, InboundMessage::Subscribed(_)));
        }
        for kind in ["unsubscribe", "unsubscribed"] {
            let msg = InboundMessage::classify(json!({"type": kind})).unwrap();
            assert!(matches!(msg, InboundMessage::Unsubscribed(_)));
        }
    }

    #[test]
    fn test_kline_update_round_trips_unchanged() {
        let raw = json!({
            "type": "kline_update",
            "timestamp": 1_700_000_000,
            "success": true,
            "data": {
                "tokenAddress": "0xTOKEN",
                "channel": "kline",
                "interval": "1m",
                "data": {"t": 1_700_000_000, "o": "1.0", "h": "1.2", "l": "0.9", "c": "1.1", "v": "1000"}
            }
        });

        let InboundMessage::KlineUpdate(msg) = InboundMessage::classify(raw.clone()).unwrap() else {
            panic!("expected kline_update");
        };
        assert_eq!(msg.token(), Some("0xTOKEN"));
        assert_eq!(msg.interval(), Some("1m"));
        assert_eq!(serde_json::to_value(&*msg).unwrap(), raw);
    }

    #[test]
    fn test_kline_update_keeps_extra_fields_and_numeric_prices() {
        let raw = json!({
            "type": "kline_update",
            "data": {
                "tokenAddress": "0xTOKEN",
                "interval": "1m",
                "data": {"t": 1_700_000_000, "o": 1.0, "h": "1.2", "l": "0.9", "c": "1.1", "v": "1000", "x": true}
            }
        });

        let InboundMessage::KlineUpdate(msg) = InboundMessage::classify(raw.clone()).unwrap() else {
            panic!("expected kline_update");
        };
        assert_eq!(msg.raw(), &raw);
        assert_eq!(serde_json::to_value(&*msg).unwrap(), raw);
        assert_eq!(msg.kline().map(|k| k.o.as_str()), Some("1.0"));
    }

    #[test]
    fn test_kline_update_with_unexpected_payload_is_still_forwarded() {
        let raw = json!({"type": "kline_update", "data": {"tokenAddress": "0xT", "data": {"t": "soon"}}});
        let InboundMessage::KlineUpdate(msg) = InboundMessage::classify(raw.clone()).unwrap() else {
            panic!("expected kline_update");
        };
        assert_eq!(msg.token(), Some("0xT"));
        assert!(msg.kline().is_none());
        assert_eq!(msg.into_raw(), raw);

        let empty = InboundMessage::classify(json!({"type": "kline_update", "data": {}})).unwrap();
        let InboundMessage::KlineUpdate(msg) = empty else {
            panic!("expected kline_update");
        };
        assert_eq!(msg.token(), None);
    }

    #[test]
    fn test_classify_trade_update() {
        let raw = json!({
            "type": "trade_update",
            "data": {
                "tokenAddress": "0xT",
                "data": {
                    "tradeId": "t1",
                    "price": "0.5",
                    "quantity": "10",
                    "side": "sell",
                    "timestamp": 1_700_000_000_000i64
                }
            }
        });
        let InboundMessage::TradeUpdate(msg) = InboundMessage::classify(raw).unwrap() else {
            panic!("expected trade_update");
        };
        assert_eq!(msg.data.token_address.as_deref(), Some("0xT"));
        assert_eq!(msg.data.data.trade_id, "t1");
    }

    #[test]
    fn test_classify_legacy_data_channels() {
        let kline = InboundMessage::classify(json!({"type": "data", "channel": "kline"})).unwrap();
        assert!(matches!(kline, InboundMessage::Data { channel: LegacyChannel::Kline, .. }));

        let trade =
            InboundMessage::classify(json!({"type": "data", "data": {"channel": "trade"}})).unwrap();
        assert!(matches!(trade, InboundMessage::Data { channel: LegacyChannel::Trade, .. }));

        let other = InboundMessage::classify(json!({"type": "data", "channel": "depth"})).unwrap();
        assert!(matches!(
            other,
            InboundMessage::Data { channel: LegacyChannel::Other(Some(ref c)), .. } if c == "depth"
        ));
    }

    #[test]
    fn test_classify_server_error() {
        let msg = InboundMessage::classify(
            json!({"type": "error", "data": {"code": 429, "message": "rate limited", "details": {"retry": 5}}}),
        )
        .unwrap();
        let InboundMessage::Error(err) = msg else {
            panic!("expected error");
        };
        assert_eq!(err.code.as_deref(), Some("429"));
        assert_eq!(err.message, "rate limited");
        assert_eq!(err.details, Some(json!({"retry": 5})));
    }

    #[test]
    fn test_classify_unknown() {
        let msg = InboundMessage::classify(json!({"type": "snapshot"})).unwrap();
        assert!(matches!(msg, InboundMessage::Unknown { kind: Some(ref k), .. } if k == "snapshot"));

        let untyped = InboundMessage::classify(json!([1, 2, 3])).unwrap();
        assert!(matches!(untyped, InboundMessage::Unknown { kind: None, .. }));
    }
}
