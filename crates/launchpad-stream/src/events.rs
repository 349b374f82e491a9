//! 타입이 지정된 스트림 이벤트와 이벤트 버스.
//!
//! 모든 이벤트는 [`StreamEvent`] 하나의 합 타입으로 표현되며, 리스너는
//! [`EventKind`]별로 등록합니다. 리스너가 실패(에러 반환 또는 패닉)해도
//! 디스패치는 계속되며, 실패는 로그와 함께 `Error` 이벤트로 다시 전달됩니다.

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::Value;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::StreamError;
use crate::messages::{KlineUpdateMessage, ServerError, TradeUpdateData};

/// 이벤트 종류.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    Connected,
    Disconnected,
    Ready,
    ConnectionId,
    Subscribed,
    Unsubscribed,
    KlineUpdate,
    TradeUpdate,
    Kline,
    Trade,
    Data,
    Pong,
    PongTimeout,
    Reconnecting,
    ReconnectFailed,
    ServerError,
    Error,
    UnknownMessage,
}

impl EventKind {
    /// 이벤트 이름.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::Connected => "connected",
            EventKind::Disconnected => "disconnected",
            EventKind::Ready => "ready",
            EventKind::ConnectionId => "connectionId",
            EventKind::Subscribed => "subscribed",
            EventKind::Unsubscribed => "unsubscribed",
            EventKind::KlineUpdate => "kline_update",
            EventKind::TradeUpdate => "trade_update",
            EventKind::Kline => "kline",
            EventKind::Trade => "trade",
            EventKind::Data => "data",
            EventKind::Pong => "pong",
            EventKind::PongTimeout => "pongTimeout",
            EventKind::Reconnecting => "reconnecting",
            EventKind::ReconnectFailed => "reconnectFailed",
            EventKind::ServerError => "serverError",
            EventKind::Error => "error",
            EventKind::UnknownMessage => "unknown-message",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 스트림 이벤트.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// 소켓 열림 (아직 구독 불가)
    Connected,
    /// 소켓 닫힘
    Disconnected {
        code: Option<u16>,
        reason: String,
        intentional: bool,
    },
    /// 핸드셰이크 완료, 구독 가능
    Ready { connection_id: String },
    /// 연결 ID 수신 (값이 같아도 매번 발생)
    ConnectionId(String),
    Subscribed(Value),
    Unsubscribed(Value),
    /// 원본 메시지 그대로
    KlineUpdate(Box<KlineUpdateMessage>),
    TradeUpdate(Box<TradeUpdateData>),
    /// 레거시 `data` 메시지 (kline 채널)
    Kline(Value),
    /// 레거시 `data` 메시지 (trade 채널)
    Trade(Value),
    /// 레거시 `data` 메시지 (그 외 채널)
    Data(Value),
    Pong {
        latency_ms: Option<i64>,
        server_time: Option<i64>,
    },
    PongTimeout,
    Reconnecting { attempt: u32, delay: Duration },
    ReconnectFailed { attempts: u32 },
    ServerError(ServerError),
    Error(StreamError),
    UnknownMessage { kind: Option<String>, message: Value },
}

impl StreamEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            StreamEvent::Connected => EventKind::Connected,
            StreamEvent::Disconnected { .. } => EventKind::Disconnected,
            StreamEvent::Ready { .. } => EventKind::Ready,
            StreamEvent::ConnectionId(_) => EventKind::ConnectionId,
            StreamEvent::Subscribed(_) => EventKind::Subscribed,
            StreamEvent::Unsubscribed(_) => EventKind::Unsubscribed,
            StreamEvent::KlineUpdate(_) => EventKind::KlineUpdate,
            StreamEvent::TradeUpdate(_) => EventKind::TradeUpdate,
            StreamEvent::Kline(_) => EventKind::Kline,
            StreamEvent::Trade(_) => EventKind::Trade,
            StreamEvent::Data(_) => EventKind::Data,
            StreamEvent::Pong { .. } => EventKind::Pong,
            StreamEvent::PongTimeout => EventKind::PongTimeout,
            StreamEvent::Reconnecting { .. } => EventKind::Reconnecting,
            StreamEvent::ReconnectFailed { .. } => EventKind::ReconnectFailed,
            StreamEvent::ServerError(_) => EventKind::ServerError,
            StreamEvent::Error(_) => EventKind::Error,
            StreamEvent::UnknownMessage { .. } => EventKind::UnknownMessage,
        }
    }

    /// 리스너 실패 로그에 남길 (토큰, 인터벌/채널, 타임스탬프).
    pub fn context(&self) -> EventContext {
        match self {
            StreamEvent::KlineUpdate(msg) => EventContext {
                token: msg.token().map(str::to_owned),
                interval: msg.interval().map(str::to_owned),
                timestamp: msg.kline().map(|kline| kline.t),
            },
            StreamEvent::TradeUpdate(data) => EventContext {
                token: data.token_address.clone(),
                interval: data.channel.clone(),
                timestamp: Some(data.data.timestamp),
            },
            StreamEvent::Kline(value) | StreamEvent::Trade(value) | StreamEvent::Data(value) => {
                let data = value.get("data");
                let field = |name: &str| {
                    value
                        .get(name)
                        .or_else(|| data.and_then(|d| d.get(name)))
                        .and_then(Value::as_str)
                        .map(str::to_owned)
                };
                EventContext {
                    token: field("tokenAddress"),
                    interval: field("interval").or_else(|| field("channel")),
                    timestamp: value.get("timestamp").and_then(Value::as_i64),
                }
            }
            _ => EventContext::default(),
        }
    }
}

/// 이벤트 진단 컨텍스트.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventContext {
    pub token: Option<String>,
    pub interval: Option<String>,
    pub timestamp: Option<i64>,
}

/// 리스너 식별자.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ListenerId(u64);

/// 이벤트 리스너.
pub type Listener = Arc<dyn Fn(&StreamEvent) -> anyhow::Result<()> + Send + Sync>;

/// 이벤트 버스.
///
/// 콜백 리스너와 `broadcast` 구독자 모두에게 이벤트를 전달합니다.
pub struct EventBus {
    listeners: Mutex<BTreeMap<EventKind, Vec<(ListenerId, Listener)>>>,
    next_id: AtomicU64,
    warn_threshold: usize,
    sender: broadcast::Sender<StreamEvent>,
}

impl EventBus {
    pub fn new(warn_threshold: usize, buffer: usize) -> Self {
        let (sender, _) = broadcast::channel(buffer.max(1));
        Self {
            listeners: Mutex::new(BTreeMap::new()),
            next_id: AtomicU64::new(1),
            warn_threshold,
            sender,
        }
    }

    /// 리스너를 등록합니다. 임계치를 넘으면 경고만 기록합니다.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&StreamEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let count = {
            let mut listeners = self.lock();
            let slot = listeners.entry(kind).or_default();
            slot.push((id, Arc::new(listener)));
            slot.len()
        };

        if count > self.warn_threshold {
            warn!(
                event = %kind,
                count,
                threshold = self.warn_threshold,
                "Listener count exceeds threshold, possible leak"
            );
        }
        id
    }

    /// 리스너를 해제합니다. 등록되어 있었으면 `true`.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.lock();
        for slot in listeners.values_mut() {
            if let Some(pos) = slot.iter().position(|(lid, _)| *lid == id) {
                slot.remove(pos);
                return true;
            }
        }
        false
    }

    /// 이벤트 종류별 리스너 수.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.lock().get(&kind).map_or(0, Vec::len)
    }

    /// broadcast 구독자를 생성합니다.
    pub fn subscribe(&self) -> broadcast::Receiver<StreamEvent> {
        self.sender.subscribe()
    }

    /// 이벤트를 전달합니다.
    pub fn emit(&self, event: StreamEvent) {
        let failures = self.dispatch(&event);
        let _ = self.sender.send(event.clone());

        if event.kind() == EventKind::Error {
            return;
        }
        for failure in failures {
            // Error 리스너의 실패는 다시 전달하지 않음
            let error_event = StreamEvent::Error(failure);
            self.dispatch(&error_event);
            let _ = self.sender.send(error_event);
        }
    }

    fn dispatch(&self, event: &StreamEvent) -> Vec<StreamError> {
        let kind = event.kind();
        let snapshot: Vec<Listener> = match self.lock().get(&kind) {
            Some(slot) => slot.iter().map(|(_, l)| Arc::clone(l)).collect(),
            None => return Vec::new(),
        };

        let mut failures = Vec::new();
        for listener in snapshot {
            let reason = match catch_unwind(AssertUnwindSafe(|| listener(event))) {
                Ok(Ok(())) => continue,
                Ok(Err(e)) => format!("{:#}", e),
                Err(panic) => panic_message(panic.as_ref()),
            };

            let ctx = event.context();
            warn!(
                event = %kind,
                token = ctx.token.as_deref().unwrap_or("-"),
                interval = ctx.interval.as_deref().unwrap_or("-"),
                timestamp = ?ctx.timestamp,
                error = %reason,
                "Listener failed"
            );
            failures.push(StreamError::Listener {
                event: kind.as_str().to_string(),
                reason,
            });
        }
        failures
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<EventKind, Vec<(ListenerId, Listener)>>> {
        // 리스너는 락 밖에서 호출되므로 poison 상태여도 맵 자체는 일관됨
        self.listeners.lock().unwrap_or_else(|poisoned| {
            debug!("Listener registry lock was poisoned, recovering");
            poisoned.into_inner()
        })
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: BTreeMap<EventKind, usize> =
            self.lock().iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventBus")
            .field("listeners", &counts)
            .field("warn_threshold", &self.warn_threshold)
            .finish()
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn counter() -> (Arc<AtomicUsize>, impl Fn(&StreamEvent) -> anyhow::Result<()>) {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        (count, move |_: &StreamEvent| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_event_names() {
        assert_eq!(EventKind::ConnectionId.as_str(), "connectionId");
        assert_eq!(EventKind::PongTimeout.as_str(), "pongTimeout");
        assert_eq!(EventKind::UnknownMessage.as_str(), "unknown-message");
        assert_eq!(StreamEvent::PongTimeout.kind(), EventKind::PongTimeout);
    }

    #[test]
    fn test_on_off_and_counts() {
        let bus = EventBus::new(10, 16);
        let (count, listener) = counter();
        let id = bus.on(EventKind::Ready, listener);
        assert_eq!(bus.listener_count(EventKind::Ready), 1);

        bus.emit(StreamEvent::Ready {
            connection_id: "a".to_string(),
        });
        bus.emit(StreamEvent::Connected);
        assert_eq!(count.load(Ordering::SeqCst), 1);

        assert!(bus.off(id));
        assert!(!bus.off(id));
        assert_eq!(bus.listener_count(EventKind::Ready), 0);
    }

    #[test]
    fn test_threshold_never_blocks_registration() {
        let bus = EventBus::new(2, 16);
        for _ in 0..5 {
            bus.on(EventKind::Pong, |_| Ok(()));
        }
        assert_eq!(bus.listener_count(EventKind::Pong), 5);
    }

    #[test]
    fn test_failing_listener_is_isolated_and_reported() {
        let bus = EventBus::new(10, 16);
        let (after, listener) = counter();
        let (errors, error_listener) = counter();

        bus.on(EventKind::Data, |_| Err(anyhow::anyhow!("boom")));
        bus.on(EventKind::Data, |_| panic!("kaboom"));
        bus.on(EventKind::Data, listener);
        bus.on(EventKind::Error, error_listener);

        let mut rx = bus.subscribe();
        bus.emit(StreamEvent::Data(serde_json::json!({"type": "data"})));

        assert_eq!(after.load(Ordering::SeqCst), 1);
        assert_eq!(errors.load(Ordering::SeqCst), 2);

        assert_eq!(rx.try_recv().unwrap().kind(), EventKind::Data);
        match rx.try_recv().unwrap() {
            StreamEvent::Error(StreamError::Listener { event, reason }) => {
                assert_eq!(event, "data");
                assert!(reason.contains("boom"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_failing_error_listener_does_not_recurse() {
        let bus = EventBus::new(10, 16);
        let (calls, listener) = counter();
        bus.on(EventKind::Error, listener);
        bus.on(EventKind::Error, |_| Err(anyhow::anyhow!("nested")));

        bus.emit(StreamEvent::Error(StreamError::FrameParse("x".to_string())));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_may_unregister_itself() {
        let bus = Arc::new(EventBus::new(10, 16));
        let slot: Arc<Mutex<Option<ListenerId>>> = Arc::new(Mutex::new(None));

        let bus_ref = Arc::clone(&bus);
        let slot_ref = Arc::clone(&slot);
        let id = bus.on(EventKind::PongTimeout, move |_| {
            if let Some(id) = slot_ref.lock().unwrap().take() {
                bus_ref.off(id);
            }
            Ok(())
        });
        *slot.lock().unwrap() = Some(id);

        bus.emit(StreamEvent::PongTimeout);
        assert_eq!(bus.listener_count(EventKind::PongTimeout), 0);
    }

    #[test]
    fn test_kline_context() {
        let raw = serde_json::json!({
            "type": "kline_update",
            "data": {
                "tokenAddress": "0xT",
                "interval": "5m",
                "data": {"t": 42, "o": "1", "h": "1", "l": "1", "c": "1", "v": "0"}
            }
        });
        let msg: KlineUpdateMessage = serde_json::from_value(raw).unwrap();
        let ctx = StreamEvent::KlineUpdate(Box::new(msg)).context();
        assert_eq!(ctx.token.as_deref(), Some("0xT"));
        assert_eq!(ctx.interval.as_deref(), Some("5m"));
        assert_eq!(ctx.timestamp, Some(42));
    }
}
