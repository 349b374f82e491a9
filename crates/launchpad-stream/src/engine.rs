//! 연결 상태 머신.
//!
//! [`StreamEngine`]은 I/O를 직접 수행하지 않습니다. 소켓/타이머/API 입력을 받아
//! 상태를 갱신하고, 실행해야 할 [`Action`] 목록을 순서대로 반환합니다.
//! 소켓 연결과 타이머 구동은 [`crate::client`]의 액터가 담당하므로, 재연결이나
//! 하트비트 같은 동작을 실제 네트워크 없이 결정적으로 테스트할 수 있습니다.
//!
//! # 상태 전이
//!
//! ```text
//! Idle ─connect→ Connecting ─open→ ConnectedNotReady ─connected→ Ready
//!                    │                    │                        │
//!                    └──────── 비정상 종료 ┴────────────────────────┘
//!                                         ↓
//!                  Reconnecting ─(시도 한도 초과)→ Failed
//! ```

use std::fmt;
use std::time::Duration;

use launchpad_core::{Channel, SubscriptionKey, SubscriptionRequest};
use tracing::{debug, error, info, trace, warn};
use url::Url;

use crate::backoff::ReconnectPolicy;
use crate::clock::{Clock, SystemClock};
use crate::config::StreamConfig;
use crate::error::StreamError;
use crate::events::StreamEvent;
use crate::framing::decode_frame;
use crate::messages::{InboundMessage, LegacyChannel, OutboundKind, OutboundMessage, PongMessage};
use crate::queue::OutboundQueue;
use crate::registry::{Acquired, Released, SubscriptionRegistry};
use crate::session::{SessionStore, CONNECTION_ID_KEY};
use crate::timer::TimerKind;
use crate::transport::connection_url;

/// 정상 종료 코드.
pub const NORMAL_CLOSE_CODE: u16 = 1000;

/// pong 타임아웃으로 강제 종료할 때 사용하는 코드.
pub const PONG_TIMEOUT_CLOSE_CODE: u16 = 4000;

/// 연결 상태.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    Idle,
    Connecting,
    ConnectedNotReady,
    Ready,
    Reconnecting,
    Failed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::ConnectedNotReady => "connected_not_ready",
            ConnectionState::Ready => "ready",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    Closed,
    Opening,
    Open,
}

/// 엔진이 요청하는 부수 효과.
#[derive(Debug, Clone)]
pub enum Action {
    /// 소켓 열기
    Open(Url),
    /// 텍스트 프레임 전송
    Send(String),
    /// 소켓 닫기
    Close { code: u16, reason: String },
    /// 타이머 설정 (같은 종류는 교체)
    ArmTimer { kind: TimerKind, delay: Duration },
    /// 타이머 중단
    CancelTimer(TimerKind),
    /// 이벤트 발행
    Emit(StreamEvent),
}

/// 외부에 공개되는 연결 상태 스냅샷.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionSnapshot {
    pub state: ConnectionState,
    pub connection_id: Option<String>,
    pub transport_open: bool,
    pub ready: bool,
    pub reconnect_attempt: u32,
    pub subscriptions: usize,
}

impl Default for ConnectionSnapshot {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            connection_id: None,
            transport_open: false,
            ready: false,
            reconnect_attempt: 0,
            subscriptions: 0,
        }
    }
}

/// 스트림 연결 상태 머신.
pub struct StreamEngine<C: Clock = SystemClock> {
    config: StreamConfig,
    policy: ReconnectPolicy,
    clock: C,
    session: Box<dyn SessionStore>,

    state: ConnectionState,
    transport: Transport,
    connection_id: Option<String>,
    ready: bool,
    intentional_close: bool,
    reconnect_attempt: u32,
    awaiting_pong: bool,
    /// 비정상 종료 이후에는 큐 대신 레지스트리로 구독을 복원
    restore_on_ready: bool,

    registry: SubscriptionRegistry,
    queue: OutboundQueue,
    actions: Vec<Action>,
}

impl StreamEngine<SystemClock> {
    pub fn new(config: StreamConfig, session: Box<dyn SessionStore>) -> Self {
        Self::with_clock(config, session, SystemClock)
    }
}

impl<C: Clock> StreamEngine<C> {
    /// 지정한 시계로 엔진을 생성합니다.
    pub fn with_clock(config: StreamConfig, session: Box<dyn SessionStore>, clock: C) -> Self {
        Self {
            policy: ReconnectPolicy::from_config(&config),
            config,
            clock,
            session,
            state: ConnectionState::Idle,
            transport: Transport::Closed,
            connection_id: None,
            ready: false,
            intentional_close: false,
            reconnect_attempt: 0,
            awaiting_pong: false,
            restore_on_ready: false,
            registry: SubscriptionRegistry::new(),
            queue: OutboundQueue::new(),
            actions: Vec::new(),
        }
    }

    // ========================================================================
    // 공개 API 입력
    // ========================================================================

    /// 연결을 시작합니다. 이미 열려 있거나 여는 중이면 아무것도 하지 않습니다.
    ///
    /// 재연결 시도 횟수는 초기화됩니다.
    pub fn connect(&mut self) -> Vec<Action> {
        if self.transport != Transport::Closed {
            debug!(state = %self.state, "connect() ignored, transport already active");
            return self.take_actions();
        }

        self.intentional_close = false;
        self.reconnect_attempt = 0;
        self.push(Action::CancelTimer(TimerKind::Reconnect));
        self.open_transport();
        self.take_actions()
    }

    /// 의도적으로 연결을 종료합니다. 재연결은 일어나지 않습니다.
    pub fn disconnect(&mut self) -> Vec<Action> {
        let was_active = self.transport != Transport::Closed || self.state != ConnectionState::Idle;
        info!(state = %self.state, "Disconnecting");

        self.intentional_close = true;
        for kind in TimerKind::all() {
            self.push(Action::CancelTimer(kind));
        }
        self.awaiting_pong = false;

        self.release_all();
        self.queue.clear();

        if self.transport != Transport::Closed {
            self.push(Action::Close {
                code: NORMAL_CLOSE_CODE,
                reason: "client disconnect".to_string(),
            });
        }

        self.transport = Transport::Closed;
        self.ready = false;
        self.connection_id = None;
        self.state = ConnectionState::Idle;
        self.reconnect_attempt = 0;
        self.restore_on_ready = false;

        if was_active {
            self.emit(StreamEvent::Disconnected {
                code: Some(NORMAL_CLOSE_CODE),
                reason: "client disconnect".to_string(),
                intentional: true,
            });
        }
        self.take_actions()
    }

    /// 구독을 추가합니다. 같은 키가 이미 있으면 참조 카운트만 증가합니다.
    pub fn subscribe(&mut self, request: SubscriptionRequest) -> Vec<Action> {
        if request.token.trim().is_empty() || request.channels.is_empty() {
            let err = StreamError::invalid("subscribe", "token and at least one channel are required");
            warn!(error = %err, "Rejected subscribe request");
            self.emit(StreamEvent::Error(err));
            return self.take_actions();
        }

        let span = launchpad_core::stream_span!("subscribe", request.token);
        let _guard = span.enter();

        match self.registry.acquire(&request) {
            Acquired::New => {
                let key = request.key();
                info!(key = %key, real_time_only = request.real_time_only, "New subscription");
                let message = OutboundMessage::subscribe(
                    request_id(),
                    self.clock.now_ms(),
                    key.token(),
                    key.channels(),
                    key.intervals(),
                    request.real_time_only,
                );
                self.send_or_queue(message);
            }
            Acquired::Shared { ref_count } => {
                debug!(ref_count, "Subscription shared, no wire traffic");
            }
        }
        self.take_actions()
    }

    /// 구독을 해제합니다. 마지막 참조가 해제될 때만 서버에 알립니다.
    pub fn unsubscribe<S: AsRef<str>>(
        &mut self,
        token: &str,
        channels: &[Channel],
        intervals: &[S],
    ) -> Vec<Action> {
        let key = SubscriptionKey::new(token, channels, intervals);
        let span = launchpad_core::stream_span!("unsubscribe", token);
        let _guard = span.enter();

        match self.registry.release(&key) {
            Released::NotRegistered => {
                warn!(key = %key, "Unsubscribe for unknown subscription ignored");
            }
            Released::Decremented { ref_count } => {
                debug!(key = %key, ref_count, "Subscription still referenced");
            }
            Released::Removed { channels } if channels.is_empty() => {
                info!(
                    key = %key,
                    intervals = ?key.intervals(),
                    "Subscription removed without unsubscribe, channels still used by other keys"
                );
            }
            Released::Removed { channels } => {
                info!(key = %key, "Subscription released");
                let message =
                    OutboundMessage::unsubscribe(request_id(), self.clock.now_ms(), token, &channels);
                self.send_or_queue(message);
            }
        }
        self.take_actions()
    }

    /// 참조 카운트와 무관하게 모든 구독을 해제합니다.
    pub fn unsubscribe_all(&mut self) -> Vec<Action> {
        self.release_all();
        self.take_actions()
    }

    /// 세션 저장소에서 연결 ID를 불러옵니다.
    pub fn load_connection_id(&mut self) -> Option<String> {
        match self.session.get(CONNECTION_ID_KEY) {
            Ok(Some(id)) => {
                debug!(connection_id = %id, "Loaded cached connection id");
                self.connection_id = Some(id.clone());
                Some(id)
            }
            Ok(None) => None,
            Err(e) => {
                warn!(error = %e, "Failed to read cached connection id");
                None
            }
        }
    }

    /// 메모리와 세션 저장소의 연결 ID를 지웁니다.
    pub fn clear_connection_id(&mut self) {
        self.connection_id = None;
        if let Err(e) = self.session.remove(CONNECTION_ID_KEY) {
            warn!(error = %e, "Failed to remove cached connection id");
        }
    }

    // ========================================================================
    // 전송 계층 입력
    // ========================================================================

    /// 소켓이 열렸습니다.
    pub fn on_open(&mut self) -> Vec<Action> {
        if self.transport != Transport::Opening {
            debug!(state = %self.state, "Unexpected open ignored");
            return self.take_actions();
        }

        self.transport = Transport::Open;
        self.ready = false;
        self.state = ConnectionState::ConnectedNotReady;
        info!(attempt = self.reconnect_attempt, "WebSocket opened, waiting for handshake");

        self.emit(StreamEvent::Connected);
        self.start_heartbeat();
        self.take_actions()
    }

    /// 텍스트 프레임을 수신했습니다.
    pub fn on_frame(&mut self, text: &str) -> Vec<Action> {
        if self.transport != Transport::Open {
            trace!("Frame received while transport not open, ignored");
            return self.take_actions();
        }

        let decoded = decode_frame(text);
        if decoded.discarded > 0 {
            debug!(
                recovered = decoded.messages.len(),
                discarded = decoded.discarded,
                "Partially recovered frame"
            );
        }

        for value in decoded.messages {
            match InboundMessage::classify(value) {
                Ok(message) => self.handle_message(message),
                Err(e) => {
                    warn!(error = %e, "Invalid inbound message");
                    self.emit(StreamEvent::Error(e));
                }
            }
        }

        if let Some(e) = decoded.error {
            warn!(error = %e, frame_len = text.len(), "Unparseable frame");
            self.emit(StreamEvent::Error(e));
        }
        self.take_actions()
    }

    /// 소켓이 닫혔습니다.
    pub fn on_close(&mut self, code: Option<u16>, reason: &str) -> Vec<Action> {
        if self.transport == Transport::Closed {
            trace!("Close for already closed transport ignored");
            return self.take_actions();
        }
        self.transport_closed(code, reason.to_string());
        self.take_actions()
    }

    /// 연결/송수신 에러. 비정상 종료와 동일하게 처리합니다.
    pub fn on_transport_error(&mut self, error: StreamError) -> Vec<Action> {
        error!(error = %error, state = %self.state, "Transport error");
        let reason = error.to_string();
        self.emit(StreamEvent::Error(error));
        if self.transport != Transport::Closed {
            self.transport_closed(None, reason);
        }
        self.take_actions()
    }

    /// 타이머가 발화했습니다.
    pub fn on_timer(&mut self, kind: TimerKind) -> Vec<Action> {
        match kind {
            TimerKind::Heartbeat => self.heartbeat_tick(),
            TimerKind::PongTimeout => self.pong_timed_out(),
            TimerKind::Reconnect => {
                if self.state == ConnectionState::Reconnecting
                    && self.transport == Transport::Closed
                    && !self.intentional_close
                {
                    self.open_transport();
                }
            }
        }
        self.take_actions()
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn connection_id(&self) -> Option<&str> {
        self.connection_id.as_deref()
    }

    /// 소켓이 열려 있는지 확인.
    pub fn is_connected(&self) -> bool {
        self.transport == Transport::Open
    }

    /// 구독 트래픽을 보낼 수 있는지 확인.
    pub fn is_ready(&self) -> bool {
        self.transport == Transport::Open && self.ready
    }

    pub fn reconnect_attempt(&self) -> u32 {
        self.reconnect_attempt
    }

    pub fn registry(&self) -> &SubscriptionRegistry {
        &self.registry
    }

    /// 준비 대기 중인 송신 메시지 수.
    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn config(&self) -> &StreamConfig {
        &self.config
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        ConnectionSnapshot {
            state: self.state,
            connection_id: self.connection_id.clone(),
            transport_open: self.is_connected(),
            ready: self.is_ready(),
            reconnect_attempt: self.reconnect_attempt,
            subscriptions: self.registry.len(),
        }
    }

    // ========================================================================
    // 내부 처리
    // ========================================================================

    fn open_transport(&mut self) {
        self.transport = Transport::Opening;
        self.state = if self.reconnect_attempt > 0 {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        };

        match connection_url(&self.config.url, self.connection_id.as_deref()) {
            Ok(url) => {
                info!(url = %url, attempt = self.reconnect_attempt, "Opening WebSocket");
                self.push(Action::Open(url));
            }
            Err(e) => {
                error!(error = %e, "Failed to build connection url");
                self.emit(StreamEvent::Error(e.clone()));
                self.transport_closed(None, e.to_string());
            }
        }
    }

    fn transport_closed(&mut self, code: Option<u16>, reason: String) {
        self.transport = Transport::Closed;
        self.ready = false;
        self.stop_heartbeat();

        if self.intentional_close {
            self.state = ConnectionState::Idle;
            return;
        }

        warn!(code = ?code, reason = %reason, "WebSocket closed unexpectedly");
        self.emit(StreamEvent::Disconnected {
            code,
            reason,
            intentional: false,
        });
        self.restore_on_ready = true;
        self.schedule_reconnect();
    }

    fn schedule_reconnect(&mut self) {
        match self.policy.next_delay(self.reconnect_attempt) {
            Some(delay) => {
                self.reconnect_attempt += 1;
                self.state = ConnectionState::Reconnecting;
                info!(
                    attempt = self.reconnect_attempt,
                    max_attempts = self.policy.max_attempts,
                    delay_ms = delay.as_millis() as u64,
                    "Scheduling reconnect"
                );
                self.emit(StreamEvent::Reconnecting {
                    attempt: self.reconnect_attempt,
                    delay,
                });
                self.push(Action::ArmTimer {
                    kind: TimerKind::Reconnect,
                    delay,
                });
            }
            None => {
                self.state = ConnectionState::Failed;
                error!(attempts = self.reconnect_attempt, "Reconnect attempts exhausted");
                self.emit(StreamEvent::ReconnectFailed {
                    attempts: self.reconnect_attempt,
                });
            }
        }
    }

    fn start_heartbeat(&mut self) {
        self.awaiting_pong = false;
        self.push(Action::CancelTimer(TimerKind::PongTimeout));
        self.push(Action::ArmTimer {
            kind: TimerKind::Heartbeat,
            delay: self.config.heartbeat_interval,
        });
    }

    fn stop_heartbeat(&mut self) {
        self.awaiting_pong = false;
        self.push(Action::CancelTimer(TimerKind::Heartbeat));
        self.push(Action::CancelTimer(TimerKind::PongTimeout));
    }

    fn heartbeat_tick(&mut self) {
        if self.transport != Transport::Open {
            return;
        }

        if self.awaiting_pong {
            debug!("Previous ping still awaiting pong, skipping");
        } else {
            let ping = OutboundMessage::ping(request_id(), self.clock.now_ms());
            self.transmit(ping);
            self.awaiting_pong = true;
            self.push(Action::ArmTimer {
                kind: TimerKind::PongTimeout,
                delay: self.config.pong_timeout,
            });
        }

        self.push(Action::ArmTimer {
            kind: TimerKind::Heartbeat,
            delay: self.config.heartbeat_interval,
        });
    }

    fn pong_timed_out(&mut self) {
        if !self.awaiting_pong || self.transport != Transport::Open {
            return;
        }

        warn!(
            timeout_ms = self.config.pong_timeout.as_millis() as u64,
            "Pong not received, forcing reconnect"
        );
        self.emit(StreamEvent::PongTimeout);
        self.push(Action::Close {
            code: PONG_TIMEOUT_CLOSE_CODE,
            reason: "pong timeout".to_string(),
        });
        self.transport_closed(Some(PONG_TIMEOUT_CLOSE_CODE), "pong timeout".to_string());
    }

    fn handle_message(&mut self, message: InboundMessage) {
        match message {
            InboundMessage::Connected { connection_id } => self.on_handshake(connection_id),
            InboundMessage::Pong(pong) => self.on_pong(pong),
            InboundMessage::Ping => trace!("Server ping received"),
            InboundMessage::Subscribed(value) => {
                debug!("Subscription confirmed");
                self.emit(StreamEvent::Subscribed(value));
            }
            InboundMessage::Unsubscribed(value) => {
                debug!("Unsubscription confirmed");
                self.emit(StreamEvent::Unsubscribed(value));
            }
            InboundMessage::KlineUpdate(message) => {
                trace!(token = ?message.token(), interval = ?message.interval(), "Kline update");
                self.emit(StreamEvent::KlineUpdate(message));
            }
            InboundMessage::TradeUpdate(message) => {
                trace!(token = ?message.data.token_address, "Trade update");
                self.emit(StreamEvent::TradeUpdate(Box::new(message.data)));
            }
            InboundMessage::Data { channel, message } => match channel {
                LegacyChannel::Kline => self.emit(StreamEvent::Kline(message)),
                LegacyChannel::Trade => self.emit(StreamEvent::Trade(message)),
                LegacyChannel::Other(_) => self.emit(StreamEvent::Data(message)),
            },
            InboundMessage::Error(server_error) => {
                warn!(
                    code = ?server_error.code,
                    message = %server_error.message,
                    "Server reported error"
                );
                self.emit(StreamEvent::ServerError(server_error));
            }
            InboundMessage::Unknown { kind, message } => {
                debug!(kind = ?kind, "Unknown message type");
                self.emit(StreamEvent::UnknownMessage { kind, message });
            }
        }
    }

    fn on_handshake(&mut self, connection_id: String) {
        let changed = self.connection_id.as_deref() != Some(connection_id.as_str());
        self.connection_id = Some(connection_id.clone());
        if let Err(e) = self.session.set(CONNECTION_ID_KEY, &connection_id) {
            warn!(error = %e, "Failed to persist connection id");
        }

        self.emit(StreamEvent::ConnectionId(connection_id.clone()));

        if self.ready && !changed {
            return;
        }

        let first_ready = !self.ready;
        self.ready = true;
        self.state = ConnectionState::Ready;
        info!(connection_id = %connection_id, changed, "Handshake completed");
        self.emit(StreamEvent::Ready { connection_id });

        if first_ready {
            self.reconnect_attempt = 0;
            if self.restore_on_ready {
                self.restore_subscriptions();
            } else {
                self.flush_queue();
            }
        }
    }

    fn on_pong(&mut self, pong: PongMessage) {
        if self.awaiting_pong {
            self.awaiting_pong = false;
            self.push(Action::CancelTimer(TimerKind::PongTimeout));
        }

        let now = self.clock.now_ms();
        let latency_ms = pong
            .client_time
            .and_then(|sent| now.checked_sub(sent))
            .filter(|latency| *latency >= 0);
        match latency_ms {
            Some(latency) if latency > self.config.latency_warn.as_millis() as i64 => {
                warn!(latency_ms = latency, "High WebSocket latency");
            }
            Some(latency) => trace!(latency_ms = latency, "Pong received"),
            None => debug!(client_time = ?pong.client_time, "Pong without usable clientTime"),
        }

        self.emit(StreamEvent::Pong {
            latency_ms,
            server_time: pong.server_time,
        });
    }

    fn flush_queue(&mut self) {
        let pending = self.queue.drain();
        if !pending.is_empty() {
            info!(count = pending.len(), "Flushing queued messages");
        }
        for message in pending {
            self.transmit(message);
        }
    }

    fn restore_subscriptions(&mut self) {
        self.restore_on_ready = false;
        let dropped = self.queue.len();
        self.queue.clear();

        let plan = self.registry.restore_plan();
        if plan.is_empty() {
            return;
        }
        info!(
            groups = plan.len(),
            keys = self.registry.len(),
            dropped_queued = dropped,
            "Restoring subscriptions"
        );

        let now = self.clock.now_ms();
        for group in plan {
            for token in &group.tokens {
                let message = OutboundMessage::subscribe(
                    request_id(),
                    now,
                    token,
                    &group.channels,
                    &group.intervals,
                    group.real_time_only,
                );
                self.transmit(message);
            }
        }
    }

    fn release_all(&mut self) {
        let now = self.clock.now_ms();
        for (token, channels) in self.registry.clear() {
            debug!(token = %token, "Releasing subscription");
            let message = OutboundMessage::unsubscribe(request_id(), now, &token, &channels);
            self.send_or_queue(message);
        }
    }

    fn send_or_queue(&mut self, message: OutboundMessage) {
        if self.is_ready() {
            self.transmit(message);
        } else if self.queue.push(message) {
            debug!(queued = self.queue.len(), state = %self.state, "Queued until ready");
        }
    }

    fn transmit(&mut self, message: OutboundMessage) {
        match message.to_json() {
            Ok(json) => {
                if message.kind != OutboundKind::Ping {
                    debug!(kind = ?message.kind, request_id = %message.request_id, "Sending");
                }
                self.push(Action::Send(json));
            }
            Err(e) => {
                error!(error = %e, "Failed to serialize outbound message");
                self.emit(StreamEvent::Error(e));
            }
        }
    }

    fn emit(&mut self, event: StreamEvent) {
        self.actions.push(Action::Emit(event));
    }

    fn push(&mut self, action: Action) {
        self.actions.push(action);
    }

    fn take_actions(&mut self) -> Vec<Action> {
        std::mem::take(&mut self.actions)
    }
}

impl<C: Clock> fmt::Debug for StreamEngine<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamEngine")
            .field("state", &self.state)
            .field("transport", &self.transport)
            .field("connection_id", &self.connection_id)
            .field("ready", &self.ready)
            .field("reconnect_attempt", &self.reconnect_attempt)
            .field("subscriptions", &self.registry.len())
            .field("queued", &self.queue.len())
            .finish()
    }
}

fn request_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::events::EventKind;
    use crate::session::MemorySessionStore;

    fn engine() -> StreamEngine<ManualClock> {
        let config = StreamConfig::new("ws://127.0.0.1:9/ws")
            .with_heartbeat(Duration::from_secs(30), Duration::from_secs(10));
        StreamEngine::with_clock(config, Box::new(MemorySessionStore::new()), ManualClock::new(0))
    }

    fn events(actions: &[Action]) -> Vec<EventKind> {
        actions
            .iter()
            .filter_map(|a| match a {
                Action::Emit(e) => Some(e.kind()),
                _ => None,
            })
            .collect()
    }

    fn sends(actions: &[Action]) -> usize {
        actions.iter().filter(|a| matches!(a, Action::Send(_))).count()
    }

    #[test]
    fn test_connect_opens_once() {
        let mut engine = engine();
        let actions = engine.connect();
        assert!(actions.iter().any(|a| matches!(a, Action::Open(_))));
        assert_eq!(engine.state(), ConnectionState::Connecting);

        let again = engine.connect();
        assert!(!again.iter().any(|a| matches!(a, Action::Open(_))));
    }

    #[test]
    fn test_open_is_not_ready() {
        let mut engine = engine();
        engine.connect();
        let actions = engine.on_open();
        assert_eq!(events(&actions), vec![EventKind::Connected]);
        assert!(engine.is_connected());
        assert!(!engine.is_ready());
        assert_eq!(engine.state(), ConnectionState::ConnectedNotReady);
    }

    #[test]
    fn test_same_id_does_not_emit_second_ready() {
        let mut engine = engine();
        engine.connect();
        engine.on_open();
        let first = engine.on_frame(r#"{"type":"connected","connectionId":"a"}"#);
        assert_eq!(events(&first), vec![EventKind::ConnectionId, EventKind::Ready]);

        let repeat = engine.on_frame(r#"{"type":"connected","connectionId":"a"}"#);
        assert_eq!(events(&repeat), vec![EventKind::ConnectionId]);

        let changed = engine.on_frame(r#"{"type":"connected","connectionId":"b"}"#);
        assert_eq!(events(&changed), vec![EventKind::ConnectionId, EventKind::Ready]);
    }

    #[test]
    fn test_reconnect_with_cached_id_still_becomes_ready() {
        let mut engine = engine();
        engine.connect();
        engine.on_open();
        engine.on_frame(r#"{"type":"connected","connectionId":"a"}"#);
        engine.on_close(Some(1006), "abnormal");
        engine.on_timer(TimerKind::Reconnect);
        engine.on_open();

        let actions = engine.on_frame(r#"{"type":"connected","connectionId":"a"}"#);
        assert!(events(&actions).contains(&EventKind::Ready));
        assert!(engine.is_ready());
        assert_eq!(engine.reconnect_attempt(), 0);
    }

    #[test]
    fn test_reconnect_url_carries_connection_id() {
        let mut engine = engine();
        engine.connect();
        engine.on_open();
        engine.on_frame(r#"{"type":"connected","connectionId":"abc123"}"#);
        engine.on_close(None, "reset");

        let actions = engine.on_timer(TimerKind::Reconnect);
        let url = actions
            .iter()
            .find_map(|a| match a {
                Action::Open(url) => Some(url.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(url.query(), Some("connectionId=abc123"));
    }

    #[test]
    fn test_ping_skipped_while_awaiting_pong() {
        let mut engine = engine();
        engine.connect();
        engine.on_open();

        let first = engine.on_timer(TimerKind::Heartbeat);
        assert_eq!(sends(&first), 1);
        let second = engine.on_timer(TimerKind::Heartbeat);
        assert_eq!(sends(&second), 0);
    }

    #[test]
    fn test_pong_latency() {
        let clock = ManualClock::new(1_000);
        let config = StreamConfig::new("ws://127.0.0.1:9/ws");
        let mut engine =
            StreamEngine::with_clock(config, Box::new(MemorySessionStore::new()), clock.clone());
        engine.connect();
        engine.on_open();
        engine.on_timer(TimerKind::Heartbeat);

        clock.advance(35);
        let actions = engine.on_frame(r#"{"type":"pong","clientTime":1000,"serverTime":1020}"#);
        assert!(actions
            .iter()
            .any(|a| matches!(a, Action::CancelTimer(TimerKind::PongTimeout))));
        let pong = actions.iter().find_map(|a| match a {
            Action::Emit(StreamEvent::Pong {
                latency_ms,
                server_time,
            }) => Some((*latency_ms, *server_time)),
            _ => None,
        });
        assert_eq!(pong, Some((Some(35), Some(1020))));

        // pong 이후의 타임아웃 발화는 무시됨
        let late = engine.on_timer(TimerKind::PongTimeout);
        assert!(events(&late).is_empty());
    }

    #[test]
    fn test_pong_with_out_of_range_client_time() {
        let mut engine = engine();
        engine.connect();
        engine.on_open();
        engine.on_timer(TimerKind::Heartbeat);

        let actions = engine.on_frame(r#"{"type":"pong","clientTime":-9223372036854775808}"#);
        let latency = actions.iter().find_map(|a| match a {
            Action::Emit(StreamEvent::Pong { latency_ms, .. }) => Some(*latency_ms),
            _ => None,
        });
        assert_eq!(latency, Some(None));
        assert!(!engine.awaiting_pong);

        // 미래 시각의 clientTime은 음수 지연이 되므로 버림
        engine.on_timer(TimerKind::Heartbeat);
        let actions = engine.on_frame(r#"{"type":"pong","clientTime":9223372036854775807}"#);
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Emit(StreamEvent::Pong {
                latency_ms: None,
                ..
            })
        )));
        assert!(engine.is_connected());
    }

    #[test]
    fn test_disconnect_clears_everything() {
        let mut engine = engine();
        engine.connect();
        engine.on_open();
        engine.on_frame(r#"{"type":"connected","connectionId":"a"}"#);
        engine.subscribe(SubscriptionRequest::new("0xT", [Channel::Kline]));

        let actions = engine.disconnect();
        assert_eq!(sends(&actions), 1);
        assert!(actions.iter().any(|a| matches!(
            a,
            Action::Close {
                code: NORMAL_CLOSE_CODE,
                ..
            }
        )));
        assert_eq!(events(&actions), vec![EventKind::Disconnected]);
        assert!(engine.registry().is_empty());
        assert_eq!(engine.connection_id(), None);
        assert_eq!(engine.state(), ConnectionState::Idle);

        // 이후 도착한 close는 재연결을 일으키지 않음
        let late = engine.on_close(Some(1000), "bye");
        assert!(late.is_empty());
    }

    #[test]
    fn test_invalid_subscribe_request_is_reported() {
        let mut engine = engine();
        let actions = engine.subscribe(SubscriptionRequest::new("", [Channel::Kline]));
        assert_eq!(events(&actions), vec![EventKind::Error]);
        assert!(engine.registry().is_empty());
    }

    #[test]
    fn test_unknown_unsubscribe_has_no_side_effects() {
        let mut engine = engine();
        let actions = engine.unsubscribe::<&str>("0xT", &[Channel::Kline], &[]);
        assert!(actions.is_empty());
    }

    #[test]
    fn test_load_and_clear_connection_id() {
        let mut session = MemorySessionStore::new();
        session.set(CONNECTION_ID_KEY, "cached").unwrap();
        let mut engine = StreamEngine::with_clock(
            StreamConfig::new("ws://127.0.0.1:9/ws"),
            Box::new(session),
            ManualClock::new(0),
        );

        assert_eq!(engine.load_connection_id().as_deref(), Some("cached"));
        assert_eq!(engine.connection_id(), Some("cached"));

        engine.clear_connection_id();
        assert_eq!(engine.connection_id(), None);
        assert_eq!(engine.load_connection_id(), None);
    }
}
