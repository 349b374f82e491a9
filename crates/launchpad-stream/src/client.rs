//! 공개 스트림 클라이언트.
//!
//! [`MarketStreamClient`]는 명시적으로 생성하고 [`MarketStreamClient::dispose`]로
//! 종료하는 핸들입니다. 내부적으로 하나의 tokio 태스크(액터)가 상태 머신,
//! 소켓 송신부, 타이머를 모두 소유하며 명령/소켓 이벤트/타이머 발화를 한
//! 곳에서 순차 처리합니다. 공개 메서드는 명령을 보내기만 하므로 블록되지 않습니다.
//!
//! # 사용 예제
//!
//! ```rust,ignore
//! use launchpad_core::{Channel, SubscriptionRequest};
//! use launchpad_stream::{EventKind, MarketStreamClient, MemorySessionStore, StreamConfig, StreamEvent};
//!
//! let client = MarketStreamClient::create(
//!     StreamConfig::new("wss://stream.example.com/ws"),
//!     Box::new(MemorySessionStore::new()),
//! )?;
//!
//! client.on(EventKind::KlineUpdate, |event| {
//!     if let StreamEvent::KlineUpdate(msg) = event {
//!         if let Some(kline) = msg.kline() {
//!             println!("{:?} {:?}", msg.token(), kline.to_candle()?);
//!         }
//!     }
//!     Ok(())
//! });
//!
//! client.connect();
//! client.subscribe(SubscriptionRequest::new("0xTOKEN", [Channel::Kline]).with_intervals(["1m"]));
//! // ...
//! client.dispose().await;
//! ```

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures::StreamExt;
use launchpad_core::{Channel, SubscriptionRequest};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::StreamConfig;
use crate::engine::{Action, ConnectionSnapshot, ConnectionState, StreamEngine};
use crate::error::{StreamError, StreamResult};
use crate::events::{EventBus, EventKind, ListenerId, StreamEvent};
use crate::session::SessionStore;
use crate::timer::{TimerFired, TimerSet};
use crate::transport::{self, SocketEvent, Tagged, WsSink};

enum Command {
    Connect,
    Disconnect,
    Subscribe(SubscriptionRequest),
    Unsubscribe {
        token: String,
        channels: Vec<Channel>,
        intervals: Vec<String>,
    },
    UnsubscribeAll,
    LoadConnectionId(oneshot::Sender<Option<String>>),
    ClearConnectionId,
}

/// 실시간 시세 스트림 클라이언트.
pub struct MarketStreamClient {
    commands: mpsc::UnboundedSender<Command>,
    bus: Arc<EventBus>,
    snapshot: watch::Receiver<ConnectionSnapshot>,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl MarketStreamClient {
    /// 클라이언트를 생성하고 액터 태스크를 시작합니다. tokio 런타임 안에서 호출해야 합니다.
    ///
    /// 연결은 [`connect`](Self::connect)를 호출해야 시작됩니다.
    pub fn create(config: StreamConfig, session: Box<dyn SessionStore>) -> StreamResult<Self> {
        config.validate()?;
        let engine = StreamEngine::new(config, session);
        Ok(Self::spawn(engine))
    }

    /// 지정한 엔진(시계 포함)으로 클라이언트를 생성합니다.
    pub fn with_engine<C: Clock>(engine: StreamEngine<C>) -> StreamResult<Self> {
        engine.config().validate()?;
        Ok(Self::spawn(engine))
    }

    fn spawn<C: Clock>(engine: StreamEngine<C>) -> Self {
        let config = engine.config();
        let bus = Arc::new(EventBus::new(
            config.listener_warn_threshold,
            config.event_buffer,
        ));
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot) = watch::channel(engine.snapshot());
        let shutdown = CancellationToken::new();

        let actor = Actor::new(engine, Arc::clone(&bus), snapshot_tx, shutdown.clone());
        let task = tokio::spawn(actor.run(command_rx));

        Self {
            commands,
            bus,
            snapshot,
            shutdown,
            task: Mutex::new(Some(task)),
        }
    }

    /// 연결을 시작합니다. 이미 연결되어 있으면 아무것도 하지 않습니다.
    pub fn connect(&self) {
        self.send(Command::Connect);
    }

    /// 의도적으로 연결을 종료합니다. 모든 구독이 해제되고 재연결하지 않습니다.
    pub fn disconnect(&self) {
        self.send(Command::Disconnect);
    }

    /// 구독합니다. 준비 전이면 큐에 보관됩니다.
    pub fn subscribe(&self, request: SubscriptionRequest) {
        self.send(Command::Subscribe(request));
    }

    /// 구독을 해제합니다.
    pub fn unsubscribe<S: AsRef<str>>(&self, token: &str, channels: &[Channel], intervals: &[S]) {
        self.send(Command::Unsubscribe {
            token: token.to_string(),
            channels: channels.to_vec(),
            intervals: intervals.iter().map(|s| s.as_ref().to_string()).collect(),
        });
    }

    /// 참조 카운트와 무관하게 모든 구독을 해제합니다.
    pub fn unsubscribe_all(&self) {
        self.send(Command::UnsubscribeAll);
    }

    /// 세션 저장소에서 연결 ID를 불러와 다음 연결에 사용합니다.
    pub async fn load_connection_id(&self) -> Option<String> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::LoadConnectionId(tx));
        rx.await.ok().flatten()
    }

    /// 저장된 연결 ID를 지웁니다.
    pub fn clear_connection_id(&self) {
        self.send(Command::ClearConnectionId);
    }

    pub fn get_connection_id(&self) -> Option<String> {
        self.snapshot.borrow().connection_id.clone()
    }

    /// 소켓이 열려 있는지 확인.
    pub fn is_connected(&self) -> bool {
        self.snapshot.borrow().transport_open
    }

    /// 핸드셰이크가 끝나 구독을 보낼 수 있는지 확인.
    pub fn is_ready_for_subscriptions(&self) -> bool {
        self.snapshot.borrow().ready
    }

    pub fn state(&self) -> ConnectionState {
        self.snapshot.borrow().state
    }

    pub fn snapshot(&self) -> ConnectionSnapshot {
        self.snapshot.borrow().clone()
    }

    /// 상태 변화를 구독합니다.
    pub fn watch_state(&self) -> watch::Receiver<ConnectionSnapshot> {
        self.snapshot.clone()
    }

    /// 이벤트 리스너를 등록합니다.
    pub fn on<F>(&self, kind: EventKind, listener: F) -> ListenerId
    where
        F: Fn(&StreamEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.bus.on(kind, listener)
    }

    /// 이벤트 리스너를 해제합니다.
    pub fn off(&self, id: ListenerId) -> bool {
        self.bus.off(id)
    }

    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.bus.listener_count(kind)
    }

    /// 모든 이벤트를 받는 broadcast 수신자.
    pub fn events(&self) -> broadcast::Receiver<StreamEvent> {
        self.bus.subscribe()
    }

    /// 연결을 정리하고 액터 태스크가 끝날 때까지 기다립니다.
    pub async fn dispose(&self) {
        self.shutdown.cancel();
        let task = match self.task.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(error = %e, "Stream actor terminated abnormally");
            }
        }
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            debug!("Command dropped, client disposed");
            self.bus.emit(StreamEvent::Error(StreamError::Disposed));
        }
    }
}

impl Drop for MarketStreamClient {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for MarketStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MarketStreamClient")
            .field("snapshot", &*self.snapshot.borrow())
            .finish()
    }
}

// ============================================================================
// 액터
// ============================================================================

struct Actor<C: Clock> {
    engine: StreamEngine<C>,
    bus: Arc<EventBus>,
    snapshot_tx: watch::Sender<ConnectionSnapshot>,
    shutdown: CancellationToken,

    timers: TimerSet,
    timer_rx: mpsc::UnboundedReceiver<TimerFired>,
    socket_tx: mpsc::UnboundedSender<Tagged>,
    socket_rx: mpsc::UnboundedReceiver<Tagged>,

    writer: Option<WsSink>,
    reader: Option<JoinHandle<()>>,
    /// 현재 소켓 세대. 새 연결이나 종료 때마다 증가
    generation: u64,
}

impl<C: Clock> Actor<C> {
    fn new(
        engine: StreamEngine<C>,
        bus: Arc<EventBus>,
        snapshot_tx: watch::Sender<ConnectionSnapshot>,
        shutdown: CancellationToken,
    ) -> Self {
        let (timer_tx, timer_rx) = mpsc::unbounded_channel();
        let (socket_tx, socket_rx) = mpsc::unbounded_channel();
        Self {
            engine,
            bus,
            snapshot_tx,
            shutdown,
            timers: TimerSet::new(timer_tx),
            timer_rx,
            socket_tx,
            socket_rx,
            writer: None,
            reader: None,
            generation: 0,
        }
    }

    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!("Stream actor started");

        loop {
            tokio::select! {
                biased;

                _ = self.shutdown.cancelled() => break,

                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },

                Some(tagged) = self.socket_rx.recv() => self.handle_socket(tagged).await,

                Some(fired) = self.timer_rx.recv() => {
                    if self.timers.accept(fired) {
                        let actions = self.engine.on_timer(fired.kind);
                        self.apply(actions).await;
                    }
                }
            }
        }

        let actions = self.engine.disconnect();
        self.apply(actions).await;
        self.timers.cancel_all();
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        info!("Stream actor stopped");
    }

    async fn handle_command(&mut self, command: Command) {
        let actions = match command {
            Command::Connect => self.engine.connect(),
            Command::Disconnect => self.engine.disconnect(),
            Command::Subscribe(request) => self.engine.subscribe(request),
            Command::Unsubscribe {
                token,
                channels,
                intervals,
            } => self.engine.unsubscribe(&token, &channels, &intervals),
            Command::UnsubscribeAll => self.engine.unsubscribe_all(),
            Command::LoadConnectionId(reply) => {
                let _ = reply.send(self.engine.load_connection_id());
                Vec::new()
            }
            Command::ClearConnectionId => {
                self.engine.clear_connection_id();
                Vec::new()
            }
        };
        self.apply(actions).await;
    }

    async fn handle_socket(&mut self, tagged: Tagged) {
        if tagged.generation != self.generation {
            debug!(
                generation = tagged.generation,
                current = self.generation,
                "Stale socket event ignored"
            );
            return;
        }

        let actions = match tagged.event {
            SocketEvent::Opened(ws) => {
                let (sink, source) = ws.split();
                self.writer = Some(sink);
                self.reader = Some(transport::spawn_reader(
                    source,
                    self.generation,
                    self.socket_tx.clone(),
                ));
                self.engine.on_open()
            }
            SocketEvent::Frame(text) => self.engine.on_frame(&text),
            SocketEvent::Closed { code, reason } => {
                self.drop_socket();
                self.engine.on_close(code, &reason)
            }
            SocketEvent::Failed(error) => {
                self.drop_socket();
                self.engine.on_transport_error(error)
            }
        };
        self.apply(actions).await;
    }

    /// 엔진이 요청한 동작을 순서대로 실행합니다. 실행 중 발생한 전송 에러는
    /// 엔진에 다시 입력되어 이어지는 동작이 같은 큐에 추가됩니다.
    async fn apply(&mut self, actions: Vec<Action>) {
        let mut pending: VecDeque<Action> = actions.into();

        while let Some(action) = pending.pop_front() {
            match action {
                Action::Open(url) => {
                    self.drop_socket();
                    transport::spawn_connect(url, self.generation, self.socket_tx.clone());
                }
                Action::Send(text) => {
                    let Some(writer) = self.writer.as_mut() else {
                        debug!("Send skipped, no open socket");
                        continue;
                    };
                    if let Err(e) = transport::send_text(writer, text).await {
                        self.drop_socket();
                        pending.extend(self.engine.on_transport_error(e));
                    }
                }
                Action::Close { code, reason } => {
                    if let Some(writer) = self.drop_socket() {
                        transport::close(writer, code, reason).await;
                    }
                }
                Action::ArmTimer { kind, delay } => self.timers.arm(kind, delay),
                Action::CancelTimer(kind) => self.timers.cancel(kind),
                Action::Emit(event) => self.bus.emit(event),
            }
        }

        self.publish();
    }

    /// 현재 소켓을 분리하고 세대를 올립니다. 송신부가 있었으면 반환합니다.
    fn drop_socket(&mut self) -> Option<WsSink> {
        self.generation += 1;
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.writer.take()
    }

    fn publish(&self) {
        let snapshot = self.engine.snapshot();
        self.snapshot_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
