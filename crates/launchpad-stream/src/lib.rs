//! 런치패드 실시간 시세 WebSocket 클라이언트.
//!
//! 이 크레이트는 다음을 제공합니다:
//! - 연결 ID 핸드셰이크와 준비 상태 관리
//! - ping/pong 하트비트와 지수 백오프 재연결
//! - 여러 JSON 문서가 합쳐진 프레임 복구
//! - 참조 카운트 기반 구독 레지스트리와 준비 전 송신 큐
//! - 타입이 지정된 이벤트 버스
//!
//! 상태 머신([`StreamEngine`])은 I/O 없이 동작하며, [`MarketStreamClient`]가
//! tokio 액터로 소켓과 타이머를 구동합니다.

pub mod backoff;
pub mod client;
pub mod clock;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod framing;
pub mod messages;
pub mod queue;
pub mod registry;
pub mod session;
pub mod timer;
pub mod transport;

pub use backoff::ReconnectPolicy;
pub use client::MarketStreamClient;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::StreamConfig;
pub use engine::{
    Action, ConnectionSnapshot, ConnectionState, StreamEngine, NORMAL_CLOSE_CODE,
    PONG_TIMEOUT_CLOSE_CODE,
};
pub use error::*;
pub use events::{EventBus, EventContext, EventKind, Listener, ListenerId, StreamEvent};
pub use framing::{decode_frame, DecodedFrame};
pub use messages::*;
pub use queue::OutboundQueue;
pub use registry::{Acquired, Released, RestoreGroup, SubscriptionRegistry};
pub use session::{FileSessionStore, MemorySessionStore, SessionStore, CONNECTION_ID_KEY};
pub use timer::{TimerFired, TimerKind, TimerSet};
pub use transport::connection_url;
