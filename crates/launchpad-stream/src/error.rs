//! 스트림 클라이언트 에러 타입.

use thiserror::Error;

/// 스트림 관련 에러.
///
/// 공개 API는 이 에러를 직접 반환하지 않고 `StreamEvent::Error`로 전달합니다.
/// `Result`를 반환하는 것은 설정/세션 저장소 같은 생성 단계 API뿐입니다.
#[derive(Debug, Clone, Error)]
pub enum StreamError {
    /// WebSocket 연결/송수신 에러
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// 전송 계층이 닫혀 있음
    #[error("Transport closed: {0}")]
    TransportClosed(String),

    /// 프레임을 어떤 방식으로도 파싱하지 못함
    #[error("Frame parse error: {0}")]
    FrameParse(String),

    /// 메시지 스키마 검증 실패
    #[error("Invalid {kind} message: {reason}")]
    InvalidMessage { kind: String, reason: String },

    /// 리스너 처리 실패
    #[error("Listener for '{event}' failed: {reason}")]
    Listener { event: String, reason: String },

    /// 직렬화 에러
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 세션 저장소 에러
    #[error("Session store error: {0}")]
    SessionStore(String),

    /// 설정 에러
    #[error("Config error: {0}")]
    Config(String),

    /// 클라이언트가 이미 종료됨
    #[error("Client disposed")]
    Disposed,
}

/// 스트림 작업을 위한 Result 타입.
pub type StreamResult<T> = Result<T, StreamError>;

impl StreamError {
    /// 재연결로 복구될 수 있는 전송 계층 에러인지 확인.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            StreamError::WebSocket(_) | StreamError::TransportClosed(_)
        )
    }

    /// 메시지 하나에 국한된 에러인지 확인 (다음 메시지 처리에 영향 없음).
    pub fn is_message_scoped(&self) -> bool {
        matches!(
            self,
            StreamError::FrameParse(_)
                | StreamError::InvalidMessage { .. }
                | StreamError::Listener { .. }
        )
    }

    pub(crate) fn invalid(kind: impl Into<String>, reason: impl ToString) -> Self {
        StreamError::InvalidMessage {
            kind: kind.into(),
            reason: reason.to_string(),
        }
    }
}

impl From<serde_json::Error> for StreamError {
    fn from(err: serde_json::Error) -> Self {
        StreamError::Serialization(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for StreamError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        StreamError::WebSocket(err.to_string())
    }
}

impl From<launchpad_core::LaunchpadError> for StreamError {
    fn from(err: launchpad_core::LaunchpadError) -> Self {
        StreamError::Config(err.to_string())
    }
}

impl From<std::io::Error> for StreamError {
    fn from(err: std::io::Error) -> Self {
        StreamError::SessionStore(err.to_string())
    }
}
