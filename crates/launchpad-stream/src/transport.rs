//! WebSocket 전송 계층.
//!
//! 연결 URL 생성, 소켓 열기, 수신 루프를 담당합니다. 페이로드는 해석하지 않고
//! 원시 이벤트만 액터로 전달합니다.

use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::CloseFrame;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, trace};
use url::Url;

use crate::error::{StreamError, StreamResult};

pub(crate) type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
pub(crate) type WsSink = SplitSink<WsStream, Message>;
type WsSource = SplitStream<WsStream>;

/// 연결 ID 쿼리 파라미터 이름.
pub const CONNECTION_ID_PARAM: &str = "connectionId";

/// 기본 URL에 캐시된 연결 ID를 쿼리 파라미터로 붙입니다.
///
/// 기존 `connectionId` 파라미터는 교체하고 다른 파라미터는 유지합니다.
pub fn connection_url(base: &str, connection_id: Option<&str>) -> StreamResult<Url> {
    let mut url = Url::parse(base)
        .map_err(|e| StreamError::Config(format!("invalid url '{}': {}", base, e)))?;

    let Some(id) = connection_id else {
        return Ok(url);
    };

    let retained: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| k != CONNECTION_ID_PARAM)
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    {
        let mut query = url.query_pairs_mut();
        query.clear();
        for (k, v) in &retained {
            query.append_pair(k, v);
        }
        query.append_pair(CONNECTION_ID_PARAM, id);
    }
    Ok(url)
}

/// 소켓에서 액터로 전달되는 원시 이벤트.
pub(crate) enum SocketEvent {
    Opened(WsStream),
    Frame(String),
    Closed { code: Option<u16>, reason: String },
    Failed(StreamError),
}

/// 세대 번호가 붙은 소켓 이벤트. 이전 소켓의 이벤트는 세대로 걸러냅니다.
pub(crate) struct Tagged {
    pub generation: u64,
    pub event: SocketEvent,
}

/// 소켓을 비동기로 열고 결과를 전달합니다.
pub(crate) fn spawn_connect(url: Url, generation: u64, tx: mpsc::UnboundedSender<Tagged>) {
    tokio::spawn(async move {
        let event = match connect_async(url.as_str()).await {
            Ok((ws, response)) => {
                debug!(status = %response.status(), "WebSocket handshake completed");
                SocketEvent::Opened(ws)
            }
            Err(e) => SocketEvent::Failed(e.into()),
        };
        let _ = tx.send(Tagged { generation, event });
    });
}

/// 수신 루프를 시작합니다.
pub(crate) fn spawn_reader(
    mut source: WsSource,
    generation: u64,
    tx: mpsc::UnboundedSender<Tagged>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let send = |event: SocketEvent| tx.send(Tagged { generation, event }).is_ok();

        while let Some(message) = source.next().await {
            let keep_going = match message {
                Ok(Message::Text(text)) => send(SocketEvent::Frame(text.to_string())),
                Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                    Ok(text) => send(SocketEvent::Frame(text)),
                    Err(_) => {
                        debug!(len = data.len(), "Ignoring non-UTF-8 binary frame");
                        true
                    }
                },
                Ok(Message::Close(frame)) => {
                    let (code, reason) = match frame {
                        Some(frame) => (Some(u16::from(frame.code)), frame.reason.to_string()),
                        None => (None, String::new()),
                    };
                    send(SocketEvent::Closed { code, reason });
                    return;
                }
                Ok(_) => {
                    trace!("Control frame");
                    true
                }
                Err(e) => {
                    send(SocketEvent::Failed(e.into()));
                    return;
                }
            };
            if !keep_going {
                return;
            }
        }

        send(SocketEvent::Closed {
            code: None,
            reason: "stream ended".to_string(),
        });
    })
}

/// 텍스트 프레임을 전송합니다.
pub(crate) async fn send_text(sink: &mut WsSink, text: String) -> StreamResult<()> {
    sink.send(Message::Text(text.into())).await?;
    Ok(())
}

/// close 프레임을 보내고 소켓을 닫습니다. 실패는 무시합니다.
pub(crate) async fn close(mut sink: WsSink, code: u16, reason: String) {
    let frame = CloseFrame {
        code: CloseCode::from(code),
        reason: reason.into(),
    };
    if let Err(e) = sink.send(Message::Close(Some(frame))).await {
        debug!(error = %e, "Close frame not delivered");
    }
    let _ = sink.close().await;
}
