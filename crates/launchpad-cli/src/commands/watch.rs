//! 실시간 캔들/체결 모니터링.
//!
//! 스트림 서버에 연결하여 지정한 토큰을 구독하고, Ctrl-C가 입력될 때까지
//! 수신한 이벤트를 터미널에 출력합니다.

use anyhow::{anyhow, Context, Result};
use launchpad_core::{AppConfig, Channel, SubscriptionRequest};
use launchpad_stream::{
    FileSessionStore, MarketStreamClient, MemorySessionStore, SessionStore, StreamConfig,
    StreamEvent,
};
use rust_decimal::Decimal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{info, warn};

/// watch 명령 설정.
#[derive(Debug, Clone)]
pub struct WatchConfig {
    /// 토큰 주소
    pub token: String,
    /// 구독 채널
    pub channels: Vec<Channel>,
    /// 캔들 인터벌
    pub intervals: Vec<String>,
    /// 실시간 데이터만 수신
    pub real_time_only: bool,
    /// JSON 한 줄 출력
    pub json: bool,
}

impl WatchConfig {
    /// 구독 요청으로 변환합니다.
    pub fn request(&self) -> SubscriptionRequest {
        SubscriptionRequest::new(self.token.clone(), self.channels.iter().copied())
            .with_intervals(self.intervals.iter().cloned())
            .real_time_only(self.real_time_only)
    }
}

/// 스트림을 구독하고 Ctrl-C까지 이벤트를 출력합니다.
pub async fn run_watch(app: &AppConfig, watch: WatchConfig) -> Result<()> {
    let config = StreamConfig::from_settings(&app.stream);
    let session: Box<dyn SessionStore> = match &app.stream.session_file {
        Some(path) => Box::new(FileSessionStore::new(path)),
        None => Box::new(MemorySessionStore::new()),
    };

    let client = MarketStreamClient::create(config, session).context("클라이언트 생성 실패")?;
    let mut events = client.events();

    if let Some(id) = client.load_connection_id().await {
        info!(connection_id = %id, "Resuming cached connection id");
    }

    client.connect();
    client.subscribe(watch.request());

    info!(
        token = %watch.token,
        channels = ?watch.channels,
        intervals = ?watch.intervals,
        "Watching stream (Ctrl-C to stop)"
    );

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    let outcome = loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Ctrl-C received, shutting down");
                break Ok(());
            }
            received = events.recv() => match received {
                Ok(event) => {
                    if let Some(line) = format_event(&event, watch.json) {
                        println!("{}", line);
                    }
                    if let StreamEvent::ReconnectFailed { attempts } = event {
                        break Err(anyhow!("재연결 {}회 시도 후 실패", attempts));
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Terminal output lagging, events dropped");
                }
                Err(RecvError::Closed) => break Ok(()),
            }
        }
    };

    client.dispose().await;
    outcome
}

/// 이벤트를 출력할 한 줄로 변환합니다. 출력하지 않을 이벤트는 `None`.
///
/// JSON 모드에서는 시세 데이터만 원본 JSON으로 출력하고 상태 이벤트는 로그에 맡깁니다.
pub fn format_event(event: &StreamEvent, json: bool) -> Option<String> {
    if json {
        return match event {
            StreamEvent::KlineUpdate(message) => Some(message.raw().to_string()),
            StreamEvent::TradeUpdate(data) => serde_json::to_string(&**data).ok(),
            StreamEvent::Kline(value) | StreamEvent::Trade(value) | StreamEvent::Data(value) => {
                Some(value.to_string())
            }
            _ => None,
        };
    }

    let line = match event {
        StreamEvent::KlineUpdate(message) => {
            let interval = message.interval().unwrap_or("-");
            let token = message.token().unwrap_or("-");
            let Some(kline) = message.kline() else {
                return Some(format!("[kline {}] {} {}", interval, token, message.raw()));
            };
            match kline.to_candle() {
                Ok(candle) => {
                    let change = candle
                        .change_pct()
                        .map(|pct| {
                            let sign = if pct > Decimal::ZERO { "+" } else { "" };
                            format!(" ({}{}%)", sign, pct.round_dp(2))
                        })
                        .unwrap_or_default();
                    format!(
                        "[kline {}] {} {} O:{} H:{} L:{} C:{} V:{}{}",
                        interval,
                        token,
                        candle.open_time.format("%Y-%m-%d %H:%M:%S"),
                        candle.open,
                        candle.high,
                        candle.low,
                        candle.close,
                        candle.volume,
                        change
                    )
                }
                Err(e) => format!("[kline {}] {} 잘못된 캔들: {}", interval, token, e),
            }
        }
        StreamEvent::TradeUpdate(data) => {
            let trade = &data.data;
            format!(
                "[trade] {} {} {} @ {}",
                data.token_address.as_deref().unwrap_or("-"),
                trade.side.to_string().to_uppercase(),
                trade.quantity,
                trade.price
            )
        }
        StreamEvent::Kline(value) => format!("[kline] {}", value),
        StreamEvent::Trade(value) => format!("[trade] {}", value),
        StreamEvent::Data(value) => format!("[data] {}", value),
        StreamEvent::Connected => "연결됨".to_string(),
        StreamEvent::Ready { connection_id } => {
            format!("구독 준비 완료 (connectionId={})", connection_id)
        }
        StreamEvent::Subscribed(_) => "구독 확인".to_string(),
        StreamEvent::Disconnected {
            code,
            reason,
            intentional: false,
        } => format!(
            "연결 끊김 (code={}, reason={})",
            code.map(|c| c.to_string()).unwrap_or_else(|| "-".to_string()),
            reason
        ),
        StreamEvent::Reconnecting { attempt, delay } => {
            format!("재연결 대기 #{} ({}ms)", attempt, delay.as_millis())
        }
        StreamEvent::ReconnectFailed { attempts } => {
            format!("재연결 실패: {}회 시도", attempts)
        }
        StreamEvent::PongTimeout => "pong 응답 없음, 연결 재시작".to_string(),
        StreamEvent::ServerError(error) => format!(
            "서버 에러 [{}]: {}",
            error.code.as_deref().unwrap_or("-"),
            error.message
        ),
        StreamEvent::Error(error) => format!("에러: {}", error),
        _ => return None,
    };
    Some(line)
}
