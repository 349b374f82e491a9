//! 용도별 단일 타이머 관리.
//!
//! [`TimerSet`]은 [`TimerKind`]마다 최대 하나의 타이머만 유지합니다. 같은 종류를
//! 다시 설정하면 이전 타이머가 중단되고, `TimerSet`이 드롭되면 남은 타이머가
//! 모두 중단됩니다. 중단 직전에 이미 채널로 보내진 발화는 시퀀스 번호로 걸러냅니다.

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// 타이머 용도.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TimerKind {
    /// 다음 ping 전송
    Heartbeat,
    /// pong 응답 대기
    PongTimeout,
    /// 재연결 백오프
    Reconnect,
}

impl TimerKind {
    pub fn all() -> [TimerKind; 3] {
        [TimerKind::Heartbeat, TimerKind::PongTimeout, TimerKind::Reconnect]
    }
}

impl fmt::Display for TimerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimerKind::Heartbeat => "heartbeat",
            TimerKind::PongTimeout => "pong_timeout",
            TimerKind::Reconnect => "reconnect",
        };
        f.write_str(name)
    }
}

/// 타이머 발화 알림.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFired {
    pub kind: TimerKind,
    seq: u64,
}

struct Armed {
    seq: u64,
    handle: JoinHandle<()>,
}

/// 용도별 타이머 소유자.
pub struct TimerSet {
    armed: HashMap<TimerKind, Armed>,
    next_seq: u64,
    fired_tx: mpsc::UnboundedSender<TimerFired>,
}

impl TimerSet {
    pub fn new(fired_tx: mpsc::UnboundedSender<TimerFired>) -> Self {
        Self {
            armed: HashMap::new(),
            next_seq: 0,
            fired_tx,
        }
    }

    /// 타이머를 설정합니다. 같은 종류의 기존 타이머는 중단됩니다.
    pub fn arm(&mut self, kind: TimerKind, delay: Duration) {
        self.cancel(kind);

        self.next_seq += 1;
        let seq = self.next_seq;
        let tx = self.fired_tx.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TimerFired { kind, seq });
        });

        self.armed.insert(kind, Armed { seq, handle });
    }

    /// 타이머를 중단합니다.
    pub fn cancel(&mut self, kind: TimerKind) {
        if let Some(armed) = self.armed.remove(&kind) {
            armed.handle.abort();
        }
    }

    /// 모든 타이머를 중단합니다.
    pub fn cancel_all(&mut self) {
        for (_, armed) in self.armed.drain() {
            armed.handle.abort();
        }
    }

    /// 현재 설정된 타이머의 발화이면 `true`를 반환하고 등록을 해제합니다.
    pub fn accept(&mut self, fired: TimerFired) -> bool {
        match self.armed.get(&fired.kind) {
            Some(armed) if armed.seq == fired.seq => {
                self.armed.remove(&fired.kind);
                true
            }
            _ => false,
        }
    }

    pub fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.contains_key(&kind)
    }

    /// 설정된 타이머 수.
    pub fn len(&self) -> usize {
        self.armed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.armed.is_empty()
    }
}

impl Drop for TimerSet {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl fmt::Debug for TimerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds: Vec<TimerKind> = self.armed.keys().copied().collect();
        kinds.sort();
        f.debug_struct("TimerSet").field("armed", &kinds).finish()
    }
}
