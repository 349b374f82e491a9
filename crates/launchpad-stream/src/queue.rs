//! 준비 전 송신 대기열.

use std::collections::VecDeque;

use crate::messages::OutboundMessage;

/// 연결이 준비되기 전에 요청된 구독 메시지를 보관하는 FIFO 큐.
///
/// ping 같은 비구독 메시지는 보관하지 않습니다.
#[derive(Debug, Default)]
pub struct OutboundQueue {
    items: VecDeque<OutboundMessage>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// 구독 메시지를 큐 끝에 추가합니다. 보관했으면 `true`.
    pub fn push(&mut self, message: OutboundMessage) -> bool {
        if !message.is_subscription() {
            return false;
        }
        self.items.push_back(message);
        true
    }

    /// 모든 메시지를 순서대로 꺼냅니다. 꺼낸 메시지는 다시 큐에 들어오지 않습니다.
    pub fn drain(&mut self) -> Vec<OutboundMessage> {
        self.items.drain(..).collect()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
