//! 텍스트 프레임 디코딩.
//!
//! 서버는 한 프레임에 여러 JSON 문서를 줄바꿈으로 잇거나 구분자 없이
//! 붙여서(`}{`) 보낼 수 있습니다. 복구 순서:
//!
//! 1. 프레임 전체를 하나의 문서로 파싱
//! 2. 줄 단위로 나눠 각 줄을 파싱 (실패한 줄은 경고만 기록)
//! 3. 그래도 복구된 문서가 없으면 `}{` 경계에서 나눠 중괄호를 복원한 뒤 파싱
//!
//! 모든 단계가 실패하면 원래 파싱 에러를 반환합니다.

use serde_json::Value;
use tracing::warn;

use crate::error::StreamError;

/// 프레임 디코딩 결과.
#[derive(Debug, Default)]
pub struct DecodedFrame {
    /// 복구된 문서 (프레임 내 순서 유지)
    pub messages: Vec<Value>,
    /// 파싱에 실패해 버려진 조각 수
    pub discarded: usize,
    /// 아무 문서도 복구하지 못한 경우의 원래 에러
    pub error: Option<StreamError>,
}

impl DecodedFrame {
    fn recovered(messages: Vec<Value>, discarded: usize) -> Self {
        Self {
            messages,
            discarded,
            error: None,
        }
    }
}

/// 텍스트 프레임을 JSON 문서 목록으로 디코딩합니다.
pub fn decode_frame(text: &str) -> DecodedFrame {
    let original = match serde_json::from_str::<Value>(text) {
        Ok(value) => return DecodedFrame::recovered(vec![value], 0),
        Err(e) => e,
    };

    let (messages, discarded) = parse_fragments(text.lines().map(str::to_owned));
    if !messages.is_empty() {
        return DecodedFrame::recovered(messages, discarded);
    }

    if text.contains("}{") {
        let (messages, discarded) = parse_fragments(split_concatenated(text));
        if !messages.is_empty() {
            return DecodedFrame::recovered(messages, discarded);
        }
    }

    DecodedFrame {
        messages: Vec::new(),
        discarded: 0,
        error: Some(StreamError::FrameParse(original.to_string())),
    }
}

fn parse_fragments(fragments: impl IntoIterator<Item = String>) -> (Vec<Value>, usize) {
    let mut messages = Vec::new();
    let mut discarded = 0;

    for fragment in fragments {
        let fragment = fragment.trim();
        if fragment.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(fragment) {
            Ok(value) => messages.push(value),
            Err(e) => {
                discarded += 1;
                warn!(error = %e, fragment = %truncate(fragment, 120), "Discarding unparseable fragment");
            }
        }
    }

    (messages, discarded)
}

/// `}{` 경계에서 나누고 잘려 나간 중괄호를 각 조각에 다시 붙입니다.
fn split_concatenated(text: &str) -> Vec<String> {
    let parts: Vec<&str> = text.split("}{").collect();
    let last = parts.len().saturating_sub(1);

    parts
        .iter()
        .enumerate()
        .map(|(i, part)| {
            let mut fragment = String::with_capacity(part.len() + 2);
            if i > 0 {
                fragment.push('{');
            }
            fragment.push_str(part);
            if i < last {
                fragment.push('}');
            }
            fragment
        })
        .collect()
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
