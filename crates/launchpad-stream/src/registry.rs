//! 참조 카운트 기반 구독 레지스트리.
//!
//! 여러 소비자가 같은 구독을 공유할 수 있도록 정규화된 [`SubscriptionKey`]마다
//! 참조 카운트를 유지합니다. 첫 번째 구독만 서버로 전송되고, 마지막 해제만
//! 서버에 구독 해제를 요청합니다. 토큰별 채널 집합은 남아 있는 키들의 합집합으로
//! 계산되므로 별도의 맵을 동기화할 필요가 없습니다.

use std::collections::{BTreeMap, BTreeSet};

use launchpad_core::{Channel, SubscriptionKey, SubscriptionRequest};

#[derive(Debug, Clone, Copy)]
struct Entry {
    ref_count: usize,
    real_time_only: bool,
}

/// 구독 등록 결과.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Acquired {
    /// 새 키 (서버로 subscribe 전송 필요)
    New,
    /// 기존 키 공유 (카운트만 증가)
    Shared { ref_count: usize },
}

/// 구독 해제 결과.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Released {
    /// 등록되지 않은 키
    NotRegistered,
    /// 카운트만 감소
    Decremented { ref_count: usize },
    /// 키 제거. `channels`는 해당 토큰에서 더 이상 사용되지 않는 채널입니다.
    Removed { channels: Vec<Channel> },
}

/// 재연결 후 복원할 구독 그룹.
///
/// 같은 채널/인터벌/옵션 조합을 가진 토큰들을 묶습니다.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreGroup {
    pub channels: Vec<Channel>,
    pub intervals: Vec<String>,
    pub real_time_only: bool,
    pub tokens: Vec<String>,
}

/// 구독 레지스트리.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: BTreeMap<SubscriptionKey, Entry>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 구독을 등록하고 참조 카운트를 증가시킵니다.
    pub fn acquire(&mut self, request: &SubscriptionRequest) -> Acquired {
        let key = request.key();
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.ref_count += 1;
                Acquired::Shared {
                    ref_count: entry.ref_count,
                }
            }
            None => {
                self.entries.insert(
                    key,
                    Entry {
                        ref_count: 1,
                        real_time_only: request.real_time_only,
                    },
                );
                Acquired::New
            }
        }
    }

    /// 참조 카운트를 감소시키고, 0이 되면 키를 제거합니다.
    pub fn release(&mut self, key: &SubscriptionKey) -> Released {
        let Some(entry) = self.entries.get_mut(key) else {
            return Released::NotRegistered;
        };

        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return Released::Decremented {
                ref_count: entry.ref_count,
            };
        }

        self.entries.remove(key);
        let remaining = self.channels_for(key.token());
        let channels = key
            .channels()
            .iter()
            .filter(|channel| !remaining.contains(channel))
            .copied()
            .collect();
        Released::Removed { channels }
    }

    /// 모든 구독을 무조건 제거하고, 토큰별 채널 합집합을 반환합니다.
    pub fn clear(&mut self) -> Vec<(String, Vec<Channel>)> {
        let tokens = self.token_channels();
        self.entries.clear();
        tokens
    }

    /// 키의 참조 카운트 (등록되지 않았으면 0).
    pub fn ref_count(&self, key: &SubscriptionKey) -> usize {
        self.entries.get(key).map_or(0, |entry| entry.ref_count)
    }

    /// 토큰에 활성화된 채널 합집합.
    pub fn channels_for(&self, token: &str) -> Vec<Channel> {
        self.entries
            .keys()
            .filter(|key| key.token() == token)
            .flat_map(|key| key.channels().iter().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// 토큰별 채널 합집합 (토큰 순 정렬).
    pub fn token_channels(&self) -> Vec<(String, Vec<Channel>)> {
        let mut map: BTreeMap<&str, BTreeSet<Channel>> = BTreeMap::new();
        for key in self.entries.keys() {
            map.entry(key.token())
                .or_default()
                .extend(key.channels().iter().copied());
        }
        map.into_iter()
            .map(|(token, channels)| (token.to_string(), channels.into_iter().collect()))
            .collect()
    }

    /// 재연결 후 다시 보낼 구독 목록.
    ///
    /// 토큰마다 채널/인터벌 합집합을 계산한 뒤, 같은 조합을 가진 토큰끼리
    /// 묶습니다. 참조 카운트는 변경하지 않습니다.
    pub fn restore_plan(&self) -> Vec<RestoreGroup> {
        type Signature = (Vec<Channel>, Vec<String>, bool);

        let mut per_token: BTreeMap<&str, (BTreeSet<Channel>, BTreeSet<String>, bool)> =
            BTreeMap::new();
        for (key, entry) in &self.entries {
            let slot = per_token.entry(key.token()).or_default();
            slot.0.extend(key.channels().iter().copied());
            slot.1.extend(key.intervals().iter().cloned());
            slot.2 |= entry.real_time_only;
        }

        let mut groups: BTreeMap<Signature, Vec<String>> = BTreeMap::new();
        for (token, (channels, intervals, real_time_only)) in per_token {
            let signature = (
                channels.into_iter().collect(),
                intervals.into_iter().collect(),
                real_time_only,
            );
            groups.entry(signature).or_default().push(token.to_string());
        }

        groups
            .into_iter()
            .map(|((channels, intervals, real_time_only), tokens)| RestoreGroup {
                channels,
                intervals,
                real_time_only,
                tokens,
            })
            .collect()
    }

    /// 등록된 키 수.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 등록된 키 목록.
    pub fn keys(&self) -> impl Iterator<Item = &SubscriptionKey> {
        self.entries.keys()
    }
}
