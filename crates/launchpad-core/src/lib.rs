//! # Launchpad Core
//!
//! 런치패드 실시간 시세 스트림의 핵심 도메인 타입을 제공합니다.
//!
//! 이 크레이트는 스트림 클라이언트와 CLI가 함께 사용하는 기본 요소를 제공합니다:
//! - 채널 및 정규화된 구독 키
//! - 캔들/체결 페이로드와 소수점 캔들 변환
//! - 설정 관리
//! - 로깅 인프라

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::*;
pub use error::*;
pub use logging::*;
pub use types::*;
