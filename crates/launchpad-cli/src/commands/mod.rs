//! CLI 명령어 구현 모듈.

pub mod check_config;
pub mod watch;
