//! 런치패드 코어 에러 타입.
//!
//! 도메인 타입 파싱, 설정 로드, 직렬화 과정에서 발생하는 에러를 정의합니다.

use thiserror::Error;

/// 코어 에러.
#[derive(Debug, Error)]
pub enum LaunchpadError {
    /// 설정 에러
    #[error("설정 에러: {0}")]
    Config(String),

    /// 잘못된 입력
    #[error("잘못된 입력: {0}")]
    InvalidInput(String),

    /// 데이터 파싱 에러
    #[error("파싱 에러: {0}")]
    Parse(String),

    /// 직렬화 에러
    #[error("직렬화 에러: {0}")]
    Serialization(String),

    /// 파일 입출력 에러
    #[error("입출력 에러: {0}")]
    Io(#[from] std::io::Error),
}

/// 코어 작업을 위한 Result 타입.
pub type LaunchpadResult<T> = Result<T, LaunchpadError>;

impl LaunchpadError {
    /// 사용자 입력 문제로 인한 에러인지 확인합니다.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            LaunchpadError::InvalidInput(_) | LaunchpadError::Parse(_)
        )
    }
}

impl From<serde_json::Error> for LaunchpadError {
    fn from(err: serde_json::Error) -> Self {
        LaunchpadError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for LaunchpadError {
    fn from(err: config::ConfigError) -> Self {
        LaunchpadError::Config(err.to_string())
    }
}

impl From<rust_decimal::Error> for LaunchpadError {
    fn from(err: rust_decimal::Error) -> Self {
        LaunchpadError::Parse(err.to_string())
    }
}
