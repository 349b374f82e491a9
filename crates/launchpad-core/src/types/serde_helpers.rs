//! Serde 역직렬화를 위한 공통 헬퍼 함수.
//!
//! 서버는 같은 필드를 숫자 또는 문자열로 보내는 경우가 있습니다.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// 문자열 또는 숫자를 문자열로 역직렬화.
///
/// ```ignore
/// #[derive(Deserialize)]
/// struct Trade {
///     #[serde(deserialize_with = "deserialize_string_or_number")]
///     trade_id: String,
/// }
///
/// // 다음 모두 작동:
/// // { "trade_id": "42" }
/// // { "trade_id": 42 }
/// ```
pub fn deserialize_string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(D::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}

/// `Option` 버전. `null`이나 누락된 필드는 `None`이 됩니다.
pub fn deserialize_opt_string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<Value>::deserialize(deserializer)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s)),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(other) => Err(D::Error::custom(format!(
            "expected string or number, got {}",
            other
        ))),
    }
}
