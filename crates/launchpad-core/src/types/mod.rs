//! 스트림 클라이언트 전반에서 사용되는 공통 타입.

mod channel;
mod market;
pub mod serde_helpers;
mod subscription;

pub use channel::*;
pub use market::*;
pub use subscription::*;
