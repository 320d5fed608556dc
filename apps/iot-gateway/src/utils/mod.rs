//! 响应构造与输入校验辅助

pub mod response;
pub mod validation;

pub use validation::{normalize_optional, normalize_required};
