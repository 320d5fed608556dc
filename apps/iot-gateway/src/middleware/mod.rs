//! HTTP 中间件

mod context;

pub use context::request_context;
