//! Handlers 模块

pub mod connections;
pub mod devices;
pub mod emqx;
pub mod metrics;
pub mod ota;

pub use connections::*;
pub use devices::*;
pub use emqx::*;
pub use metrics::*;
pub use ota::*;
