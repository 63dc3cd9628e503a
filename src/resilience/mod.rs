//! 容错机制模块
//!
//! 提供超时控制和协作式取消

mod timeout;

pub use timeout::{CancellationToken, TimeoutConfig, TimeoutController, TimeoutError};
