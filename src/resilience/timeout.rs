//! 超时与取消控制
//!
//! 辅助请求（如模型列表）使用固定超时；流式请求不设超时，
//! 由迭代预算和用户取消来约束

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

/// 默认辅助请求超时（毫秒）
const DEFAULT_AUXILIARY_TIMEOUT_MS: u64 = 30_000;

/// 超时配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct TimeoutConfig {
    /// 辅助请求超时（毫秒），0 表示无超时
    pub auxiliary_timeout_ms: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            auxiliary_timeout_ms: DEFAULT_AUXILIARY_TIMEOUT_MS,
        }
    }
}

impl TimeoutConfig {
    /// 获取辅助请求超时 Duration
    pub fn auxiliary_timeout(&self) -> Option<Duration> {
        if self.auxiliary_timeout_ms > 0 {
            Some(Duration::from_millis(self.auxiliary_timeout_ms))
        } else {
            None
        }
    }
}

/// 超时错误
#[derive(Debug, Clone, PartialEq)]
pub enum TimeoutError {
    /// 请求超时
    RequestTimeout { timeout_ms: u64, elapsed_ms: u64 },
}

impl std::fmt::Display for TimeoutError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TimeoutError::RequestTimeout {
                timeout_ms,
                elapsed_ms,
            } => {
                write!(
                    f,
                    "请求超时: 配置 {}ms, 已耗时 {}ms",
                    timeout_ms, elapsed_ms
                )
            }
        }
    }
}

impl std::error::Error for TimeoutError {}

/// 取消令牌
///
/// 协作式取消：生成循环每消费一行检查一次，等待响应时通过 `cancelled()` 唤醒
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancellationToken {
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// 取消操作
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// 检查是否已取消
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// 等待取消信号
    pub async fn cancelled(&self) {
        let notified = self.notify.notified();
        if self.is_cancelled() {
            return;
        }
        notified.await;
    }

    /// 重置取消状态
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }
}

/// 超时控制器
#[derive(Debug, Clone, Default)]
pub struct TimeoutController {
    config: TimeoutConfig,
}

impl TimeoutController {
    pub fn new(config: TimeoutConfig) -> Self {
        Self { config }
    }

    /// 按辅助请求超时执行异步操作
    pub async fn execute_with_timeout<F, T>(&self, operation: F) -> Result<T, TimeoutError>
    where
        F: Future<Output = T>,
    {
        let start = Instant::now();

        match self.config.auxiliary_timeout() {
            Some(timeout) => match tokio::time::timeout(timeout, operation).await {
                Ok(result) => Ok(result),
                Err(_) => Err(TimeoutError::RequestTimeout {
                    timeout_ms: self.config.auxiliary_timeout_ms,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                }),
            },
            None => Ok(operation.await),
        }
    }
}
