//! Agent 错误类型
//!
//! 定义一次生成回合中可能发生的错误

use thiserror::Error;

/// Agent 错误
///
/// 所有变体只持有自有数据，便于克隆到回合结果中
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AgentError {
    /// 上游返回非 2xx 状态码
    #[error("API 错误 ({status}): {body}")]
    Http { status: u16, body: String },

    /// 连接或发送失败
    #[error("请求失败: {0}")]
    Transport(String),

    /// 流读取失败
    #[error("流读取错误: {0}")]
    Stream(String),

    /// Provider 在响应中返回了错误对象
    #[error("Provider 返回错误: {0}")]
    Provider(String),

    /// 当前会话已有正在进行的生成
    #[error("当前会话已有生成任务在运行")]
    Busy,

    /// 搜索调用失败
    #[error("搜索失败: {0}")]
    Search(String),

    /// 配置错误
    #[error("配置错误: {0}")]
    Config(String),

    /// 内部错误
    #[error("内部错误: {0}")]
    Internal(String),
}

impl AgentError {
    /// 获取对应的 HTTP 状态码
    pub fn status_code(&self) -> u16 {
        match self {
            AgentError::Http { status, .. } => *status,
            AgentError::Transport(_) => 502,
            AgentError::Stream(_) => 502,
            AgentError::Provider(_) => 502,
            AgentError::Busy => 409,
            AgentError::Search(_) => 502,
            AgentError::Config(_) => 500,
            AgentError::Internal(_) => 500,
        }
    }

    /// 是否为上游返回的 HTTP 错误
    pub fn is_http(&self) -> bool {
        matches!(self, AgentError::Http { .. })
    }
}

impl From<reqwest::Error> for AgentError {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return AgentError::Http {
                status: status.as_u16(),
                body: e.to_string(),
            };
        }
        AgentError::Transport(e.to_string())
    }
}
