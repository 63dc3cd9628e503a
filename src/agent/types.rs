//! Agent 类型定义
//!
//! 定义消息、工具调用、流事件等回合内共享的核心类型

use serde::{Deserialize, Serialize};

/// 消息角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    /// 协议中使用的角色字符串
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::Tool => "tool",
        }
    }
}

/// Agent 消息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentMessage {
    /// 角色
    pub role: Role,
    /// 文本内容
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// 工具调用（assistant 消息可能包含）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// 工具调用 ID（tool 角色消息需要）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
}

impl AgentMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self::text(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::text(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::text(Role::Assistant, content)
    }

    /// 携带工具调用的 assistant 消息，空文本不写入 content
    pub fn assistant_tool_calls(content: &str, tool_calls: Vec<ToolCall>) -> Self {
        Self {
            role: Role::Assistant,
            content: if content.is_empty() {
                None
            } else {
                Some(content.to_string())
            },
            tool_calls: Some(tool_calls),
            tool_call_id: None,
        }
    }

    /// 工具结果消息
    pub fn tool(tool_call_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            role: Role::Tool,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: Some(tool_call_id.into()),
        }
    }

    fn text(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(content.into()),
            tool_calls: None,
            tool_call_id: None,
        }
    }
}

/// 完整的工具调用
///
/// 由 `ToolCallAccumulator` 构建，构建后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    /// 工具调用 ID
    pub id: String,
    /// 工具名称
    pub name: String,
    /// 参数（JSON 字符串，原样拼接）
    pub arguments: String,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments: arguments.into(),
        }
    }
}

/// 工具调用增量
///
/// 流式响应中某个 index 上的一个片段
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCallDelta {
    /// 流内索引，缺省视为 0
    pub index: Option<u32>,
    pub id: Option<String>,
    pub call_type: Option<String>,
    pub name: Option<String>,
    pub arguments: Option<String>,
}

/// Token 使用量
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TokenUsage {
    /// 输入 token 数
    pub input_tokens: u32,
    /// 输出 token 数
    pub output_tokens: u32,
}

impl TokenUsage {
    pub fn new(input_tokens: u32, output_tokens: u32) -> Self {
        Self {
            input_tokens,
            output_tokens,
        }
    }

    /// 计算总 token 数
    pub fn total(&self) -> u32 {
        self.input_tokens + self.output_tokens
    }

    /// 累加另一次迭代的用量
    pub fn accumulate(&mut self, other: &TokenUsage) {
        self.input_tokens = self.input_tokens.saturating_add(other.input_tokens);
        self.output_tokens = self.output_tokens.saturating_add(other.output_tokens);
    }
}

/// 流式响应事件
///
/// 由 `OpenAISSEParser` 从单行响应中解析得到
#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// 文本增量
    TextDelta(String),
    /// 工具调用增量
    ToolCallDelta(ToolCallDelta),
    /// Token 用量
    Usage(TokenUsage),
    /// Provider 在流中返回的错误
    Error(String),
    /// 流结束哨兵
    Done,
}

/// 回合阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    #[default]
    Idle,
    Requesting,
    Streaming,
    ToolDispatch,
    Finalizing,
    Done,
    Cancelled,
    Failed,
}

impl TurnPhase {
    /// 是否为终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled | Self::Failed)
    }
}

/// 回合内的消息日志
///
/// 只允许追加，已写入的消息不可修改或删除
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<AgentMessage>,
}

impl MessageLog {
    /// 以会话历史作为初始日志
    pub fn from_history(history: &[AgentMessage]) -> Self {
        Self {
            messages: history.to_vec(),
        }
    }

    pub fn push(&mut self, message: AgentMessage) {
        self.messages.push(message);
    }

    pub fn as_slice(&self) -> &[AgentMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 从 `start` 起追加的消息
    pub fn appended_since(&self, start: usize) -> Vec<AgentMessage> {
        self.messages.get(start..).map(<[_]>::to_vec).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assistant_tool_calls_omits_empty_content() {
        let msg = AgentMessage::assistant_tool_calls("", vec![ToolCall::new("c1", "web_search", "{}")]);
        assert!(msg.content.is_none());
        assert_eq!(msg.tool_calls.as_ref().map(|c| c.len()), Some(1));

        let msg = AgentMessage::assistant_tool_calls("thinking", vec![]);
        assert_eq!(msg.content.as_deref(), Some("thinking"));
    }

    #[test]
    fn test_tool_message() {
        let msg = AgentMessage::tool("call_1", r#"{"ok":true}"#);
        assert_eq!(msg.role, Role::Tool);
        assert_eq!(msg.tool_call_id.as_deref(), Some("call_1"));
    }

    #[test]
    fn test_message_log_appended_since() {
        let history = vec![AgentMessage::user("hi")];
        let mut log = MessageLog::from_history(&history);
        log.push(AgentMessage::assistant("hello"));
        log.push(AgentMessage::user("more"));

        assert_eq!(log.len(), 3);
        let appended = log.appended_since(history.len());
        assert_eq!(appended.len(), 2);
        assert_eq!(appended[0].content.as_deref(), Some("hello"));
        assert!(log.appended_since(10).is_empty());
    }

    #[test]
    fn test_token_usage_accumulate() {
        let mut usage = TokenUsage::new(10, 5);
        usage.accumulate(&TokenUsage::new(3, 2));
        assert_eq!(usage, TokenUsage::new(13, 7));
        assert_eq!(usage.total(), 20);
    }

    #[test]
    fn test_terminal_phases() {
        assert!(TurnPhase::Done.is_terminal());
        assert!(TurnPhase::Cancelled.is_terminal());
        assert!(TurnPhase::Failed.is_terminal());
        assert!(!TurnPhase::Streaming.is_terminal());
    }
}
