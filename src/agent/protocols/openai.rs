//! OpenAI 协议实现
//!
//! 实现 OpenAI Chat Completions API 协议的请求构建与 HTTP 后端
//! 适用于 OpenAI 及兼容服务

use super::{InferenceBackend, LineStream};
use crate::agent::types::AgentMessage;
use crate::config::ProviderConfig;
use crate::error::AgentError;
use crate::logger::sanitize_log_message;
use crate::models::openai::{
    ChatCompletionRequest, ChatMessage, FunctionCall, ModelList, Tool, ToolCall as WireToolCall,
};
use crate::resilience::{TimeoutConfig, TimeoutController};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::Client;
use tracing::{debug, error, info};

const CHAT_COMPLETIONS_ENDPOINT: &str = "/v1/chat/completions";
const MODELS_ENDPOINT: &str = "/v1/models";

/// 生成参数
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl From<&ProviderConfig> for GenerationParams {
    fn from(config: &ProviderConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// OpenAI 协议处理器
pub struct OpenAIProtocol;

impl OpenAIProtocol {
    /// 将 AgentMessage 转换为 OpenAI ChatMessage
    fn convert_to_chat_message(msg: &AgentMessage) -> ChatMessage {
        ChatMessage {
            role: msg.role.as_str().to_string(),
            content: msg.content.clone(),
            tool_calls: msg.tool_calls.as_ref().map(|calls| {
                calls
                    .iter()
                    .map(|tc| WireToolCall {
                        id: tc.id.clone(),
                        call_type: "function".to_string(),
                        function: FunctionCall {
                            name: tc.name.clone(),
                            arguments: tc.arguments.clone(),
                        },
                    })
                    .collect()
            }),
            tool_call_id: msg.tool_call_id.clone(),
        }
    }

    /// 构建消息列表：系统提示词在前，随后是完整消息日志
    pub fn build_messages(system_prompt: Option<&str>, history: &[AgentMessage]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(history.len() + 1);

        if let Some(prompt) = system_prompt.filter(|p| !p.is_empty()) {
            messages.push(Self::convert_to_chat_message(&AgentMessage::system(prompt)));
        }

        for msg in history {
            messages.push(Self::convert_to_chat_message(msg));
        }

        messages
    }

    /// 构建流式请求
    ///
    /// 仅当提供非空工具清单时才写入 `tools` 与 `tool_choice: "auto"`
    pub fn build_request(
        system_prompt: Option<&str>,
        history: &[AgentMessage],
        params: &GenerationParams,
        tools: Option<Vec<Tool>>,
    ) -> ChatCompletionRequest {
        let tools = tools.filter(|t| !t.is_empty());
        let tool_choice = tools.as_ref().map(|_| serde_json::json!("auto"));

        ChatCompletionRequest {
            model: params.model.clone(),
            messages: Self::build_messages(system_prompt, history),
            temperature: Some(params.temperature),
            max_tokens: Some(params.max_tokens),
            stream: true,
            tools,
            tool_choice,
        }
    }
}

/// 将字节流切分为行
///
/// 按完整行解码 UTF-8，多字节字符不会被 chunk 边界截断；
/// 末尾不带换行的残余内容作为最后一行输出
pub fn lines_from_bytes<S, E>(body: S) -> LineStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: std::fmt::Display + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut buffer: Vec<u8> = Vec::new();
        futures::pin_mut!(body);

        while let Some(chunk) = body.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    yield Err(AgentError::Stream(e.to_string()));
                    return;
                }
            };
            buffer.extend_from_slice(&bytes);

            while let Some(pos) = buffer.iter().position(|b| *b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                yield Ok(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
            }
        }

        if !buffer.is_empty() {
            yield Ok(String::from_utf8_lossy(&buffer).into_owned());
        }
    })
}

/// OpenAI 兼容 HTTP 后端
pub struct OpenAIBackend {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    timeouts: TimeoutController,
}

impl OpenAIBackend {
    /// 流式请求不设固定超时
    pub fn new(config: &ProviderConfig, timeouts: &TimeoutConfig) -> Result<Self, AgentError> {
        let client = Client::builder()
            .build()
            .map_err(|e| AgentError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            timeouts: TimeoutController::new(timeouts.clone()),
        })
    }

    fn url(&self, endpoint: &str) -> String {
        format!("{}{}", self.base_url, endpoint)
    }

    fn authorize(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.header("Authorization", format!("Bearer {}", key)),
            None => builder,
        }
    }

    /// 非 2xx 响应转换为 Http 错误，body 已脱敏
    async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, AgentError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = sanitize_log_message(&response.text().await.unwrap_or_default());
        error!("[OpenAIProtocol] 请求失败: {} - {}", status, body);
        Err(AgentError::Http {
            status: status.as_u16(),
            body,
        })
    }

    /// 获取可用模型列表，受辅助请求超时约束
    pub async fn list_models(&self) -> Result<Vec<String>, AgentError> {
        let url = self.url(MODELS_ENDPOINT);
        debug!("[OpenAIProtocol] 获取模型列表: {}", url);

        let request = self.authorize(self.client.get(&url)).send();
        let response = self
            .timeouts
            .execute_with_timeout(request)
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?
            .map_err(AgentError::from)?;

        let response = Self::check_status(response).await?;
        let models: ModelList = self
            .timeouts
            .execute_with_timeout(response.json::<ModelList>())
            .await
            .map_err(|e| AgentError::Transport(e.to_string()))?
            .map_err(|e| AgentError::Provider(format!("解析模型列表失败: {}", e)))?;

        Ok(models.data.into_iter().map(|m| m.id).collect())
    }
}

#[async_trait]
impl InferenceBackend for OpenAIBackend {
    async fn stream_chat(&self, request: &ChatCompletionRequest) -> Result<LineStream, AgentError> {
        info!(
            "[OpenAIProtocol] 发送流式请求: model={}, messages={}, tools_count={}",
            request.model,
            request.messages.len(),
            request.tools.as_ref().map(|t| t.len()).unwrap_or(0)
        );

        let response = self
            .authorize(self.client.post(self.url(CHAT_COMPLETIONS_ENDPOINT)))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| AgentError::Transport(format!("请求失败: {}", e)))?;

        let response = Self::check_status(response).await?;
        Ok(lines_from_bytes(response.bytes_stream()))
    }
}
