//! 协议模块
//!
//! 推理后端接口与 OpenAI Chat Completions 协议实现

mod openai;

pub use openai::{lines_from_bytes, GenerationParams, OpenAIBackend, OpenAIProtocol};

use crate::error::AgentError;
use crate::models::openai::ChatCompletionRequest;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// 响应体的逐行流
pub type LineStream = BoxStream<'static, Result<String, AgentError>>;

/// 推理后端
///
/// 接收完整请求体，返回响应体的逐行流（流式或非流式响应均可）
#[async_trait]
pub trait InferenceBackend: Send + Sync {
    async fn stream_chat(&self, request: &ChatCompletionRequest) -> Result<LineStream, AgentError>;
}
