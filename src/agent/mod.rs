//! AI Agent 编排模块
//!
//! 驱动流式 Chat Completions 协议的有界工具调用循环
//!
//! ## 架构设计
//! - protocols/ - 推理后端接口与 OpenAI 协议实现
//! - parsers/ - SSE 行解析与工具调用片段累加
//! - tools/ - 工具清单、搜索与 finalize_answer 执行
//! - orchestrator/ - 回合状态机
//! - budget - 迭代预算
//! - progress - 进度快照

pub mod budget;
pub mod orchestrator;
pub mod parsers;
pub mod progress;
pub mod protocols;
pub mod tools;
pub mod types;

pub use budget::AgentBudget;
pub use orchestrator::{AgentOrchestrator, ToolEnablement, TurnOutcome};
pub use parsers::{OpenAISSEParser, ToolCallAccumulator};
pub use progress::GenerationProgress;
pub use protocols::{GenerationParams, InferenceBackend, LineStream, OpenAIBackend, OpenAIProtocol};
pub use tools::{FinalAnswer, HttpSearchClient, SearchClient, ToolExecutor};
pub use types::*;
