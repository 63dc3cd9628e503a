//! searchcast
//!
//! 云端推理编排引擎：流式 Chat Completions 解析、工具调用累加、
//! 搜索与 finalize_answer 工具执行，以及有界、可取消的工具调用循环

pub mod agent;
pub mod config;
pub mod error;
pub mod logger;
pub mod models;
pub mod resilience;

pub use agent::{AgentOrchestrator, GenerationProgress, ToolEnablement, TurnOutcome};
pub use config::Config;
pub use error::AgentError;
