//! SSE 流解析器模块
//!
//! 提供逐行协议解析和工具调用片段累加

mod openai_sse;
mod tool_call_accumulator;

pub use openai_sse::OpenAISSEParser;
pub use tool_call_accumulator::ToolCallAccumulator;
