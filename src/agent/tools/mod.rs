//! 工具系统模块
//!
//! - manifest - 工具清单（搜索别名与 finalize_answer）
//! - search - 搜索客户端接口与结果映射
//! - finalize - finalize_answer 参数
//! - executor - 工具分发与执行
//! - prompt - 提示词模板

pub mod executor;
pub mod finalize;
pub mod manifest;
pub mod prompt;
pub mod search;
pub mod types;

pub use executor::{ToolExecutor, ToolInvocation, ToolKind};
pub use finalize::FinalizeArgs;
pub use manifest::{search_tool_manifest, FINALIZE_ANSWER_TOOL, SEARCH_TOOL_ALIAS, WEB_SEARCH_TOOL};
pub use search::{HttpSearchClient, SearchArgs, SearchClient, SearchHit, SearchResponse, SearchResultItem};
pub use types::{FinalAnswer, ToolDefinition, ToolResult};
