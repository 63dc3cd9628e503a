//! 工具清单
//!
//! 搜索原语以两个别名暴露，另有 `finalize_answer` 终结工具

use super::types::{JsonSchema, PropertySchema, ToolDefinition};
use crate::models::openai::Tool;

/// 搜索工具主名称
pub const WEB_SEARCH_TOOL: &str = "web_search";
/// 搜索工具别名
pub const SEARCH_TOOL_ALIAS: &str = "search";
/// 终结工具名称
pub const FINALIZE_ANSWER_TOOL: &str = "finalize_answer";

/// 搜索结果数量默认值与上下限
pub const DEFAULT_NUM_RESULTS: u32 = 5;
pub const MIN_NUM_RESULTS: u32 = 1;
pub const MAX_NUM_RESULTS: u32 = 10;

fn search_parameters() -> JsonSchema {
    JsonSchema::new()
        .add_property(
            "query",
            PropertySchema::string("The search query. Be specific; include names, dates and key terms."),
            true,
        )
        .add_property(
            "num_results",
            PropertySchema::integer("How many results to return (default 5).")
                .with_range(MIN_NUM_RESULTS as i64, MAX_NUM_RESULTS as i64),
            false,
        )
}

/// 搜索工具定义
pub fn web_search_definition() -> ToolDefinition {
    ToolDefinition::new(
        WEB_SEARCH_TOOL,
        "Search the web for up-to-date information. Returns results with title, url, author, publishedDate, snippet and highlights.",
    )
    .with_parameters(search_parameters())
}

/// 搜索工具别名定义
pub fn search_alias_definition() -> ToolDefinition {
    ToolDefinition::new(
        SEARCH_TOOL_ALIAS,
        "Alias of web_search. Search the web for up-to-date information.",
    )
    .with_parameters(search_parameters())
}

/// 终结工具定义
pub fn finalize_answer_definition() -> ToolDefinition {
    ToolDefinition::new(
        FINALIZE_ANSWER_TOOL,
        "Submit the final answer to the user. Call this once you have enough evidence; no further tools will run afterwards.",
    )
    .with_parameters(
        JsonSchema::new()
            .add_property(
                "answer_markdown",
                PropertySchema::string("The complete answer in Markdown."),
                true,
            )
            .add_property(
                "used_evidence_ids",
                PropertySchema::string_array("Identifiers of the evidence the answer relies on."),
                false,
            )
            .add_property(
                "open_questions",
                PropertySchema::string_array("Questions that remain unresolved."),
                false,
            ),
    )
}

/// 全部工具定义
pub fn all_definitions() -> Vec<ToolDefinition> {
    vec![
        web_search_definition(),
        search_alias_definition(),
        finalize_answer_definition(),
    ]
}

/// 请求中使用的工具清单（OpenAI 格式）
pub fn search_tool_manifest() -> Vec<Tool> {
    all_definitions().iter().map(|d| d.to_api_format()).collect()
}
