//! 工具执行器
//!
//! 工具名称在调用构建完成后只解析一次，得到封闭的 `ToolKind`，
//! 参数随后按各工具的强类型 Schema 解码。解码失败、未知工具、
//! 搜索失败都只产生错误结果，不会中断回合。

use super::finalize::FinalizeArgs;
use super::manifest::{FINALIZE_ANSWER_TOOL, SEARCH_TOOL_ALIAS, WEB_SEARCH_TOOL};
use super::search::{map_results, SearchArgs, SearchClient};
use super::types::ToolResult;
use crate::agent::types::ToolCall;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 工具种类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    Search,
    FinalizeAnswer,
    Unrecognized,
}

impl ToolKind {
    /// 根据工具名称解析
    pub fn resolve(name: &str) -> Self {
        match name {
            WEB_SEARCH_TOOL | SEARCH_TOOL_ALIAS => ToolKind::Search,
            FINALIZE_ANSWER_TOOL => ToolKind::FinalizeAnswer,
            _ => ToolKind::Unrecognized,
        }
    }
}

/// 解码后的工具调用
#[derive(Debug, Clone, PartialEq)]
pub enum ToolInvocation {
    Search(SearchArgs),
    FinalizeAnswer(FinalizeArgs),
    /// 已识别的工具，但参数无法解码
    Invalid { tool: String, reason: String },
    Unrecognized(String),
}

impl ToolInvocation {
    /// 解析工具种类并解码参数
    pub fn decode(call: &ToolCall) -> Self {
        match ToolKind::resolve(&call.name) {
            ToolKind::Search => match decode_args::<SearchArgs>(&call.arguments) {
                Ok(args) => ToolInvocation::Search(args),
                Err(reason) => ToolInvocation::Invalid {
                    tool: call.name.clone(),
                    reason,
                },
            },
            ToolKind::FinalizeAnswer => match decode_args::<FinalizeArgs>(&call.arguments) {
                Ok(args) => ToolInvocation::FinalizeAnswer(args),
                Err(reason) => ToolInvocation::Invalid {
                    tool: call.name.clone(),
                    reason,
                },
            },
            ToolKind::Unrecognized => ToolInvocation::Unrecognized(call.name.clone()),
        }
    }

    /// 可用于去重的规范化搜索查询
    pub fn search_query(&self) -> Option<String> {
        match self {
            ToolInvocation::Search(args) => args.normalized_query(),
            _ => None,
        }
    }
}

/// 空参数按 `{}` 处理
fn decode_args<T: DeserializeOwned>(arguments: &str) -> Result<T, String> {
    let raw = if arguments.trim().is_empty() {
        "{}"
    } else {
        arguments
    };
    serde_json::from_str(raw).map_err(|e| format!("invalid arguments: {}", e))
}

/// 工具执行器
pub struct ToolExecutor {
    search: Option<Arc<dyn SearchClient>>,
    include_highlights: bool,
}

impl ToolExecutor {
    pub fn new(search: Option<Arc<dyn SearchClient>>, include_highlights: bool) -> Self {
        Self {
            search,
            include_highlights,
        }
    }

    /// 是否配置了搜索客户端
    pub fn has_search(&self) -> bool {
        self.search.is_some()
    }

    /// 执行已解码的工具调用
    pub async fn execute_invocation(&self, call: &ToolCall, invocation: ToolInvocation) -> ToolResult {
        match invocation {
            ToolInvocation::Search(args) => self.run_search(call, &args).await,
            ToolInvocation::FinalizeAnswer(args) => match args.into_final_answer() {
                Ok(answer) => {
                    info!("[ToolExecutor] 收到最终答案: call_id={}", call.id);
                    ToolResult::finalized(&call.id, answer)
                }
                Err(reason) => {
                    warn!("[ToolExecutor] finalize_answer 参数无效: {}", reason);
                    ToolResult::error(&call.id, reason)
                }
            },
            ToolInvocation::Invalid { tool, reason } => {
                warn!("[ToolExecutor] 工具参数解码失败: tool={} {}", tool, reason);
                ToolResult::error(&call.id, reason)
            }
            ToolInvocation::Unrecognized(name) => {
                warn!("[ToolExecutor] 未知工具: {}", name);
                ToolResult::error(&call.id, format!("unsupported tool: {}", name))
            }
        }
    }

    async fn run_search(&self, call: &ToolCall, args: &SearchArgs) -> ToolResult {
        let Some(query) = args.query() else {
            return ToolResult::error(&call.id, "missing query");
        };
        let Some(client) = self.search.as_ref() else {
            warn!("[ToolExecutor] 未配置搜索客户端，忽略搜索: {}", query);
            return ToolResult::error(&call.id, "search unavailable");
        };

        let num_results = args.num_results();
        debug!(
            "[ToolExecutor] 执行搜索: query={} num_results={}",
            query, num_results
        );

        match client.search(query, num_results, self.include_highlights).await {
            Ok(response) => {
                let hits = map_results(response);
                info!("[ToolExecutor] 搜索完成: query={} hits={}", query, hits.len());
                match serde_json::to_value(&hits) {
                    Ok(content) => ToolResult::success(&call.id, &content),
                    Err(e) => ToolResult::error(&call.id, format!("search failed: {}", e)),
                }
            }
            Err(e) => {
                warn!("[ToolExecutor] 搜索失败: query={} error={}", query, e);
                ToolResult::error(&call.id, format!("search failed: {}", e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::tools::search::{SearchResponse, SearchResultItem};
    use crate::error::AgentError;
    use async_trait::async_trait;
    use tokio::sync::Mutex;

    struct RecordingSearch {
        calls: Mutex<Vec<(String, u32, bool)>>,
        fail: bool,
    }

    impl RecordingSearch {
        fn new(fail: bool) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                fail,
            }
        }
    }

    #[async_trait]
    impl SearchClient for RecordingSearch {
        async fn search(
            &self,
            query: &str,
            num_results: u32,
            include_highlights: bool,
        ) -> Result<SearchResponse, AgentError> {
            self.calls
                .lock()
                .await
                .push((query.to_string(), num_results, include_highlights));
            if self.fail {
                return Err(AgentError::Search("HTTP 500: boom".to_string()));
            }
            Ok(SearchResponse {
                results: vec![SearchResultItem {
                    url: "https://example.com".to_string(),
                    title: Some("Example".to_string()),
                    summary: Some("A summary".to_string()),
                    ..Default::default()
                }],
            })
        }
    }

    impl ToolExecutor {
        async fn execute(&self, call: &ToolCall) -> ToolResult {
            self.execute_invocation(call, ToolInvocation::decode(call)).await
        }
    }

    fn content_json(result: &ToolResult) -> serde_json::Value {
        serde_json::from_str(result.message.content.as_deref().unwrap()).unwrap()
    }

    #[test]
    fn test_resolve_aliases() {
        assert_eq!(ToolKind::resolve("web_search"), ToolKind::Search);
        assert_eq!(ToolKind::resolve("search"), ToolKind::Search);
        assert_eq!(ToolKind::resolve("finalize_answer"), ToolKind::FinalizeAnswer);
        assert_eq!(ToolKind::resolve("bash"), ToolKind::Unrecognized);
    }

    #[test]
    fn test_decode_invalid_json_is_invalid() {
        let call = ToolCall::new("c1", "web_search", "{\"query\": ");
        assert!(matches!(
            ToolInvocation::decode(&call),
            ToolInvocation::Invalid { .. }
        ));
    }

    #[test]
    fn test_decode_empty_arguments_as_empty_object() {
        let call = ToolCall::new("c1", "search", "");
        assert_eq!(
            ToolInvocation::decode(&call),
            ToolInvocation::Search(SearchArgs::default())
        );
    }

    #[test]
    fn test_search_query_normalized() {
        let call = ToolCall::new("c1", "web_search", r#"{"query":"  Tokio RUNTIME "}"#);
        assert_eq!(
            ToolInvocation::decode(&call).search_query().as_deref(),
            Some("tokio runtime")
        );
    }

    #[tokio::test]
    async fn test_empty_query_is_missing_query_error() {
        let search = Arc::new(RecordingSearch::new(false));
        let executor = ToolExecutor::new(Some(search.clone()), true);
        let result = executor
            .execute(&ToolCall::new("c1", "web_search", r#"{"query":""}"#))
            .await;
        assert_eq!(
            result.message.content.as_deref(),
            Some(r#"{"error":"missing query"}"#)
        );
        assert!(search.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_search_maps_results_and_clamps() {
        let search = Arc::new(RecordingSearch::new(false));
        let executor = ToolExecutor::new(Some(search.clone()), false);
        let result = executor
            .execute(&ToolCall::new(
                "c7",
                "search",
                r#"{"query":"rust","num_results":99}"#,
            ))
            .await;

        assert!(!result.is_error());
        assert_eq!(result.message.tool_call_id.as_deref(), Some("c7"));
        let json = content_json(&result);
        assert_eq!(json[0]["url"], "https://example.com");
        assert_eq!(json[0]["snippet"], "A summary");
        assert_eq!(
            search.calls.lock().await.as_slice(),
            &[("rust".to_string(), 10, false)]
        );
    }

    #[tokio::test]
    async fn test_search_accepts_float_num_results() {
        let search = Arc::new(RecordingSearch::new(false));
        let executor = ToolExecutor::new(Some(search.clone()), true);
        let result = executor
            .execute(&ToolCall::new(
                "c8",
                "web_search",
                r#"{"query":"rust","num_results":3.0}"#,
            ))
            .await;

        assert!(!result.is_error());
        assert_eq!(
            search.calls.lock().await.as_slice(),
            &[("rust".to_string(), 3, true)]
        );
    }

    #[tokio::test]
    async fn test_search_failure_is_non_fatal() {
        let executor = ToolExecutor::new(Some(Arc::new(RecordingSearch::new(true))), true);
        let result = executor
            .execute(&ToolCall::new("c1", "web_search", r#"{"query":"x"}"#))
            .await;
        assert!(result.is_error());
        assert!(result.final_answer.is_none());
    }

    #[tokio::test]
    async fn test_search_without_client() {
        let executor = ToolExecutor::new(None, true);
        let result = executor
            .execute(&ToolCall::new("c1", "web_search", r#"{"query":"x"}"#))
            .await;
        assert_eq!(content_json(&result)["error"], "search unavailable");
    }

    #[tokio::test]
    async fn test_unknown_tool() {
        let executor = ToolExecutor::new(None, true);
        let result = executor
            .execute(&ToolCall::new("c2", "read_file", "{}"))
            .await;
        assert_eq!(
            result.message.content.as_deref(),
            Some(r#"{"error":"unsupported tool: read_file"}"#)
        );
    }

    #[tokio::test]
    async fn test_finalize_answer() {
        let executor = ToolExecutor::new(None, true);
        let result = executor
            .execute(&ToolCall::new(
                "c3",
                "finalize_answer",
                r#"{"answer_markdown":"42","used_evidence_ids":["E1"]}"#,
            ))
            .await;
        let answer = result.final_answer.clone().unwrap();
        assert_eq!(answer.answer_markdown, "42");
        assert_eq!(answer.used_evidence_ids, vec!["E1"]);
        assert_eq!(content_json(&result)["finalized"], true);
    }

    #[tokio::test]
    async fn test_finalize_missing_answer_is_error() {
        let executor = ToolExecutor::new(None, true);
        let result = executor
            .execute(&ToolCall::new("c3", "finalize_answer", r#"{"open_questions":[]}"#))
            .await;
        assert!(result.is_error());
        assert!(result.final_answer.is_none());
    }
}
