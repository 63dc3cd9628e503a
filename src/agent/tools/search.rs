//! 搜索工具
//!
//! 定义外部搜索客户端接口、搜索参数以及结果映射

use super::manifest::{DEFAULT_NUM_RESULTS, MAX_NUM_RESULTS, MIN_NUM_RESULTS};
use crate::config::SearchConfig;
use crate::error::AgentError;
use crate::logger::sanitize_log_message;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

/// 摘要截断字符数
pub const SNIPPET_CHAR_BUDGET: usize = 400;
/// 截断标记
const ELLIPSIS: &str = "…";

/// 外部搜索客户端
#[async_trait]
pub trait SearchClient: Send + Sync {
    async fn search(
        &self,
        query: &str,
        num_results: u32,
        include_highlights: bool,
    ) -> Result<SearchResponse, AgentError>;
}

/// 搜索响应
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchResponse {
    #[serde(default)]
    pub results: Vec<SearchResultItem>,
}

/// 单条原始搜索结果
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResultItem {
    pub url: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub published_date: Option<String>,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub highlights: Option<Vec<String>>,
    #[serde(default)]
    pub summary: Option<String>,
}

/// web_search 参数
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
pub struct SearchArgs {
    #[serde(default)]
    pub query: Option<String>,
    /// 模型可能给出 5、5.0 或 "5"，统一在取值时处理
    #[serde(default)]
    pub num_results: Option<Value>,
}

impl SearchArgs {
    /// 去除首尾空白后的查询，空串视为缺失
    pub fn query(&self) -> Option<&str> {
        self.query.as_deref().map(str::trim).filter(|q| !q.is_empty())
    }

    /// 结果数量，限制在 [1, 10]；缺省或无法识别时为 5
    pub fn num_results(&self) -> u32 {
        let requested = match &self.num_results {
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            _ => None,
        };
        match requested.filter(|n| n.is_finite()) {
            Some(n) => n
                .round()
                .clamp(MIN_NUM_RESULTS as f64, MAX_NUM_RESULTS as f64) as u32,
            None => DEFAULT_NUM_RESULTS,
        }
    }

    /// 用于去重的规范化查询
    pub fn normalized_query(&self) -> Option<String> {
        self.query().map(|q| q.to_lowercase())
    }
}

/// 回传给模型的搜索结果
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SearchHit {
    pub title: Option<String>,
    pub url: String,
    pub author: Option<String>,
    #[serde(rename = "publishedDate")]
    pub published_date: Option<String>,
    pub snippet: String,
    pub highlights: Vec<String>,
}

impl From<SearchResultItem> for SearchHit {
    fn from(item: SearchResultItem) -> Self {
        let highlights = item.highlights.unwrap_or_default();
        let source = highlights
            .first()
            .map(String::as_str)
            .filter(|s| !s.trim().is_empty())
            .or_else(|| item.summary.as_deref().filter(|s| !s.trim().is_empty()))
            .or_else(|| item.text.as_deref().filter(|s| !s.trim().is_empty()))
            .unwrap_or("");

        Self {
            snippet: truncate_snippet(source.trim(), SNIPPET_CHAR_BUDGET),
            title: item.title,
            url: item.url,
            author: item.author,
            published_date: item.published_date,
            highlights,
        }
    }
}

/// 按字符截断，截断时追加省略号
pub fn truncate_snippet(text: &str, budget: usize) -> String {
    if text.chars().count() <= budget {
        return text.to_string();
    }
    let mut truncated: String = text.chars().take(budget).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// 映射搜索响应
pub fn map_results(response: SearchResponse) -> Vec<SearchHit> {
    response.results.into_iter().map(SearchHit::from).collect()
}

/// HTTP 搜索客户端
///
/// 兼容 Exa 风格的 `/search` 接口
pub struct HttpSearchClient {
    client: Client,
    base_url: String,
    api_key: String,
}

impl HttpSearchClient {
    pub fn new(config: &SearchConfig) -> Result<Self, AgentError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .ok_or_else(|| AgentError::Config("未配置搜索 API Key".to_string()))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| AgentError::Config(format!("创建搜索客户端失败: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn build_body(query: &str, num_results: u32, include_highlights: bool) -> Value {
        let mut contents = serde_json::json!({
            "text": { "maxCharacters": 2000 },
            "summary": true,
        });
        if include_highlights {
            contents["highlights"] = serde_json::json!({
                "numSentences": 3,
                "highlightsPerUrl": 2,
            });
        }
        serde_json::json!({
            "query": query,
            "numResults": num_results,
            "contents": contents,
        })
    }
}

#[async_trait]
impl SearchClient for HttpSearchClient {
    async fn search(
        &self,
        query: &str,
        num_results: u32,
        include_highlights: bool,
    ) -> Result<SearchResponse, AgentError> {
        let url = format!("{}/search", self.base_url);
        debug!(
            "[HttpSearchClient] 发送搜索请求: query={} num_results={}",
            query, num_results
        );

        let response = self
            .client
            .post(&url)
            .header("x-api-key", &self.api_key)
            .json(&Self::build_body(query, num_results, include_highlights))
            .send()
            .await
            .map_err(|e| AgentError::Search(format!("请求失败: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = sanitize_log_message(&response.text().await.unwrap_or_default());
            error!("[HttpSearchClient] 搜索失败: {} - {}", status, body);
            return Err(AgentError::Search(format!("HTTP {}: {}", status.as_u16(), body)));
        }

        response
            .json::<SearchResponse>()
            .await
            .map_err(|e| AgentError::Search(format!("解析搜索响应失败: {}", e)))
    }
}
