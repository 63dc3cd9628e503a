//! OpenAI SSE 流解析器
//!
//! 把响应体中的单行文本解析为零个或多个 `StreamEvent`

use crate::agent::types::{StreamEvent, TokenUsage, ToolCallDelta};
use crate::models::openai::{
    error_message, ChatCompletionChunk, ChatCompletionResponse, ChunkToolCall, Usage,
};
use serde_json::Value;
use tracing::{debug, warn};

/// 数据行前缀
const DATA_PREFIX: &str = "data:";
/// 流结束哨兵
const DONE_SENTINEL: &str = "[DONE]";

/// OpenAI SSE 流解析器
///
/// 无法走结构化路径的行保存在回退缓冲中，流结束后若没有任何可用输出再尝试按非流式响应解析
#[derive(Debug, Default)]
pub struct OpenAISSEParser {
    /// 原始回退缓冲
    fallback: Vec<String>,
}

impl OpenAISSEParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// 解析一行响应
    pub fn parse_line(&mut self, line: &str) -> Vec<StreamEvent> {
        let line = line.trim_end_matches('\r');
        if line.trim().is_empty() {
            return Vec::new();
        }

        let Some(payload) = line.strip_prefix(DATA_PREFIX) else {
            self.fallback.push(line.to_string());
            return Vec::new();
        };
        let payload = payload.trim();

        if payload == DONE_SENTINEL {
            return vec![StreamEvent::Done];
        }

        let chunk: ChatCompletionChunk = match serde_json::from_str(payload) {
            Ok(chunk) => chunk,
            Err(e) => {
                warn!("[OpenAISSEParser] 解析 JSON 失败: {} - data: {}", e, payload);
                self.fallback.push(line.to_string());
                return Vec::new();
            }
        };

        Self::chunk_to_events(chunk)
    }

    fn chunk_to_events(chunk: ChatCompletionChunk) -> Vec<StreamEvent> {
        let mut events = Vec::new();

        if let Some(error) = &chunk.error {
            events.push(StreamEvent::Error(error_message(error)));
            return events;
        }

        for choice in chunk.choices {
            let Some(delta) = choice.delta else {
                continue;
            };

            if let Some(text) = delta.content.filter(|s| !s.is_empty()) {
                events.push(StreamEvent::TextDelta(text));
            }

            for tc in delta.tool_calls.unwrap_or_default() {
                events.push(StreamEvent::ToolCallDelta(Self::convert_tool_call(tc)));
            }
        }

        if let Some(usage) = chunk.usage.as_ref().and_then(Self::convert_usage) {
            events.push(StreamEvent::Usage(usage));
        }

        events
    }

    fn convert_tool_call(tc: ChunkToolCall) -> ToolCallDelta {
        let (name, arguments) = match tc.function {
            Some(f) => (f.name, f.arguments),
            None => (None, None),
        };
        ToolCallDelta {
            index: tc.index,
            id: tc.id,
            call_type: tc.call_type,
            name,
            arguments,
        }
    }

    fn convert_usage(usage: &Usage) -> Option<TokenUsage> {
        if usage.prompt_tokens > 0 || usage.completion_tokens > 0 {
            Some(TokenUsage::new(usage.prompt_tokens, usage.completion_tokens))
        } else {
            None
        }
    }

    /// 回退缓冲是否为空
    pub fn has_fallback(&self) -> bool {
        !self.fallback.is_empty()
    }

    /// 回退缓冲原文
    fn fallback_raw(&self) -> String {
        self.fallback.join("\n")
    }

    /// 把回退缓冲按非流式响应解析为事件
    ///
    /// 只在结构化路径没有产生任何文本或工具调用时调用
    pub fn fallback_events(&self) -> Vec<StreamEvent> {
        if self.fallback.is_empty() {
            return Vec::new();
        }

        let raw = self.fallback_raw();
        let json: Value = match serde_json::from_str(raw.trim()) {
            Ok(v) => v,
            Err(e) => {
                debug!("[OpenAISSEParser] 回退缓冲不是 JSON: {}", e);
                return Vec::new();
            }
        };

        if let Some(error) = json.get("error").filter(|e| !e.is_null()) {
            return vec![StreamEvent::Error(error_message(error))];
        }

        let response: ChatCompletionResponse = match serde_json::from_value(json) {
            Ok(r) => r,
            Err(e) => {
                warn!("[OpenAISSEParser] 非流式响应结构无法识别: {}", e);
                return Vec::new();
            }
        };

        let mut events = Vec::new();
        for message in response.choices.into_iter().filter_map(|c| c.message) {
            if let Some(text) = message.content.filter(|s| !s.is_empty()) {
                events.push(StreamEvent::TextDelta(text));
            }
            for (position, tc) in message.tool_calls.unwrap_or_default().into_iter().enumerate() {
                let mut delta = Self::convert_tool_call(tc);
                delta.index = delta.index.or(Some(position as u32));
                events.push(StreamEvent::ToolCallDelta(delta));
            }
        }
        if let Some(usage) = response.usage.as_ref().and_then(Self::convert_usage) {
            events.push(StreamEvent::Usage(usage));
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_delta() {
        let mut parser = OpenAISSEParser::new();

        let events = parser.parse_line(r#"data: {"choices":[{"delta":{"content":"Hello"}}]}"#);
        assert_eq!(events, vec![StreamEvent::TextDelta("Hello".to_string())]);

        let events = parser.parse_line(r#"data: {"choices":[{"delta":{"content":""}}]}"#);
        assert!(events.is_empty());
    }

    #[test]
    fn test_prefix_without_space_and_crlf() {
        let mut parser = OpenAISSEParser::new();
        let events = parser.parse_line("data:{\"choices\":[{\"delta\":{\"content\":\"x\"}}]}\r");
        assert_eq!(events, vec![StreamEvent::TextDelta("x".to_string())]);
    }

    #[test]
    fn test_done_signal() {
        let mut parser = OpenAISSEParser::new();
        assert_eq!(parser.parse_line("data: [DONE]"), vec![StreamEvent::Done]);
    }

    #[test]
    fn test_tool_call_delta() {
        let mut parser = OpenAISSEParser::new();
        let line = r#"data: {"choices":[{"delta":{"tool_calls":[{"index":0,"id":"call_123","type":"function","function":{"name":"web_search","arguments":"{\"qu"}}]}}]}"#;
        let events = parser.parse_line(line);

        assert_eq!(events.len(), 1);
        match &events[0] {
            StreamEvent::ToolCallDelta(delta) => {
                assert_eq!(delta.index, Some(0));
                assert_eq!(delta.id.as_deref(), Some("call_123"));
                assert_eq!(delta.name.as_deref(), Some("web_search"));
                assert_eq!(delta.arguments.as_deref(), Some("{\"qu"));
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_events_in_order_across_choices() {
        let mut parser = OpenAISSEParser::new();
        let line = r#"data: {"choices":[{"delta":{"content":"a","tool_calls":[{"index":0,"function":{"name":"web_search"}},{"index":1,"function":{"name":"finalize_answer"}}]}},{"delta":{"content":"b"}}]}"#;
        let events = parser.parse_line(line);

        assert_eq!(events.len(), 4);
        assert_eq!(events[0], StreamEvent::TextDelta("a".to_string()));
        assert!(matches!(&events[1], StreamEvent::ToolCallDelta(d) if d.index == Some(0)));
        assert!(matches!(&events[2], StreamEvent::ToolCallDelta(d) if d.index == Some(1)));
        assert_eq!(events[3], StreamEvent::TextDelta("b".to_string()));
    }

    #[test]
    fn test_usage() {
        let mut parser = OpenAISSEParser::new();
        let events = parser.parse_line(
            r#"data: {"choices":[],"usage":{"prompt_tokens":10,"completion_tokens":5}}"#,
        );
        assert_eq!(events, vec![StreamEvent::Usage(TokenUsage::new(10, 5))]);
    }

    #[test]
    fn test_stream_error_object() {
        let mut parser = OpenAISSEParser::new();
        let events = parser.parse_line(r#"data: {"error":{"message":"overloaded"}}"#);
        assert_eq!(events, vec![StreamEvent::Error("overloaded".to_string())]);
    }

    #[test]
    fn test_malformed_json_goes_to_fallback() {
        let mut parser = OpenAISSEParser::new();
        let events = parser.parse_line("data: {not json");
        assert!(events.is_empty());
        assert!(parser.has_fallback());
        assert!(parser.fallback_events().is_empty());
    }

    #[test]
    fn test_non_data_lines_ignored_but_retained() {
        let mut parser = OpenAISSEParser::new();
        assert!(parser.parse_line("event: message").is_empty());
        assert!(parser.parse_line("").is_empty());
        assert_eq!(parser.fallback_raw(), "event: message");
    }

    #[test]
    fn test_non_streaming_fallback() {
        let mut parser = OpenAISSEParser::new();
        let body = [
            "{",
            r#"  "choices": [{"message": {"content": "plain answer", "tool_calls": [{"id": "c1", "type": "function", "function": {"name": "web_search", "arguments": "{\"query\":\"q\"}"}}]}}],"#,
            r#"  "usage": {"prompt_tokens": 3, "completion_tokens": 4}"#,
            "}",
        ];
        for line in body {
            assert!(parser.parse_line(line).is_empty());
        }

        let events = parser.fallback_events();
        assert_eq!(events.len(), 3);
        assert_eq!(events[0], StreamEvent::TextDelta("plain answer".to_string()));
        match &events[1] {
            StreamEvent::ToolCallDelta(delta) => {
                assert_eq!(delta.index, Some(0));
                assert_eq!(delta.id.as_deref(), Some("c1"));
                assert_eq!(delta.arguments.as_deref(), Some(r#"{"query":"q"}"#));
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(events[2], StreamEvent::Usage(TokenUsage::new(3, 4)));
    }

    #[test]
    fn test_fallback_null_error_is_not_a_failure() {
        let mut parser = OpenAISSEParser::new();
        parser.parse_line(r#"{"choices":[{"message":{"content":"hello"}}],"error":null}"#);
        assert_eq!(
            parser.fallback_events(),
            vec![StreamEvent::TextDelta("hello".to_string())]
        );
    }

    #[test]
    fn test_fallback_error_body() {
        let mut parser = OpenAISSEParser::new();
        parser.parse_line(r#"{"error": {"message": "model not found"}}"#);
        assert_eq!(
            parser.fallback_events(),
            vec![StreamEvent::Error("model not found".to_string())]
        );
    }
}
