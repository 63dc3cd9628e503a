//! 提示词模板
//!
//! 默认系统提示词与预算耗尽时追加的强制作答指令

/// 默认系统提示词
///
/// 证据编号约定只存在于提示词层面，回合逻辑只透传相关字段
pub const DEFAULT_SYSTEM_PROMPT: &str = r#"You are a careful research assistant with access to a web search tool.

# Working rules

1. Use `web_search` (or its alias `search`) when the question needs current or verifiable facts.
2. Keep an evidence ledger: label each useful search result E1, E2, ... and cite those ids in your answer.
3. Do not repeat a search you already ran; refine the query instead.
4. When you have enough evidence, call `finalize_answer` with the complete Markdown answer,
   the evidence ids you relied on, and any questions that remain open.
5. For greetings or questions you can answer directly, reply in plain text without tools."#;

/// 预算耗尽后追加的用户指令
pub const FORCE_ANSWER_INSTRUCTION: &str = "You have used all available tool calls. Answer the original question now using the evidence gathered so far. Do not call any more tools.";

/// 组合系统提示词，未提供时使用默认值
pub fn system_prompt_or_default(custom: Option<&str>) -> &str {
    match custom {
        Some(prompt) if !prompt.trim().is_empty() => prompt,
        _ => DEFAULT_SYSTEM_PROMPT,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_prompt_mentions_tools() {
        assert!(DEFAULT_SYSTEM_PROMPT.contains("web_search"));
        assert!(DEFAULT_SYSTEM_PROMPT.contains("finalize_answer"));
    }

    #[test]
    fn test_custom_prompt_wins() {
        assert_eq!(system_prompt_or_default(Some("be brief")), "be brief");
        assert_eq!(system_prompt_or_default(Some("  ")), DEFAULT_SYSTEM_PROMPT);
        assert_eq!(system_prompt_or_default(None), DEFAULT_SYSTEM_PROMPT);
    }
}
