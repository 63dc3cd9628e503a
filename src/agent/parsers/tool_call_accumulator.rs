//! 工具调用累加器
//!
//! 按流内 index 合并跨多个 chunk 到达的工具调用片段

use crate::agent::types::{ToolCall, ToolCallDelta};
use std::collections::BTreeMap;
use tracing::debug;

/// 尚未完成的工具调用
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PartialToolCall {
    id: Option<String>,
    call_type: Option<String>,
    name: Option<String>,
    /// 参数片段按到达顺序原样拼接
    arguments: String,
}

/// 工具调用累加器
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    partials: BTreeMap<u32, PartialToolCall>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// 合并一个增量片段
    pub fn append(&mut self, delta: ToolCallDelta) {
        let index = delta.index.unwrap_or(0);
        let partial = self.partials.entry(index).or_default();

        if let Some(id) = delta.id.filter(|s| !s.is_empty()) {
            partial.id = Some(id);
        }
        if let Some(t) = delta.call_type.filter(|s| !s.is_empty()) {
            partial.call_type = Some(t);
        }
        if let Some(name) = delta.name.filter(|s| !s.is_empty()) {
            partial.name = Some(name);
        }
        if let Some(args) = delta.arguments {
            partial.arguments.push_str(&args);
        }
    }

    /// 是否收到过任何片段
    pub fn is_empty(&self) -> bool {
        self.partials.is_empty()
    }

    /// 构建完整的工具调用列表
    ///
    /// 按 index 升序返回，缺少名称的调用被丢弃
    pub fn build_tool_calls(&self) -> Vec<ToolCall> {
        self.partials
            .iter()
            .filter_map(|(index, partial)| {
                let Some(name) = partial.name.clone() else {
                    debug!(
                        "[ToolCallAccumulator] 丢弃缺少名称的工具调用: index={} args_len={}",
                        index,
                        partial.arguments.len()
                    );
                    return None;
                };
                let id = partial
                    .id
                    .clone()
                    .unwrap_or_else(|| format!("call_{}", index));
                Some(ToolCall {
                    id,
                    name,
                    arguments: partial.arguments.clone(),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn delta(index: u32, id: Option<&str>, name: Option<&str>, args: Option<&str>) -> ToolCallDelta {
        ToolCallDelta {
            index: Some(index),
            id: id.map(String::from),
            call_type: id.map(|_| "function".to_string()),
            name: name.map(String::from),
            arguments: args.map(String::from),
        }
    }

    #[test]
    fn test_accumulates_fragments() {
        let mut acc = ToolCallAccumulator::new();
        acc.append(delta(0, Some("call_123"), Some("web_search"), None));
        acc.append(delta(0, None, None, Some("{\"query\":")));
        acc.append(delta(0, None, None, Some("\"rust\"}")));

        let calls = acc.build_tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_123");
        assert_eq!(calls[0].name, "web_search");
        assert_eq!(calls[0].arguments, r#"{"query":"rust"}"#);
    }

    #[test]
    fn test_drops_nameless_partial() {
        let mut acc = ToolCallAccumulator::new();
        acc.append(delta(0, Some("call_1"), None, Some("{\"query\":\"x\"}")));
        assert!(!acc.is_empty());
        assert!(acc.build_tool_calls().is_empty());
    }

    #[test]
    fn test_missing_index_defaults_to_zero() {
        let mut acc = ToolCallAccumulator::new();
        acc.append(ToolCallDelta {
            index: None,
            name: Some("web_search".to_string()),
            arguments: Some("{}".to_string()),
            ..Default::default()
        });
        acc.append(delta(0, Some("call_z"), None, None));

        let calls = acc.build_tool_calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].id, "call_z");
    }

    #[test]
    fn test_synthesizes_missing_id() {
        let mut acc = ToolCallAccumulator::new();
        acc.append(delta(2, None, Some("finalize_answer"), Some("{}")));
        assert_eq!(acc.build_tool_calls()[0].id, "call_2");
    }

    #[test]
    fn test_orders_by_index() {
        let mut acc = ToolCallAccumulator::new();
        acc.append(delta(1, Some("b"), Some("web_search"), Some("{}")));
        acc.append(delta(0, Some("a"), Some("finalize_answer"), Some("{}")));

        let ids: Vec<_> = acc.build_tool_calls().into_iter().map(|c| c.id).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_interleaved_indices_do_not_leak() {
        let mut acc = ToolCallAccumulator::new();
        acc.append(delta(0, Some("a"), Some("web_search"), Some("{\"query\":\"")));
        acc.append(delta(1, Some("b"), Some("web_search"), Some("{\"query\":\"")));
        acc.append(delta(0, None, None, Some("alpha\"}")));
        acc.append(delta(1, None, None, Some("beta\"}")));

        let calls = acc.build_tool_calls();
        assert_eq!(calls[0].arguments, r#"{"query":"alpha"}"#);
        assert_eq!(calls[1].arguments, r#"{"query":"beta"}"#);
    }

    #[test]
    fn test_arguments_never_deduplicated() {
        let mut acc = ToolCallAccumulator::new();
        acc.append(delta(0, Some("a"), Some("web_search"), Some("ab")));
        acc.append(delta(0, None, None, Some("ab")));
        assert_eq!(acc.build_tool_calls()[0].arguments, "abab");
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    /// 把字符串按给定切点切分为多个片段（按字符边界）
    fn split_at_points(s: &str, mut points: Vec<usize>) -> Vec<String> {
        let chars: Vec<char> = s.chars().collect();
        points.retain(|p| *p > 0 && *p < chars.len());
        points.sort_unstable();
        points.dedup();

        let mut parts = Vec::new();
        let mut start = 0;
        for p in points {
            parts.push(chars[start..p].iter().collect());
            start = p;
        }
        parts.push(chars[start..].iter().collect());
        parts
    }

    fn feed_split(acc: &mut ToolCallAccumulator, index: u32, id: &str, name: &str, args: &[String]) {
        acc.append(ToolCallDelta {
            index: Some(index),
            id: Some(id.to_string()),
            call_type: Some("function".to_string()),
            name: Some(name.to_string()),
            arguments: None,
        });
        for part in args {
            acc.append(ToolCallDelta {
                index: Some(index),
                arguments: Some(part.clone()),
                ..Default::default()
            });
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        /// 任意切分方式得到的结果都与单个 chunk 一致
        #[test]
        fn prop_split_invariance(
            args in "\\PC{0,80}",
            points in prop::collection::vec(0usize..100, 0..12)
        ) {
            let mut whole = ToolCallAccumulator::new();
            feed_split(&mut whole, 0, "call_1", "web_search", &[args.clone()]);

            let mut split = ToolCallAccumulator::new();
            feed_split(&mut split, 0, "call_1", "web_search", &split_at_points(&args, points));

            prop_assert_eq!(whole.build_tool_calls(), split.build_tool_calls());
        }

        /// 两个交错的 index 互不干扰
        #[test]
        fn prop_interleaved_indices_isolated(
            a in "[a-z0-9]{0,40}",
            b in "[A-Z0-9]{0,40}",
            points_a in prop::collection::vec(0usize..50, 0..6),
            points_b in prop::collection::vec(0usize..50, 0..6)
        ) {
            let parts_a = split_at_points(&a, points_a);
            let parts_b = split_at_points(&b, points_b);

            let mut acc = ToolCallAccumulator::new();
            acc.append(ToolCallDelta { index: Some(0), name: Some("web_search".into()), ..Default::default() });
            acc.append(ToolCallDelta { index: Some(1), name: Some("web_search".into()), ..Default::default() });

            let longest = parts_a.len().max(parts_b.len());
            for i in 0..longest {
                if let Some(p) = parts_a.get(i) {
                    acc.append(ToolCallDelta { index: Some(0), arguments: Some(p.clone()), ..Default::default() });
                }
                if let Some(p) = parts_b.get(i) {
                    acc.append(ToolCallDelta { index: Some(1), arguments: Some(p.clone()), ..Default::default() });
                }
            }

            let calls = acc.build_tool_calls();
            prop_assert_eq!(calls.len(), 2);
            prop_assert_eq!(&calls[0].arguments, &a);
            prop_assert_eq!(&calls[1].arguments, &b);
        }
    }
}
