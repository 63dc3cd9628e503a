//! 生成进度快照
//!
//! 编排器通过 `tokio::sync::watch` 发布快照，展示层只读订阅

use super::types::TurnPhase;
use serde::Serialize;

/// 生成进度
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GenerationProgress {
    /// 是否有回合在运行
    pub running: bool,
    pub phase: TurnPhase,
    /// 已累积的输出文本
    pub partial_output: String,
    /// 正在执行的搜索查询
    pub active_search_query: Option<String>,
    /// 当前迭代序号（从 0 开始）
    pub iteration: u32,
}

impl GenerationProgress {
    /// 回合开始时的快照
    pub fn started() -> Self {
        Self {
            running: true,
            phase: TurnPhase::Requesting,
            ..Default::default()
        }
    }
}
