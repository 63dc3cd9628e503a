//! 回合迭代预算
//!
//! 基础上限用尽而模型仍在发起新的搜索时，上限一次性提升到硬上限，
//! 同一回合内不会再次扩展

use serde::Serialize;
use tracing::info;

/// 迭代预算
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AgentBudget {
    pub base_limit: u32,
    pub hard_limit: u32,
    used_iterations: u32,
    extended: bool,
}

impl AgentBudget {
    /// 硬上限小于基础上限时按基础上限处理
    pub fn new(base_limit: u32, hard_limit: u32) -> Self {
        Self {
            base_limit,
            hard_limit: hard_limit.max(base_limit),
            used_iterations: 0,
            extended: false,
        }
    }

    /// 已完成的工具迭代次数
    pub fn used_iterations(&self) -> u32 {
        self.used_iterations
    }

    /// 是否已扩展过
    pub fn is_extended(&self) -> bool {
        self.extended
    }

    /// 当前生效的上限
    pub fn allowed_limit(&self) -> u32 {
        if self.extended {
            self.hard_limit
        } else {
            self.base_limit
        }
    }

    pub fn has_remaining(&self) -> bool {
        self.used_iterations < self.allowed_limit()
    }

    /// 在基础上限处尝试扩展
    ///
    /// 仅当尚未扩展、已达到基础上限、硬上限更高且本次出现新的搜索时生效。
    /// 返回本次调用是否触发了扩展
    pub fn maybe_extend(&mut self, has_new_search: bool) -> bool {
        if self.extended
            || !has_new_search
            || self.used_iterations < self.base_limit
            || self.hard_limit <= self.base_limit
        {
            return false;
        }
        self.extended = true;
        info!(
            "[AgentBudget] 迭代上限扩展: {} -> {}",
            self.base_limit, self.hard_limit
        );
        true
    }

    /// 记录一次完成的工具迭代
    pub fn record_iteration(&mut self) {
        self.used_iterations = self.used_iterations.saturating_add(1);
    }
}
