//! finalize_answer 工具参数

use super::types::FinalAnswer;
use serde::Deserialize;

/// finalize_answer 参数
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FinalizeArgs {
    pub answer_markdown: String,
    #[serde(default)]
    pub used_evidence_ids: Option<Vec<String>>,
    #[serde(default)]
    pub open_questions: Option<Vec<String>>,
}

impl FinalizeArgs {
    /// 校验并转换为最终答案
    pub fn into_final_answer(self) -> Result<FinalAnswer, String> {
        if self.answer_markdown.trim().is_empty() {
            return Err("missing answer_markdown".to_string());
        }
        Ok(FinalAnswer {
            answer_markdown: self.answer_markdown,
            used_evidence_ids: self.used_evidence_ids.unwrap_or_default(),
            open_questions: self.open_questions.unwrap_or_default(),
        })
    }
}
