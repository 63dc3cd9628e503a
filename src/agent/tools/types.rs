//! 工具类型定义
//!
//! 定义工具清单、参数 Schema 以及工具执行结果

use crate::agent::types::AgentMessage;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// 工具定义结构
///
/// 包含工具的名称、描述和参数 JSON Schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolDefinition {
    /// 工具名称（唯一标识）
    pub name: String,
    /// 工具描述（供 LLM 理解）
    pub description: String,
    /// 参数 JSON Schema
    pub parameters: JsonSchema,
}

impl ToolDefinition {
    pub fn new(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            parameters: JsonSchema::default(),
        }
    }

    /// 设置参数 schema
    pub fn with_parameters(mut self, parameters: JsonSchema) -> Self {
        self.parameters = parameters;
        self
    }

    /// 验证工具定义是否有效
    pub fn validate(&self) -> Result<(), ToolValidationError> {
        if self.name.is_empty() {
            return Err(ToolValidationError::EmptyName);
        }
        if self.description.is_empty() {
            return Err(ToolValidationError::EmptyDescription);
        }
        self.parameters.validate()?;
        Ok(())
    }

    /// 转换为 OpenAI API 格式的工具定义
    pub fn to_api_format(&self) -> crate::models::openai::Tool {
        crate::models::openai::Tool::Function {
            function: crate::models::openai::FunctionDef {
                name: self.name.clone(),
                description: Some(self.description.clone()),
                parameters: Some(serde_json::to_value(&self.parameters).unwrap_or_default()),
            },
        }
    }
}

/// JSON Schema 参数定义
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonSchema {
    /// Schema 类型（通常为 "object"）
    #[serde(rename = "type")]
    pub schema_type: String,
    /// 属性定义
    #[serde(default)]
    pub properties: BTreeMap<String, PropertySchema>,
    /// 必需参数列表
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for JsonSchema {
    fn default() -> Self {
        Self {
            schema_type: "object".to_string(),
            properties: BTreeMap::new(),
            required: Vec::new(),
        }
    }
}

impl JsonSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加属性
    pub fn add_property(
        mut self,
        name: impl Into<String>,
        prop: PropertySchema,
        required: bool,
    ) -> Self {
        let name = name.into();
        if required {
            self.required.push(name.clone());
        }
        self.properties.insert(name, prop);
        self
    }

    /// 验证 schema 是否有效
    pub fn validate(&self) -> Result<(), ToolValidationError> {
        for req in &self.required {
            if !self.properties.contains_key(req) {
                return Err(ToolValidationError::RequiredPropertyNotDefined(req.clone()));
            }
        }
        Ok(())
    }
}

/// 属性 Schema
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PropertySchema {
    /// 属性类型（string, integer, array ...）
    #[serde(rename = "type")]
    pub prop_type: String,
    /// 属性描述
    pub description: String,
    /// 数组元素类型
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    /// 最小值（整数类型）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub minimum: Option<i64>,
    /// 最大值（整数类型）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub maximum: Option<i64>,
}

impl PropertySchema {
    fn of_type(prop_type: &str, description: impl Into<String>) -> Self {
        Self {
            prop_type: prop_type.to_string(),
            description: description.into(),
            items: None,
            minimum: None,
            maximum: None,
        }
    }

    /// 创建字符串类型属性
    pub fn string(description: impl Into<String>) -> Self {
        Self::of_type("string", description)
    }

    /// 创建整数类型属性
    pub fn integer(description: impl Into<String>) -> Self {
        Self::of_type("integer", description)
    }

    /// 创建字符串数组类型属性
    pub fn string_array(description: impl Into<String>) -> Self {
        let mut prop = Self::of_type("array", description);
        prop.items = Some(Box::new(Self::of_type("string", "")));
        prop
    }

    /// 设置取值范围
    pub fn with_range(mut self, minimum: i64, maximum: i64) -> Self {
        self.minimum = Some(minimum);
        self.maximum = Some(maximum);
        self
    }
}

/// 最终答案
///
/// `used_evidence_ids` 与 `open_questions` 只做透传
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalAnswer {
    pub answer_markdown: String,
    #[serde(default)]
    pub used_evidence_ids: Vec<String>,
    #[serde(default)]
    pub open_questions: Vec<String>,
}

/// 工具执行结果
///
/// `final_answer` 存在时表示本回合应当终止
#[derive(Debug, Clone, PartialEq)]
pub struct ToolResult {
    /// 回传给 Provider 的 tool 消息
    pub message: AgentMessage,
    /// 最终答案
    pub final_answer: Option<FinalAnswer>,
}

impl ToolResult {
    /// 成功结果，content 为结构化 JSON
    pub fn success(tool_call_id: &str, content: &serde_json::Value) -> Self {
        Self {
            message: AgentMessage::tool(tool_call_id, content.to_string()),
            final_answer: None,
        }
    }

    /// 错误结果，content 为 `{"error": <message>}`
    pub fn error(tool_call_id: &str, message: impl Into<String>) -> Self {
        let content = serde_json::json!({ "error": message.into() });
        Self {
            message: AgentMessage::tool(tool_call_id, content.to_string()),
            final_answer: None,
        }
    }

    /// 携带最终答案的结果
    pub fn finalized(tool_call_id: &str, answer: FinalAnswer) -> Self {
        let content = serde_json::json!({ "status": "ok", "finalized": true });
        Self {
            message: AgentMessage::tool(tool_call_id, content.to_string()),
            final_answer: Some(answer),
        }
    }

    /// 是否为错误结果
    pub fn is_error(&self) -> bool {
        self.message
            .content
            .as_deref()
            .and_then(|c| serde_json::from_str::<serde_json::Value>(c).ok())
            .map(|v| v.get("error").is_some())
            .unwrap_or(false)
    }
}

/// 工具定义验证错误
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ToolValidationError {
    /// 工具名称为空
    #[error("工具名称不能为空")]
    EmptyName,

    /// 工具描述为空
    #[error("工具描述不能为空")]
    EmptyDescription,

    /// 必需属性未定义
    #[error("必需属性 '{0}' 未在 properties 中定义")]
    RequiredPropertyNotDefined(String),
}
