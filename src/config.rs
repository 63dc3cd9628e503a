//! 配置模块
//!
//! YAML 配置文件，默认位于 `~/.searchcast/config.yaml`，
//! 所有字段均有默认值，命令行参数可覆盖文件中的值

use crate::error::AgentError;
use crate::resilience::TimeoutConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// 配置目录名
const CONFIG_DIR: &str = ".searchcast";
/// 配置文件名
const CONFIG_FILE: &str = "config.yaml";

/// 顶层配置
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub agent: AgentSettings,
    pub search: SearchConfig,
    pub timeouts: TimeoutConfig,
    pub logging: LoggingConfig,
}

/// 推理服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProviderConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            temperature: 0.7,
            max_tokens: 4096,
        }
    }
}

/// 回合预算与工具开关
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AgentSettings {
    /// 基础迭代上限
    pub base_iteration_limit: u32,
    /// 扩展后的迭代上限
    pub hard_iteration_limit: u32,
    /// 是否向模型暴露搜索工具
    pub search_enabled: bool,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            base_iteration_limit: 4,
            hard_iteration_limit: 8,
            search_enabled: true,
        }
    }
}

/// 搜索服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SearchConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    /// 单次搜索超时（秒）
    pub timeout_secs: u64,
    pub include_highlights: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.exa.ai".to_string(),
            api_key: None,
            timeout_secs: 20,
            include_highlights: true,
        }
    }
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LoggingConfig {
    /// 默认日志级别，`RUST_LOG` 优先
    pub level: String,
    /// 是否输出 ANSI 颜色
    pub ansi: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            ansi: true,
        }
    }
}

impl Config {
    /// 默认配置文件路径
    pub fn default_path() -> Option<PathBuf> {
        dirs::home_dir().map(|home| home.join(CONFIG_DIR).join(CONFIG_FILE))
    }

    /// 从指定路径加载
    pub fn load(path: &Path) -> Result<Self, AgentError> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            AgentError::Config(format!("读取配置文件失败 {}: {}", path.display(), e))
        })?;
        let config: Config = serde_yaml::from_str(&raw).map_err(|e| {
            AgentError::Config(format!("解析配置文件失败 {}: {}", path.display(), e))
        })?;
        info!("[Config] 已加载配置: {}", path.display());
        Ok(config)
    }

    /// 从默认路径加载，文件不存在时使用默认配置
    pub fn load_or_default() -> Result<Self, AgentError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => {
                debug!("[Config] 未找到配置文件，使用默认配置");
                Ok(Self::default())
            }
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<(), AgentError> {
        if self.provider.base_url.trim().is_empty() {
            return Err(AgentError::Config("provider.base_url 不能为空".to_string()));
        }
        if self.provider.model.trim().is_empty() {
            return Err(AgentError::Config("provider.model 不能为空".to_string()));
        }
        if !(0.0..=2.0).contains(&self.provider.temperature) {
            return Err(AgentError::Config(format!(
                "provider.temperature 超出范围 [0, 2]: {}",
                self.provider.temperature
            )));
        }
        if self.provider.max_tokens == 0 {
            return Err(AgentError::Config("provider.max_tokens 必须大于 0".to_string()));
        }
        if self.agent.base_iteration_limit == 0 {
            return Err(AgentError::Config(
                "agent.base_iteration_limit 必须大于 0".to_string(),
            ));
        }
        if self.agent.hard_iteration_limit < self.agent.base_iteration_limit {
            return Err(AgentError::Config(format!(
                "agent.hard_iteration_limit ({}) 不能小于 base_iteration_limit ({})",
                self.agent.hard_iteration_limit, self.agent.base_iteration_limit
            )));
        }
        Ok(())
    }
}
