//! 日志模块
//!
//! tracing 订阅器初始化与日志脱敏

use crate::config::LoggingConfig;
use crate::error::AgentError;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing_subscriber::EnvFilter;

/// 初始化全局日志订阅器
///
/// `RUST_LOG` 存在时优先于配置中的级别
pub fn init_logging(config: &LoggingConfig) -> Result<(), AgentError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .map_err(|e| AgentError::Config(format!("无效的日志级别 {}: {}", config.level, e)))?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(config.ansi)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| AgentError::Internal(format!("日志初始化失败: {}", e)))
}

/// 脱敏规则，按顺序应用
static SANITIZE_PATTERNS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    let patterns = [
        // Bearer token
        (r"Bearer\s+[A-Za-z0-9._-]+", "Bearer ***"),
        // API key 各种格式
        (
            r#"api[_-]?key["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "api_key: ***",
        ),
        // 通用 token
        (r#"token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#, "token: ***"),
        (
            r#"access[_-]?token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "access_token: ***",
        ),
        (
            r#"refresh[_-]?token["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "refresh_token: ***",
        ),
        (
            r#"client[_-]?secret["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "client_secret: ***",
        ),
        (
            r#"[Aa]uthorization["']?\s*[:=]\s*["']?[A-Za-z0-9._\s-]+"#,
            "authorization: ***",
        ),
        (r#"password["']?\s*[:=]\s*["']?[^\s"',}]+"#, "password: ***"),
        (
            r#"secret["']?\s*[:=]\s*["']?[A-Za-z0-9._-]+"#,
            "secret: ***",
        ),
        // 错误信息中回显的 OpenAI 风格密钥
        (r"sk-[A-Za-z0-9_-]{8,}", "sk-***"),
    ];

    patterns
        .into_iter()
        .filter_map(|(pattern, replacement)| Regex::new(pattern).ok().map(|re| (re, replacement)))
        .collect()
});

/// 对日志和错误信息中的敏感字段脱敏
pub fn sanitize_log_message(message: &str) -> String {
    let mut sanitized = message.to_string();
    for (re, replacement) in SANITIZE_PATTERNS.iter() {
        sanitized = re.replace_all(&sanitized, *replacement).to_string();
    }
    sanitized
}

#[cfg(test)]
mod tests {
    use super::sanitize_log_message;

    #[test]
    fn test_sanitize_bearer_token() {
        let input = "Authorization: Bearer abcDEF123._-XYZ";
        let output = sanitize_log_message(input);
        assert!(!output.contains("abcDEF123"));
        assert!(output.contains("***"));
    }

    #[test]
    fn test_sanitize_api_key() {
        let input = r#"request api_key="sk-test_123.456-ABC" end"#;
        let output = sanitize_log_message(input);
        assert!(output.contains("api_key: ***"));
        assert!(!output.contains("sk-test_123"));
    }

    #[test]
    fn test_sanitize_access_token() {
        let input = "access_token=atk_12345";
        let output = sanitize_log_message(input);
        assert!(output.contains("access_token: ***"));
        assert!(!output.contains("atk_12345"));
    }

    #[test]
    fn test_sanitize_password() {
        let input = r#"{"password":"p@ssW0rd!"}"#;
        let output = sanitize_log_message(input);
        assert!(output.contains("password: ***"));
        assert!(!output.contains("p@ssW0rd!"));
    }

    #[test]
    fn test_sanitize_echoed_provider_key() {
        let input = r#"{"error":{"message":"Incorrect API key provided: sk-proj-AbCdEf123456"}}"#;
        let output = sanitize_log_message(input);
        assert!(!output.contains("AbCdEf123456"));
        assert!(output.contains("sk-***"));
    }

    #[test]
    fn test_plain_text_unchanged() {
        let input = "这是一段普通日志，不包含任何敏感字段。";
        let output = sanitize_log_message(input);
        assert_eq!(output, input);
    }
}
