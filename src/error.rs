//! 错误类型
//!
//! 远端适配器的错误按处理方式分类：
//! - `NotFound`：条目已删除或无权访问，按 stale 处理并在上游标记已读
//! - `Transient`：网络 / 限流，本轮跳过，下轮重试
//! - `Malformed`：无法解析的引用或响应，跳过单个事件

use thiserror::Error;

/// 远端事件源错误
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("not found: {resource}")]
    NotFound { resource: String },

    #[error("transient failure during {operation}: {message}")]
    Transient { operation: String, message: String },

    #[error("malformed {what}: {detail}")]
    Malformed { what: String, detail: String },
}

impl SourceError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    pub fn transient(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Transient {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn malformed(what: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::Malformed {
            what: what.into(),
            detail: detail.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// 启动配置错误（唯一允许终止进程的错误）
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {reason}")]
    Invalid { key: &'static str, reason: String },
}
