//! 消息投递渠道 trait 定义

use anyhow::Result;
use async_trait::async_trait;

use super::alert::Alert;
use crate::registry::RecipientId;

/// 发送结果
#[derive(Debug, Clone, PartialEq)]
pub enum SendResult {
    /// 发送成功
    Sent,
    /// 跳过（如 dry-run）
    Skipped(String),
    /// 发送失败
    Failed(String),
}

impl SendResult {
    /// 只有真正送达的通知才写入 ledger
    pub fn is_sent(&self) -> bool {
        matches!(self, SendResult::Sent)
    }
}

/// 消息投递渠道
///
/// 转义、格式降级和重试都属于渠道自己的职责，调用方只关心是否送达。
#[async_trait]
pub trait MessageSink: Send + Sync {
    /// 渠道名称（用于日志）
    fn name(&self) -> &str;

    /// 投递一条通知
    ///
    /// 渠道层面的失败返回 `Ok(SendResult::Failed(..))`，`Err` 只用于调用方无法处理的内部错误。
    async fn deliver(&self, recipient: RecipientId, alert: &Alert) -> Result<SendResult>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_sent_counts_as_delivered() {
        assert!(SendResult::Sent.is_sent());
        assert!(!SendResult::Skipped("dry run".to_string()).is_sent());
        assert!(!SendResult::Failed("timeout".to_string()).is_sent());
    }
}
