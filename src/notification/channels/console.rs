//! 控制台渠道（dry-run）
//!
//! 只打印不投递，返回 `Skipped`，因此 dry-run 不会写入 ledger。

use anyhow::Result;
use async_trait::async_trait;

use crate::notification::alert::Alert;
use crate::notification::channel::{MessageSink, SendResult};
use crate::notification::formatter::format_alert_plain;
use crate::registry::RecipientId;

#[derive(Debug, Default)]
pub struct ConsoleSink;

impl ConsoleSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl MessageSink for ConsoleSink {
    fn name(&self) -> &str {
        "console"
    }

    async fn deliver(&self, recipient: RecipientId, alert: &Alert) -> Result<SendResult> {
        println!("── chat {} ──\n{}\n", recipient, format_alert_plain(alert));
        Ok(SendResult::Skipped("dry run".to_string()))
    }
}
