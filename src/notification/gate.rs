//! 重复通知门控
//!
//! 同一 (接收方, 条目, 类型, 指纹) 在冷却期内只投递一次。
//! 门控只读 ledger，投递成功后由调用方写入记录。

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use super::ledger::{Ledger, LedgerKey};

/// 冷却期门控
#[derive(Debug, Clone, Copy)]
pub struct RenotifyGate {
    cool_down: Duration,
}

impl RenotifyGate {
    pub fn new(cool_down: Duration) -> Self {
        Self { cool_down }
    }

    pub fn from_secs(secs: u64) -> Self {
        Self::new(Duration::seconds(secs.min(i64::MAX as u64 / 1000) as i64))
    }

    pub fn cool_down(&self) -> Duration {
        self.cool_down
    }

    /// 是否应该投递（使用当前时间）
    pub async fn should_deliver(&self, ledger: &dyn Ledger, key: &LedgerKey) -> Result<bool> {
        self.should_deliver_at(ledger, key, Utc::now()).await
    }

    /// 是否应该投递（指定当前时间，用于测试）
    ///
    /// 没有记录时投递；有记录时仅当 `now - delivered_at > cool_down` 投递。
    pub async fn should_deliver_at(
        &self,
        ledger: &dyn Ledger,
        key: &LedgerKey,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        match ledger.latest_delivery(key).await? {
            None => Ok(true),
            Some(delivered_at) => {
                let elapsed = now - delivered_at;
                let deliver = elapsed > self.cool_down;
                if !deliver {
                    debug!(
                        url = %key.item_url,
                        kind = %key.kind,
                        elapsed_secs = elapsed.num_seconds(),
                        "Alert within cool-down"
                    );
                }
                Ok(deliver)
            }
        }
    }
}
