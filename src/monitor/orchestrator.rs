//! 轮询周期编排
//!
//! 一个周期：清理过期 ledger → 对每个活跃账号（有限并发）：
//! 拉取未读通知 → 判定相关性 → 分类 → 冷却期门控 → 投递并记录。
//!
//! 单个事件或单个账号的失败只记录日志，不会中断整个周期。

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::MonitorConfig;
use crate::github::model::RawEvent;
use crate::github::source::{EventSource, SourceFactory};
use crate::notification::alert::Alert;
use crate::notification::channel::{MessageSink, SendResult};
use crate::notification::classifier::{
    alert_kind, is_supported_subject, Classification, CommentCache, NotificationClassifier,
};
use crate::notification::gate::RenotifyGate;
use crate::notification::ledger::{Ledger, LedgerKey};
use crate::notification::resolver::{resolve, Resolution, StaleReason};
use crate::notification::retention;
use crate::registry::{MonitoredAccount, RecipientId};

/// 编排参数
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    /// 冷却期
    pub cool_down: chrono::Duration,
    pub max_body_len: usize,
    pub max_concurrent_accounts: usize,
    /// 是否额外搜索待 review 的 PR
    pub review_search: bool,
}

impl Default for MonitorSettings {
    fn default() -> Self {
        Self {
            cool_down: chrono::Duration::seconds(3600),
            max_body_len: 300,
            max_concurrent_accounts: 4,
            review_search: true,
        }
    }
}

impl From<&MonitorConfig> for MonitorSettings {
    fn from(config: &MonitorConfig) -> Self {
        Self {
            cool_down: config.cool_down(),
            max_body_len: config.max_body_len,
            max_concurrent_accounts: config.max_concurrent_accounts,
            review_search: config.review_search,
        }
    }
}

/// 事件被丢弃的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// 不处理的 reason / subject 类型
    UnhandledType,
    Stale(StaleReason),
    /// 条目由接收者本人创建
    SelfAuthored,
    /// 接收者提及了自己
    SelfMention,
    /// 接收者已经回复
    AlreadyReplied,
    /// 冷却期内已投递过
    Suppressed,
}

/// 单个事件的处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    Delivered,
    Dropped(DropReason),
    /// 渠道未送达（失败或 dry-run），未写入 ledger，下一轮会重试
    Undelivered(String),
    /// 拉取或解析失败，本轮跳过
    Failed(String),
}

/// 单个账号的处理报告
#[derive(Debug, Clone)]
pub struct AccountReport {
    pub recipient_id: RecipientId,
    pub username: String,
    pub outcomes: Vec<EventOutcome>,
    /// 账号级失败（如拉取通知列表失败）
    pub error: Option<String>,
}

impl AccountReport {
    fn new(account: &MonitoredAccount) -> Self {
        Self {
            recipient_id: account.recipient_id,
            username: account.username.clone(),
            outcomes: Vec::new(),
            error: None,
        }
    }

    pub fn delivered(&self) -> usize {
        self.count(|o| matches!(o, EventOutcome::Delivered))
    }

    pub fn dropped(&self, reason: DropReason) -> usize {
        self.count(|o| *o == EventOutcome::Dropped(reason))
    }

    pub fn undelivered(&self) -> usize {
        self.count(|o| matches!(o, EventOutcome::Undelivered(_)))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, EventOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&EventOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|o| pred(o)).count()
    }
}

/// 一个周期的处理报告
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// 清理的 ledger 记录数
    pub swept: usize,
    pub sweep_error: Option<String>,
    pub accounts: Vec<AccountReport>,
    /// 因关闭信号而未处理的账号数
    pub skipped_accounts: usize,
}

impl CycleReport {
    pub fn delivered(&self) -> usize {
        self.accounts.iter().map(AccountReport::delivered).sum()
    }

    pub fn suppressed(&self) -> usize {
        self.accounts
            .iter()
            .map(|a| a.dropped(DropReason::Suppressed))
            .sum()
    }

    pub fn failed_accounts(&self) -> usize {
        self.accounts.iter().filter(|a| a.error.is_some()).count()
    }

    pub fn account(&self, username: &str) -> Option<&AccountReport> {
        self.accounts.iter().find(|a| a.username == username)
    }
}

impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "swept {} expired ledger entries", self.swept)?;
        for account in &self.accounts {
            match &account.error {
                Some(error) => writeln!(
                    f,
                    "{} (chat {}): failed: {}",
                    account.username, account.recipient_id, error
                )?,
                None => writeln!(
                    f,
                    "{} (chat {}): {} events, {} delivered, {} suppressed, {} undelivered, {} failed",
                    account.username,
                    account.recipient_id,
                    account.outcomes.len(),
                    account.delivered(),
                    account.dropped(DropReason::Suppressed),
                    account.undelivered(),
                    account.failed()
                )?,
            }
        }
        if self.skipped_accounts > 0 {
            writeln!(f, "{} accounts skipped (shutdown)", self.skipped_accounts)?;
        }
        Ok(())
    }
}

/// 周期编排器
pub struct Monitor {
    sources: Arc<dyn SourceFactory>,
    ledger: Arc<dyn Ledger>,
    sink: Arc<dyn MessageSink>,
    gate: RenotifyGate,
    classifier: NotificationClassifier,
    settings: MonitorSettings,
}

impl Monitor {
    pub fn new(
        sources: Arc<dyn SourceFactory>,
        ledger: Arc<dyn Ledger>,
        sink: Arc<dyn MessageSink>,
        settings: MonitorSettings,
    ) -> Self {
        Self {
            sources,
            ledger,
            sink,
            gate: RenotifyGate::new(settings.cool_down),
            classifier: NotificationClassifier::new(settings.max_body_len),
            settings,
        }
    }

    pub fn settings(&self) -> &MonitorSettings {
        &self.settings
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.ledger
    }

    /// 只执行 ledger 清理
    pub async fn sweep(&self) -> anyhow::Result<usize> {
        retention::sweep(self.ledger.as_ref(), self.settings.cool_down).await
    }

    /// 执行一个完整周期
    ///
    /// 收到关闭信号后不再开始新的账号处理；清理和已开始的投递会完成。
    pub async fn run_cycle(
        &self,
        accounts: &[MonitoredAccount],
        shutdown: &watch::Receiver<bool>,
    ) -> CycleReport {
        let started = Instant::now();
        let mut report = CycleReport::default();

        // 先清理，避免刚过期的记录在本轮误抑制
        match self.sweep().await {
            Ok(removed) => report.swept = removed,
            Err(e) => {
                warn!(error = %e, "Ledger sweep failed");
                report.sweep_error = Some(e.to_string());
            }
        }

        let active: Vec<&MonitoredAccount> = accounts.iter().filter(|a| a.is_active).collect();
        let tasks: Vec<_> = active
            .into_iter()
            .map(|account| async move {
                let stopping = *shutdown.borrow();
                if stopping {
                    debug!(account = %account.username, "Shutdown requested, skipping account");
                    return None;
                }
                Some(self.process_account(account).await)
            })
            .collect();
        let results: Vec<Option<AccountReport>> = stream::iter(tasks)
            .buffer_unordered(self.settings.max_concurrent_accounts.max(1))
            .collect()
            .await;

        for result in results {
            match result {
                Some(account_report) => report.accounts.push(account_report),
                None => report.skipped_accounts += 1,
            }
        }

        info!(
            accounts = report.accounts.len(),
            delivered = report.delivered(),
            suppressed = report.suppressed(),
            failed_accounts = report.failed_accounts(),
            swept = report.swept,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Poll cycle finished"
        );
        report
    }

    /// 处理单个账号：账号级失败被隔离在报告中
    pub async fn process_account(&self, account: &MonitoredAccount) -> AccountReport {
        let mut report = AccountReport::new(account);

        let source = match self.sources.connect(account) {
            Ok(source) => source,
            Err(e) => {
                warn!(account = %account.username, error = %e, "Failed to create event source");
                report.error = Some(e.to_string());
                return report;
            }
        };

        let events = match source.list_unread_events().await {
            Ok(events) => events,
            Err(e) => {
                warn!(account = %account.username, error = %e, "Failed to list notifications");
                report.error = Some(e.to_string());
                return report;
            }
        };
        debug!(account = %account.username, count = events.len(), "Fetched unread notifications");

        let mut cache = CommentCache::new();
        for event in &events {
            let outcome = self
                .process_event(source.as_ref(), account, event, &mut cache)
                .await;
            debug!(account = %account.username, event_id = %event.id, outcome = ?outcome, "Event processed");
            report.outcomes.push(outcome);
        }

        if self.settings.review_search {
            match source.search_review_requests(&account.username).await {
                Ok(requests) => {
                    for request in &requests {
                        let alert = self.classifier.classify_review_request(request);
                        let outcome = self.gate_and_deliver(account, alert).await;
                        report.outcomes.push(outcome);
                    }
                }
                Err(e) => {
                    warn!(account = %account.username, error = %e, "Review request search failed");
                    report.outcomes.push(EventOutcome::Failed(e.to_string()));
                }
            }
        }

        report
    }

    async fn process_event(
        &self,
        source: &dyn EventSource,
        account: &MonitoredAccount,
        event: &RawEvent,
        cache: &mut CommentCache,
    ) -> EventOutcome {
        if alert_kind(event.reason).is_none() || !is_supported_subject(event.subject_kind) {
            return EventOutcome::Dropped(DropReason::UnhandledType);
        }

        let resolution = match resolve(source, event, &account.username).await {
            Ok(resolution) => resolution,
            Err(e) => {
                warn!(account = %account.username, event_id = %event.id, error = %e, "Failed to resolve notification");
                return EventOutcome::Failed(e.to_string());
            }
        };

        let detail = match resolution {
            Resolution::Actionable(detail) => detail,
            Resolution::Stale(reason) => {
                self.acknowledge(source, account, event).await;
                return EventOutcome::Dropped(DropReason::Stale(reason));
            }
            Resolution::SelfAuthored(_) => {
                self.acknowledge(source, account, event).await;
                return EventOutcome::Dropped(DropReason::SelfAuthored);
            }
        };

        let classification = match self
            .classifier
            .classify(source, event, &detail, &account.username, cache)
            .await
        {
            Ok(classification) => classification,
            // 引用的评论已被删除
            Err(e) if e.is_not_found() => {
                self.acknowledge(source, account, event).await;
                return EventOutcome::Dropped(DropReason::Stale(StaleReason::NotFound));
            }
            Err(e) => {
                warn!(account = %account.username, event_id = %event.id, error = %e, "Failed to classify notification");
                return EventOutcome::Failed(e.to_string());
            }
        };

        match classification {
            Classification::Alert(alert) => self.gate_and_deliver(account, alert).await,
            Classification::AlreadyReplied => {
                self.acknowledge(source, account, event).await;
                EventOutcome::Dropped(DropReason::AlreadyReplied)
            }
            Classification::SelfMention => {
                self.acknowledge(source, account, event).await;
                EventOutcome::Dropped(DropReason::SelfMention)
            }
            Classification::Unhandled => EventOutcome::Dropped(DropReason::UnhandledType),
        }
    }

    /// 门控 → 投递 → 记录
    async fn gate_and_deliver(&self, account: &MonitoredAccount, alert: Alert) -> EventOutcome {
        let key = LedgerKey::for_alert(account.recipient_id, &alert);

        match self.gate.should_deliver(self.ledger.as_ref(), &key).await {
            Ok(true) => {}
            Ok(false) => return EventOutcome::Dropped(DropReason::Suppressed),
            Err(e) => {
                warn!(account = %account.username, url = %alert.url, error = %e, "Ledger lookup failed");
                return EventOutcome::Failed(e.to_string());
            }
        }

        let result = match self.sink.deliver(account.recipient_id, &alert).await {
            Ok(result) => result,
            Err(e) => SendResult::Failed(e.to_string()),
        };

        match result {
            SendResult::Sent => {
                if let Err(e) = self.ledger.record_delivery(&key, Utc::now()).await {
                    warn!(url = %alert.url, error = %e, "Delivered but failed to record in ledger");
                }
                info!(
                    account = %account.username,
                    chat_id = account.recipient_id,
                    kind = %alert.kind,
                    url = %alert.url,
                    "Notification delivered"
                );
                EventOutcome::Delivered
            }
            SendResult::Skipped(reason) => {
                debug!(sink = self.sink.name(), url = %alert.url, reason = %reason, "Delivery skipped");
                EventOutcome::Undelivered(reason)
            }
            SendResult::Failed(reason) => {
                warn!(
                    sink = self.sink.name(),
                    chat_id = account.recipient_id,
                    url = %alert.url,
                    error = %reason,
                    "Delivery failed"
                );
                EventOutcome::Undelivered(reason)
            }
        }
    }

    /// 上游标记已读；失败只记录日志
    async fn acknowledge(&self, source: &dyn EventSource, account: &MonitoredAccount, event: &RawEvent) {
        if let Err(e) = source.mark_consumed(&event.id).await {
            warn!(account = %account.username, event_id = %event.id, error = %e, "Failed to mark notification as read");
        }
    }
}
