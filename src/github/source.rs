//! 远端事件源抽象
//!
//! 分类引擎只依赖这里的 trait，HTTP / 认证细节在 `client` 中实现，
//! 测试可以用内存实现替换。

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::model::{Comment, CommentRef, ItemDetail, RawEvent, RepoRef, ReviewRequest};
use crate::error::SourceError;
use crate::registry::MonitoredAccount;

/// 单个账号的事件源（每个实例持有一个凭据）
#[async_trait]
pub trait EventSource: Send + Sync {
    /// 列出未读通知（内部处理分页）
    async fn list_unread_events(&self) -> Result<Vec<RawEvent>, SourceError>;

    async fn get_issue(&self, repo: &RepoRef, number: u64) -> Result<ItemDetail, SourceError>;

    async fn get_pull_request(&self, repo: &RepoRef, number: u64)
        -> Result<ItemDetail, SourceError>;

    /// 列出条目的 issue 评论，`since` 只返回该时间之后更新的评论
    async fn list_comments(
        &self,
        repo: &RepoRef,
        number: u64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Comment>, SourceError>;

    async fn get_comment(&self, repo: &RepoRef, comment: CommentRef)
        -> Result<Comment, SourceError>;

    /// 搜索仍然打开、且请求该用户 review 的 PR
    async fn search_review_requests(&self, username: &str)
        -> Result<Vec<ReviewRequest>, SourceError>;

    /// 在上游把通知标记为已读
    async fn mark_consumed(&self, event_id: &str) -> Result<(), SourceError>;
}

/// 为每个账号创建独立的事件源
pub trait SourceFactory: Send + Sync {
    fn connect(&self, account: &MonitoredAccount) -> Result<Box<dyn EventSource>, SourceError>;
}

/// 校验凭据，返回凭据所属的登录名
#[async_trait]
pub trait CredentialVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Result<String, SourceError>;
}
