//! 测试共用的假事件源与记录型渠道

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use gh_notify_monitor::error::SourceError;
use gh_notify_monitor::github::{
    Comment, CommentRef, EventSource, ItemDetail, ItemState, RawEvent, Reason, RepoRef,
    ReviewRequest, SourceFactory, SubjectKind,
};
use gh_notify_monitor::notification::{Alert, MessageSink, SendResult};
use gh_notify_monitor::registry::{MonitoredAccount, RecipientId};

pub const OWNER: &str = "octo";
pub const REPO: &str = "widgets";

pub fn repo() -> RepoRef {
    RepoRef::new(OWNER, REPO)
}

pub fn api_issue_url(number: u64) -> String {
    format!("https://api.github.com/repos/{}/{}/issues/{}", OWNER, REPO, number)
}

pub fn api_pull_url(number: u64) -> String {
    format!("https://api.github.com/repos/{}/{}/pulls/{}", OWNER, REPO, number)
}

pub fn api_issue_comment_url(id: u64) -> String {
    format!("https://api.github.com/repos/{}/{}/issues/comments/{}", OWNER, REPO, id)
}

pub fn html_issue_url(number: u64) -> String {
    format!("https://github.com/{}/{}/issues/{}", OWNER, REPO, number)
}

pub fn html_pull_url(number: u64) -> String {
    format!("https://github.com/{}/{}/pull/{}", OWNER, REPO, number)
}

/// 对 issue 的提及通知
pub fn issue_mention(id: &str, number: u64, comment_url: Option<String>) -> RawEvent {
    RawEvent {
        id: id.to_string(),
        reason: Reason::Mention,
        subject_kind: SubjectKind::Issue,
        repo: repo(),
        title: format!("Issue {}", number),
        subject_url: api_issue_url(number),
        latest_comment_url: comment_url,
    }
}

/// 对 PR 的 review 请求通知
pub fn review_requested(id: &str, number: u64) -> RawEvent {
    RawEvent {
        id: id.to_string(),
        reason: Reason::ReviewRequested,
        subject_kind: SubjectKind::PullRequest,
        repo: repo(),
        title: format!("PR {}", number),
        subject_url: api_pull_url(number),
        latest_comment_url: Some(api_pull_url(number)),
    }
}

pub fn open_issue(number: u64, author: &str, body: &str) -> ItemDetail {
    ItemDetail {
        state: ItemState::Open,
        merged: false,
        author: author.to_string(),
        body: body.to_string(),
        html_url: html_issue_url(number),
    }
}

pub fn open_pull(number: u64, author: &str) -> ItemDetail {
    ItemDetail {
        state: ItemState::Open,
        merged: false,
        author: author.to_string(),
        body: String::new(),
        html_url: html_pull_url(number),
    }
}

pub fn comment(id: u64, author: &str, body: &str, created_at: DateTime<Utc>) -> Comment {
    Comment {
        id,
        author: author.to_string(),
        body: body.to_string(),
        created_at,
    }
}

pub fn minutes_ago(minutes: i64) -> DateTime<Utc> {
    Utc::now() - Duration::minutes(minutes)
}

pub fn account(recipient_id: RecipientId, username: &str) -> MonitoredAccount {
    MonitoredAccount {
        recipient_id,
        username: username.to_string(),
        token: format!("ghp_{}", username),
        is_active: true,
    }
}

/// 可编程的假 GitHub
#[derive(Default)]
pub struct FakeSource {
    pub events: Vec<RawEvent>,
    pub fail_listing: bool,
    /// 条目编号 → 详情；不存在时返回 NotFound
    pub items: HashMap<u64, ItemDetail>,
    /// 返回 Transient 错误的条目编号
    pub flaky_items: HashSet<u64>,
    /// 条目编号 → issue 评论列表
    pub comments: HashMap<u64, Vec<Comment>>,
    /// 评论 ID → 评论
    pub comment_by_id: HashMap<u64, Comment>,
    pub review_requests: Vec<ReviewRequest>,
    pub consumed: Mutex<Vec<String>>,
    pub item_fetches: AtomicUsize,
    pub comment_list_fetches: AtomicUsize,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_event(mut self, event: RawEvent) -> Self {
        self.events.push(event);
        self
    }

    pub fn with_item(mut self, number: u64, detail: ItemDetail) -> Self {
        self.items.insert(number, detail);
        self
    }

    pub fn with_comments(mut self, number: u64, comments: Vec<Comment>) -> Self {
        for c in &comments {
            self.comment_by_id.insert(c.id, c.clone());
        }
        self.comments.insert(number, comments);
        self
    }

    pub fn with_review_request(mut self, request: ReviewRequest) -> Self {
        self.review_requests.push(request);
        self
    }

    pub fn consumed(&self) -> Vec<String> {
        self.consumed.lock().unwrap().clone()
    }

    fn item(&self, number: u64) -> Result<ItemDetail, SourceError> {
        self.item_fetches.fetch_add(1, Ordering::SeqCst);
        if self.flaky_items.contains(&number) {
            return Err(SourceError::transient("get item", "502 Bad Gateway"));
        }
        self.items
            .get(&number)
            .cloned()
            .ok_or_else(|| SourceError::not_found(format!("item #{}", number)))
    }
}

#[async_trait]
impl EventSource for FakeSource {
    async fn list_unread_events(&self) -> Result<Vec<RawEvent>, SourceError> {
        if self.fail_listing {
            return Err(SourceError::transient("GET /notifications", "connection reset"));
        }
        Ok(self.events.clone())
    }

    async fn get_issue(&self, _repo: &RepoRef, number: u64) -> Result<ItemDetail, SourceError> {
        self.item(number)
    }

    async fn get_pull_request(&self, _repo: &RepoRef, number: u64) -> Result<ItemDetail, SourceError> {
        self.item(number)
    }

    async fn list_comments(
        &self,
        _repo: &RepoRef,
        number: u64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Comment>, SourceError> {
        self.comment_list_fetches.fetch_add(1, Ordering::SeqCst);
        let comments = self.comments.get(&number).cloned().unwrap_or_default();
        Ok(match since {
            Some(since) => comments.into_iter().filter(|c| c.created_at > since).collect(),
            None => comments,
        })
    }

    async fn get_comment(&self, _repo: &RepoRef, comment: CommentRef) -> Result<Comment, SourceError> {
        self.comment_by_id
            .get(&comment.id())
            .cloned()
            .ok_or_else(|| SourceError::not_found(format!("comment {}", comment.id())))
    }

    async fn search_review_requests(&self, _username: &str) -> Result<Vec<ReviewRequest>, SourceError> {
        Ok(self.review_requests.clone())
    }

    async fn mark_consumed(&self, event_id: &str) -> Result<(), SourceError> {
        self.consumed.lock().unwrap().push(event_id.to_string());
        Ok(())
    }
}

/// 共享同一个 FakeSource，使测试可以在周期结束后检查状态
struct SharedSource(Arc<FakeSource>);

#[async_trait]
impl EventSource for SharedSource {
    async fn list_unread_events(&self) -> Result<Vec<RawEvent>, SourceError> {
        self.0.list_unread_events().await
    }

    async fn get_issue(&self, repo: &RepoRef, number: u64) -> Result<ItemDetail, SourceError> {
        self.0.get_issue(repo, number).await
    }

    async fn get_pull_request(&self, repo: &RepoRef, number: u64) -> Result<ItemDetail, SourceError> {
        self.0.get_pull_request(repo, number).await
    }

    async fn list_comments(
        &self,
        repo: &RepoRef,
        number: u64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Comment>, SourceError> {
        self.0.list_comments(repo, number, since).await
    }

    async fn get_comment(&self, repo: &RepoRef, comment: CommentRef) -> Result<Comment, SourceError> {
        self.0.get_comment(repo, comment).await
    }

    async fn search_review_requests(&self, username: &str) -> Result<Vec<ReviewRequest>, SourceError> {
        self.0.search_review_requests(username).await
    }

    async fn mark_consumed(&self, event_id: &str) -> Result<(), SourceError> {
        self.0.mark_consumed(event_id).await
    }
}

/// 按用户名分发 FakeSource 的工厂
#[derive(Default)]
pub struct FakeFactory {
    sources: HashMap<String, Arc<FakeSource>>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_source(mut self, username: &str, source: FakeSource) -> Self {
        self.sources.insert(username.to_string(), Arc::new(source));
        self
    }

    pub fn source(&self, username: &str) -> Arc<FakeSource> {
        self.sources[username].clone()
    }
}

impl SourceFactory for FakeFactory {
    fn connect(&self, account: &MonitoredAccount) -> Result<Box<dyn EventSource>, SourceError> {
        match self.sources.get(&account.username) {
            Some(source) => Ok(Box::new(SharedSource(source.clone()))),
            None => Err(SourceError::transient("connect", "no fake source for account")),
        }
    }
}

/// 记录所有投递的渠道，可设置为失败
#[derive(Default)]
pub struct RecordingSink {
    pub delivered: Mutex<Vec<(RecipientId, Alert)>>,
    pub fail: bool,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    pub fn alerts(&self) -> Vec<(RecipientId, Alert)> {
        self.delivered.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageSink for RecordingSink {
    fn name(&self) -> &str {
        "recording"
    }

    async fn deliver(&self, recipient: RecipientId, alert: &Alert) -> Result<SendResult> {
        if self.fail {
            return Ok(SendResult::Failed("sink offline".to_string()));
        }
        self.delivered.lock().unwrap().push((recipient, alert.clone()));
        Ok(SendResult::Sent)
    }
}
