//! 通知分类器
//!
//! 把 (原始通知, 条目详情) 变成零或一条候选通知。消息的构造（字段顺序、
//! 前缀 emoji、截断）在这里决定，因此也决定了去重指纹。
//!
//! 消息格式：
//! ```text
//! 📁 owner/repo
//! 📝 标题
//!
//! 👤 alice mentioned you in a comment:
//!
//! 正文（超长截断）
//! ```

use std::collections::HashMap;
use tracing::debug;

use super::alert::{Alert, AlertKind};
use super::resolver::same_login;
use crate::error::SourceError;
use crate::github::model::{
    Comment, ItemDetail, RawEvent, Reason, RepoRef, ReviewRequest, SubjectKind, SubjectRef,
};
use crate::github::source::EventSource;

/// 默认正文最大长度（字符）
pub const DEFAULT_MAX_BODY_LEN: usize = 300;

const ELLIPSIS: &str = "...";

/// 分类结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Alert(Alert),
    /// 接收者已经在该条目上回复过
    AlreadyReplied,
    /// 接收者提及了自己
    SelfMention,
    /// 不处理的通知类型
    Unhandled,
}

impl Classification {
    /// 已回复 / 自我提及的通知不会再变化，可以在上游标记已读
    pub fn should_acknowledge(&self) -> bool {
        matches!(self, Classification::AlreadyReplied | Classification::SelfMention)
    }
}

/// reason → 通知类型；新增 reason 时这里必须显式处理
pub fn alert_kind(reason: Reason) -> Option<AlertKind> {
    match reason {
        Reason::Mention => Some(AlertKind::Mention),
        Reason::ReviewRequested => Some(AlertKind::ReviewRequested),
        Reason::ApprovalRequested
        | Reason::Assign
        | Reason::Author
        | Reason::CiActivity
        | Reason::Comment
        | Reason::Invitation
        | Reason::Manual
        | Reason::SecurityAlert
        | Reason::StateChange
        | Reason::Subscribed
        | Reason::TeamMention
        | Reason::Unknown => None,
    }
}

/// 只有 issue 和 PR 能被解析出详情
pub fn is_supported_subject(kind: SubjectKind) -> bool {
    match kind {
        SubjectKind::Issue | SubjectKind::PullRequest => true,
        SubjectKind::Commit
        | SubjectKind::Release
        | SubjectKind::Discussion
        | SubjectKind::CheckSuite
        | SubjectKind::RepositoryVulnerabilityAlert
        | SubjectKind::Unknown => false,
    }
}

/// 按字符截断，超长时保留 `max_len - 3` 个字符并追加 `...`
pub fn truncate_body(body: &str, max_len: usize) -> String {
    if body.chars().count() <= max_len {
        return body.to_string();
    }
    let keep = max_len.saturating_sub(ELLIPSIS.len());
    let mut truncated: String = body.chars().take(keep).collect();
    truncated.push_str(ELLIPSIS);
    truncated
}

/// 单账号单轮内的评论列表缓存
///
/// 同一条目的多个提及只拉取一次评论列表。
#[derive(Debug, Default)]
pub struct CommentCache {
    lists: HashMap<SubjectRef, Vec<Comment>>,
}

impl CommentCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn comments(
        &mut self,
        source: &dyn EventSource,
        subject: &SubjectRef,
    ) -> Result<&[Comment], SourceError> {
        if !self.lists.contains_key(subject) {
            let comments = source.list_comments(&subject.repo, subject.number, None).await?;
            self.lists.insert(subject.clone(), comments);
        }
        Ok(self.lists.get(subject).map(Vec::as_slice).unwrap_or_default())
    }

    pub fn len(&self) -> usize {
        self.lists.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lists.is_empty()
    }
}

/// 通知分类器
#[derive(Debug, Clone, Copy)]
pub struct NotificationClassifier {
    max_body_len: usize,
}

impl Default for NotificationClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_BODY_LEN)
    }
}

impl NotificationClassifier {
    pub fn new(max_body_len: usize) -> Self {
        Self { max_body_len }
    }

    pub fn max_body_len(&self) -> usize {
        self.max_body_len
    }

    /// 对已判定为 actionable 的通知进行分类
    pub async fn classify(
        &self,
        source: &dyn EventSource,
        event: &RawEvent,
        detail: &ItemDetail,
        recipient_username: &str,
        cache: &mut CommentCache,
    ) -> Result<Classification, SourceError> {
        match alert_kind(event.reason) {
            Some(AlertKind::ReviewRequested) => Ok(Classification::Alert(
                self.review_alert(event, detail),
            )),
            Some(AlertKind::Mention) => {
                self.classify_mention(source, event, detail, recipient_username, cache)
                    .await
            }
            None => Ok(Classification::Unhandled),
        }
    }

    fn review_alert(&self, event: &RawEvent, detail: &ItemDetail) -> Alert {
        let requester = match event.subject_kind {
            SubjectKind::PullRequest if !detail.author.is_empty() => Some(detail.author.as_str()),
            _ => None,
        };
        Alert::new(
            AlertKind::ReviewRequested,
            render_review(&event.repo, &event.title, requester),
            detail.html_url.clone(),
        )
    }

    async fn classify_mention(
        &self,
        source: &dyn EventSource,
        event: &RawEvent,
        detail: &ItemDetail,
        recipient_username: &str,
        cache: &mut CommentCache,
    ) -> Result<Classification, SourceError> {
        let subject = event.subject_ref()?;
        let origin = match event.comment_ref()? {
            Some(comment_ref) => Some(source.get_comment(&subject.repo, comment_ref).await?),
            None => None,
        };

        // 接收者在提及之后已经回复过（没有评论引用时，任何回复都算）
        let comments = cache.comments(source, &subject).await?;
        let replied = comments.iter().any(|c| {
            same_login(&c.author, recipient_username)
                && origin.as_ref().map_or(true, |o| c.created_at > o.created_at)
        });
        if replied {
            debug!(subject = %subject, "Recipient already replied, skipping mention");
            return Ok(Classification::AlreadyReplied);
        }

        let message = match origin {
            None => {
                if same_login(&detail.author, recipient_username) {
                    return Ok(Classification::SelfMention);
                }
                render_description_mention(
                    &event.repo,
                    &event.title,
                    &detail.author,
                    event.subject_kind,
                    &truncate_body(&detail.body, self.max_body_len),
                )
            }
            Some(comment) => {
                if same_login(&comment.author, recipient_username) {
                    return Ok(Classification::SelfMention);
                }
                render_comment_mention(
                    &event.repo,
                    &event.title,
                    &comment.author,
                    &truncate_body(&comment.body, self.max_body_len),
                )
            }
        };

        Ok(Classification::Alert(Alert::new(
            AlertKind::Mention,
            message,
            detail.html_url.clone(),
        )))
    }

    /// 搜索补充：直接由搜索结果生成 review 请求通知
    pub fn classify_review_request(&self, request: &ReviewRequest) -> Alert {
        let requester = Some(request.author.as_str()).filter(|a| !a.is_empty());
        Alert::new(
            AlertKind::ReviewRequested,
            render_review(&request.repo, &request.title, requester),
            request.html_url.clone(),
        )
    }
}

fn render_header(repo: &RepoRef, title: &str) -> String {
    format!("📁 {}\n📝 {}", repo, title)
}

/// review 请求消息
pub fn render_review(repo: &RepoRef, title: &str, requester: Option<&str>) -> String {
    let header = render_header(repo, title);
    match requester {
        Some(requester) => format!(
            "{}\n\n👀 {} requested your review on this pull request",
            header, requester
        ),
        None => format!("{}\n\n👀 Your review was requested on this pull request", header),
    }
}

/// 描述中提及的消息，`body` 需已截断
pub fn render_description_mention(
    repo: &RepoRef,
    title: &str,
    author: &str,
    kind: SubjectKind,
    body: &str,
) -> String {
    format!(
        "{}\n\n👤 {} mentioned you in the {} description:\n\n{}",
        render_header(repo, title),
        author,
        kind.label(),
        body
    )
}

/// 评论中提及的消息，`body` 需已截断
pub fn render_comment_mention(repo: &RepoRef, title: &str, commenter: &str, body: &str) -> String {
    format!(
        "{}\n\n👤 {} mentioned you in a comment:\n\n{}",
        render_header(repo, title),
        commenter,
        body
    )
}
