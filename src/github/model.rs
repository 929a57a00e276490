//! GitHub 领域模型
//!
//! 只保留分类引擎需要的字段，API 原始响应的反序列化在 `client` 中完成。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::reference;
use crate::error::SourceError;

/// 通知产生的原因（GitHub notifications API 的 `reason` 字段）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reason {
    ApprovalRequested,
    Assign,
    Author,
    CiActivity,
    Comment,
    Invitation,
    Manual,
    Mention,
    ReviewRequested,
    SecurityAlert,
    StateChange,
    Subscribed,
    TeamMention,
    /// 新增的、尚未支持的 reason
    #[serde(other)]
    Unknown,
}

/// 通知主体类型（`subject.type`）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SubjectKind {
    Issue,
    PullRequest,
    Commit,
    Release,
    Discussion,
    CheckSuite,
    RepositoryVulnerabilityAlert,
    #[serde(other)]
    Unknown,
}

impl SubjectKind {
    /// 用于消息文本的名称
    pub fn label(&self) -> &'static str {
        match self {
            SubjectKind::Issue => "issue",
            SubjectKind::PullRequest => "pull request",
            SubjectKind::Commit => "commit",
            SubjectKind::Release => "release",
            SubjectKind::Discussion => "discussion",
            SubjectKind::CheckSuite => "check suite",
            SubjectKind::RepositoryVulnerabilityAlert => "vulnerability alert",
            SubjectKind::Unknown => "item",
        }
    }
}

/// 仓库引用 owner/name
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

impl RepoRef {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// 指向某个 issue / PR 的引用
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubjectRef {
    pub repo: RepoRef,
    pub number: u64,
}

impl fmt::Display for SubjectRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.repo, self.number)
    }
}

/// 评论引用，根据 URL 路径区分 issue 评论和 PR review 评论
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommentRef {
    Issue { id: u64 },
    Review { id: u64 },
}

impl CommentRef {
    pub fn id(&self) -> u64 {
        match self {
            CommentRef::Issue { id } | CommentRef::Review { id } => *id,
        }
    }
}

/// 上游未读通知
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// 通知线程 ID（用于标记已读）
    pub id: String,
    pub reason: Reason,
    pub subject_kind: SubjectKind,
    pub repo: RepoRef,
    pub title: String,
    /// 主体的 API URL，如 `https://api.github.com/repos/o/r/issues/42`
    pub subject_url: String,
    pub latest_comment_url: Option<String>,
}

impl RawEvent {
    /// 解析主体引用
    pub fn subject_ref(&self) -> Result<SubjectRef, SourceError> {
        let number = reference::parse_item_number(&self.subject_url)?;
        Ok(SubjectRef {
            repo: self.repo.clone(),
            number,
        })
    }

    /// 解析触发通知的评论，`None` 表示提及发生在描述里
    pub fn comment_ref(&self) -> Result<Option<CommentRef>, SourceError> {
        match &self.latest_comment_url {
            Some(url) => reference::parse_comment_ref(url, &self.subject_url),
            None => Ok(None),
        }
    }
}

/// issue / PR 状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemState {
    Open,
    Closed,
}

/// 条目的当前状态（每轮重新拉取，不跨轮缓存）
#[derive(Debug, Clone, PartialEq)]
pub struct ItemDetail {
    pub state: ItemState,
    /// 仅 PR 有意义
    pub merged: bool,
    pub author: String,
    pub body: String,
    pub html_url: String,
}

/// issue 评论或 PR review 评论
#[derive(Debug, Clone, PartialEq)]
pub struct Comment {
    pub id: u64,
    pub author: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
}

/// 搜索得到的待 review PR
#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRequest {
    pub repo: RepoRef,
    pub number: u64,
    pub title: String,
    pub author: String,
    pub html_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(latest_comment_url: Option<&str>) -> RawEvent {
        RawEvent {
            id: "1".to_string(),
            reason: Reason::Mention,
            subject_kind: SubjectKind::Issue,
            repo: RepoRef::new("octo", "repo"),
            title: "Bug".to_string(),
            subject_url: "https://api.github.com/repos/octo/repo/issues/42".to_string(),
            latest_comment_url: latest_comment_url.map(String::from),
        }
    }

    #[test]
    fn test_reason_deserialize() {
        let r: Reason = serde_json::from_str("\"review_requested\"").unwrap();
        assert_eq!(r, Reason::ReviewRequested);
        let r: Reason = serde_json::from_str("\"member_feature_requested\"").unwrap();
        assert_eq!(r, Reason::Unknown);
    }

    #[test]
    fn test_subject_kind_deserialize() {
        let k: SubjectKind = serde_json::from_str("\"PullRequest\"").unwrap();
        assert_eq!(k, SubjectKind::PullRequest);
        let k: SubjectKind = serde_json::from_str("\"WorkflowRun\"").unwrap();
        assert_eq!(k, SubjectKind::Unknown);
    }

    #[test]
    fn test_raw_event_refs() {
        let e = event(Some(
            "https://api.github.com/repos/octo/repo/issues/comments/777",
        ));
        assert_eq!(e.subject_ref().unwrap().to_string(), "octo/repo#42");
        assert_eq!(e.comment_ref().unwrap(), Some(CommentRef::Issue { id: 777 }));

        assert_eq!(event(None).comment_ref().unwrap(), None);
    }
}
