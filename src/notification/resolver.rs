//! 相关性判定
//!
//! 对每个原始通知重新拉取 issue / PR 的当前状态，判断：
//! - 已关闭 / 已合并 / 已删除 → stale
//! - 作者就是接收者本人 → self-authored
//! - 其余 → actionable，携带拉取到的详情进入分类

use tracing::debug;

use crate::error::SourceError;
use crate::github::model::{ItemDetail, ItemState, RawEvent, SubjectKind};
use crate::github::source::EventSource;

/// 条目不再需要处理的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaleReason {
    /// 已删除或无权访问
    NotFound,
    Closed,
    Merged,
}

/// 判定结果
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    Stale(StaleReason),
    SelfAuthored(ItemDetail),
    Actionable(ItemDetail),
}

impl Resolution {
    /// 是否需要在上游标记已读（永远不会再变成可处理状态）
    pub fn should_acknowledge(&self) -> bool {
        !matches!(self, Resolution::Actionable(_))
    }
}

/// GitHub 登录名不区分大小写
pub fn same_login(a: &str, b: &str) -> bool {
    !a.is_empty() && a.eq_ignore_ascii_case(b)
}

/// 判定单个通知的相关性
///
/// 非 404 的拉取失败原样返回，调用方本轮跳过该事件，不标记已读。
pub async fn resolve(
    source: &dyn EventSource,
    event: &RawEvent,
    recipient_username: &str,
) -> Result<Resolution, SourceError> {
    let subject = event.subject_ref()?;

    let fetched = match event.subject_kind {
        SubjectKind::Issue => source.get_issue(&subject.repo, subject.number).await,
        SubjectKind::PullRequest => source.get_pull_request(&subject.repo, subject.number).await,
        SubjectKind::Commit
        | SubjectKind::Release
        | SubjectKind::Discussion
        | SubjectKind::CheckSuite
        | SubjectKind::RepositoryVulnerabilityAlert
        | SubjectKind::Unknown => {
            return Err(SourceError::malformed(
                "subject type",
                format!("{:?} cannot be resolved", event.subject_kind),
            ))
        }
    };

    let detail = match fetched {
        Ok(detail) => detail,
        Err(e) if e.is_not_found() => {
            debug!(subject = %subject, "Subject not found, treating as stale");
            return Ok(Resolution::Stale(StaleReason::NotFound));
        }
        Err(e) => return Err(e),
    };

    if detail.merged {
        return Ok(Resolution::Stale(StaleReason::Merged));
    }
    if detail.state == ItemState::Closed {
        return Ok(Resolution::Stale(StaleReason::Closed));
    }
    if same_login(&detail.author, recipient_username) {
        return Ok(Resolution::SelfAuthored(detail));
    }
    Ok(Resolution::Actionable(detail))
}
