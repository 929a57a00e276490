//! GitHub API URL parsing
//!
//! Notifications only carry API URLs for their subject and latest comment, so
//! item numbers and comment ids are recovered from the URL path.

use regex::Regex;
use std::sync::OnceLock;

use super::model::{CommentRef, RepoRef};
use crate::error::SourceError;

fn item_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/repos/[^/]+/[^/]+/(?:issues|pulls)/(\d+)/?$").expect("valid item url regex")
    })
}

fn comment_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"/repos/[^/]+/[^/]+/(issues|pulls)/comments/(\d+)/?$")
            .expect("valid comment url regex")
    })
}

/// Extract the issue / pull request number from a subject API URL
pub fn parse_item_number(url: &str) -> Result<u64, SourceError> {
    item_url_re()
        .captures(url)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(|| SourceError::malformed("subject url", url))
}

/// Classify a `latest_comment_url`
///
/// - equal to the subject URL, or no `/comments/` segment: the mention lives in
///   the description, returns `None`
/// - `/issues/comments/{id}`: issue comment
/// - `/pulls/comments/{id}`: review comment
/// - anything else with `/comments/`: malformed
pub fn parse_comment_ref(url: &str, subject_url: &str) -> Result<Option<CommentRef>, SourceError> {
    if url == subject_url || !url.contains("/comments/") {
        return Ok(None);
    }

    let caps = comment_url_re()
        .captures(url)
        .ok_or_else(|| SourceError::malformed("comment url", url))?;
    let id: u64 = caps[2]
        .parse()
        .map_err(|_| SourceError::malformed("comment id", url))?;

    match &caps[1] {
        "issues" => Ok(Some(CommentRef::Issue { id })),
        _ => Ok(Some(CommentRef::Review { id })),
    }
}

/// Parse `https://api.github.com/repos/{owner}/{repo}` into a repo reference
pub fn parse_repository_url(url: &str) -> Result<RepoRef, SourceError> {
    let mut parts = url.trim_end_matches('/').rsplit('/');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(name), Some(owner), Some("repos")) if !name.is_empty() && !owner.is_empty() => {
            Ok(RepoRef::new(owner, name))
        }
        _ => Err(SourceError::malformed("repository url", url)),
    }
}
