//! 通知分类测试

mod common;

use common::*;
use gh_notify_monitor::github::Reason;
use gh_notify_monitor::notification::classifier::{
    render_comment_mention, render_description_mention, Classification, CommentCache,
    NotificationClassifier,
};
use gh_notify_monitor::notification::AlertKind;
use gh_notify_monitor::github::SubjectKind;
use std::sync::atomic::Ordering;

fn classifier() -> NotificationClassifier {
    NotificationClassifier::new(300)
}

fn expect_alert(classification: Classification) -> gh_notify_monitor::notification::Alert {
    match classification {
        Classification::Alert(alert) => alert,
        other => panic!("expected alert, got {:?}", other),
    }
}

// ==================== 描述中的提及 ====================

#[tokio::test]
async fn test_description_mention_produces_alert() {
    let detail = open_issue(42, "alice", "Could @bob take a look?");
    let source = FakeSource::new().with_item(42, detail.clone());
    let event = issue_mention("t1", 42, None);
    let mut cache = CommentCache::new();

    let alert = expect_alert(
        classifier()
            .classify(&source, &event, &detail, "bob", &mut cache)
            .await
            .unwrap(),
    );

    assert_eq!(alert.kind, AlertKind::Mention);
    assert_eq!(alert.url, html_issue_url(42));
    assert_eq!(
        alert.message,
        "📁 octo/widgets\n📝 Issue 42\n\n👤 alice mentioned you in the issue description:\n\nCould @bob take a look?"
    );
}

#[tokio::test]
async fn test_long_description_is_truncated() {
    let body = format!("@bob {}", "x".repeat(500));
    let detail = open_issue(42, "alice", &body);
    let source = FakeSource::new().with_item(42, detail.clone());
    let event = issue_mention("t1", 42, None);

    let alert = expect_alert(
        classifier()
            .classify(&source, &event, &detail, "bob", &mut CommentCache::new())
            .await
            .unwrap(),
    );

    let expected_body = format!("{}...", &body[..297]);
    assert_eq!(
        alert.message,
        render_description_mention(&repo(), "Issue 42", "alice", SubjectKind::Issue, &expected_body)
    );
}

#[tokio::test]
async fn test_self_mention_in_description() {
    let detail = open_issue(42, "bob", "@bob remember this");
    let source = FakeSource::new();
    let event = issue_mention("t1", 42, None);

    let result = classifier()
        .classify(&source, &event, &detail, "bob", &mut CommentCache::new())
        .await
        .unwrap();
    assert_eq!(result, Classification::SelfMention);
    assert!(result.should_acknowledge());
}

// ==================== 评论中的提及 ====================

#[tokio::test]
async fn test_comment_mention_produces_alert() {
    let detail = open_issue(42, "alice", "");
    let source = FakeSource::new().with_comments(
        42,
        vec![comment(555, "carol", "ping @bob", minutes_ago(5))],
    );
    let event = issue_mention("t1", 42, Some(api_issue_comment_url(555)));

    let alert = expect_alert(
        classifier()
            .classify(&source, &event, &detail, "bob", &mut CommentCache::new())
            .await
            .unwrap(),
    );
    assert_eq!(
        alert.message,
        render_comment_mention(&repo(), "Issue 42", "carol", "ping @bob")
    );
}

#[tokio::test]
async fn test_review_comment_reference_is_fetched_by_id() {
    let detail = open_pull(7, "alice");
    let mut source = FakeSource::new();
    source
        .comment_by_id
        .insert(901, comment(901, "carol", "@bob nit here", minutes_ago(3)));
    let mut event = issue_mention("t1", 7, None);
    event.subject_kind = SubjectKind::PullRequest;
    event.subject_url = api_pull_url(7);
    event.latest_comment_url =
        Some("https://api.github.com/repos/octo/widgets/pulls/comments/901".to_string());

    let alert = expect_alert(
        classifier()
            .classify(&source, &event, &detail, "bob", &mut CommentCache::new())
            .await
            .unwrap(),
    );
    assert!(alert.message.ends_with("👤 carol mentioned you in a comment:\n\n@bob nit here"));
    assert_eq!(alert.url, html_pull_url(7));
}

#[tokio::test]
async fn test_self_mention_in_comment() {
    let detail = open_issue(42, "alice", "");
    let source = FakeSource::new().with_comments(
        42,
        vec![comment(555, "bob", "cc @bob", minutes_ago(5))],
    );
    let event = issue_mention("t1", 42, Some(api_issue_comment_url(555)));

    let result = classifier()
        .classify(&source, &event, &detail, "bob", &mut CommentCache::new())
        .await
        .unwrap();
    assert_eq!(result, Classification::SelfMention);
}

#[tokio::test]
async fn test_malformed_comment_url_is_an_error() {
    let detail = open_issue(42, "alice", "");
    let source = FakeSource::new();
    let event = issue_mention(
        "t1",
        42,
        Some("https://api.github.com/repos/octo/widgets/commits/abc/comments/x".to_string()),
    );

    let err = classifier()
        .classify(&source, &event, &detail, "bob", &mut CommentCache::new())
        .await
        .unwrap_err();
    assert!(!err.is_transient());
    assert!(!err.is_not_found());
}

// ==================== 已回复抑制 ====================

#[tokio::test]
async fn test_reply_after_mention_suppresses() {
    let detail = open_issue(42, "alice", "");
    let source = FakeSource::new().with_comments(
        42,
        vec![
            comment(555, "carol", "ping @bob", minutes_ago(10)),
            comment(556, "bob", "on it", minutes_ago(2)),
        ],
    );
    let event = issue_mention("t1", 42, Some(api_issue_comment_url(555)));

    let result = classifier()
        .classify(&source, &event, &detail, "bob", &mut CommentCache::new())
        .await
        .unwrap();
    assert_eq!(result, Classification::AlreadyReplied);
    assert!(result.should_acknowledge());
}

#[tokio::test]
async fn test_reply_before_mention_does_not_suppress() {
    let detail = open_issue(42, "alice", "");
    let source = FakeSource::new().with_comments(
        42,
        vec![
            comment(550, "bob", "earlier thoughts", minutes_ago(30)),
            comment(555, "carol", "ping @bob", minutes_ago(10)),
        ],
    );
    let event = issue_mention("t1", 42, Some(api_issue_comment_url(555)));

    let result = classifier()
        .classify(&source, &event, &detail, "bob", &mut CommentCache::new())
        .await
        .unwrap();
    assert!(matches!(result, Classification::Alert(_)));
}

#[tokio::test]
async fn test_any_reply_suppresses_description_mention() {
    let detail = open_issue(42, "alice", "@bob thoughts?");
    let source = FakeSource::new().with_comments(
        42,
        vec![comment(560, "bob", "looks good", minutes_ago(1))],
    );
    let event = issue_mention("t1", 42, None);

    let result = classifier()
        .classify(&source, &event, &detail, "bob", &mut CommentCache::new())
        .await
        .unwrap();
    assert_eq!(result, Classification::AlreadyReplied);
}

#[tokio::test]
async fn test_comment_list_is_cached_per_item() {
    let detail = open_issue(42, "alice", "");
    let source = FakeSource::new().with_comments(
        42,
        vec![
            comment(555, "carol", "ping @bob", minutes_ago(10)),
            comment(557, "dave", "also @bob", minutes_ago(5)),
        ],
    );
    let mut cache = CommentCache::new();
    let c = classifier();

    c.classify(&source, &issue_mention("t1", 42, Some(api_issue_comment_url(555))), &detail, "bob", &mut cache)
        .await
        .unwrap();
    c.classify(&source, &issue_mention("t2", 42, Some(api_issue_comment_url(557))), &detail, "bob", &mut cache)
        .await
        .unwrap();

    assert_eq!(source.comment_list_fetches.load(Ordering::SeqCst), 1);
    assert_eq!(cache.len(), 1);
}

// ==================== review 请求 ====================

#[tokio::test]
async fn test_review_request_names_author() {
    let detail = open_pull(7, "alice");
    let source = FakeSource::new();
    let event = review_requested("t1", 7);

    let alert = expect_alert(
        classifier()
            .classify(&source, &event, &detail, "bob", &mut CommentCache::new())
            .await
            .unwrap(),
    );
    assert_eq!(alert.kind, AlertKind::ReviewRequested);
    assert_eq!(
        alert.message,
        "📁 octo/widgets\n📝 PR 7\n\n👀 alice requested your review on this pull request"
    );
    assert_eq!(alert.url, html_pull_url(7));
    // review 请求不需要拉取评论
    assert_eq!(source.comment_list_fetches.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_review_request_without_author_uses_generic_phrasing() {
    let detail = open_pull(7, "");
    let source = FakeSource::new();

    let alert = expect_alert(
        classifier()
            .classify(&source, &review_requested("t1", 7), &detail, "bob", &mut CommentCache::new())
            .await
            .unwrap(),
    );
    assert!(alert
        .message
        .ends_with("👀 Your review was requested on this pull request"));
}

#[tokio::test]
async fn test_other_reasons_are_unhandled() {
    let detail = open_issue(42, "alice", "");
    let source = FakeSource::new();
    for reason in [Reason::Subscribed, Reason::Comment, Reason::TeamMention, Reason::Unknown] {
        let mut event = issue_mention("t1", 42, None);
        event.reason = reason;
        let result = classifier()
            .classify(&source, &event, &detail, "bob", &mut CommentCache::new())
            .await
            .unwrap();
        assert_eq!(result, Classification::Unhandled);
        assert!(!result.should_acknowledge());
    }
}

#[tokio::test]
async fn test_identical_content_has_identical_fingerprint() {
    let detail = open_issue(42, "alice", "Could @bob take a look?");
    let source = FakeSource::new();
    let c = classifier();

    let first = expect_alert(
        c.classify(&source, &issue_mention("t1", 42, None), &detail, "bob", &mut CommentCache::new())
            .await
            .unwrap(),
    );
    let second = expect_alert(
        c.classify(&source, &issue_mention("t9", 42, None), &detail, "bob", &mut CommentCache::new())
            .await
            .unwrap(),
    );
    assert_eq!(first.fingerprint(), second.fingerprint());

    let mut edited = detail.clone();
    edited.body.push('!');
    let third = expect_alert(
        c.classify(&source, &issue_mention("t1", 42, None), &edited, "bob", &mut CommentCache::new())
            .await
            .unwrap(),
    );
    assert_ne!(first.fingerprint(), third.fingerprint());
}
