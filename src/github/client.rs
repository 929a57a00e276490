//! GitHub REST API 客户端
//!
//! 每个被监控账号一个实例，使用该账号自己的 token。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

use super::model::{
    Comment, CommentRef, ItemDetail, ItemState, RawEvent, Reason, RepoRef, ReviewRequest,
    SubjectKind,
};
use super::reference;
use super::source::{CredentialVerifier, EventSource, SourceFactory};
use crate::error::SourceError;
use crate::registry::MonitoredAccount;

/// GitHub API 默认地址
pub const DEFAULT_API_URL: &str = "https://api.github.com";

const USER_AGENT: &str = concat!("gh-notify-monitor/", env!("CARGO_PKG_VERSION"));

/// 分页上限，避免异常情况下无限翻页
const MAX_PAGES: usize = 10;

/// 客户端配置
#[derive(Debug, Clone)]
pub struct GitHubConfig {
    /// API 基础 URL（支持 GitHub Enterprise）
    pub api_url: String,
    /// 请求超时（秒）
    pub timeout_secs: u64,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ApiUser {
    login: String,
}

#[derive(Debug, Deserialize)]
struct ApiNotification {
    id: String,
    reason: Reason,
    subject: ApiSubject,
    repository: ApiRepository,
}

#[derive(Debug, Deserialize)]
struct ApiSubject {
    title: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    latest_comment_url: Option<String>,
    #[serde(rename = "type")]
    kind: SubjectKind,
}

#[derive(Debug, Deserialize)]
struct ApiRepository {
    name: String,
    owner: ApiUser,
}

#[derive(Debug, Deserialize)]
struct ApiItem {
    state: ItemState,
    #[serde(default)]
    merged: Option<bool>,
    #[serde(default)]
    user: Option<ApiUser>,
    #[serde(default)]
    body: Option<String>,
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct ApiComment {
    id: u64,
    #[serde(default)]
    user: Option<ApiUser>,
    #[serde(default)]
    body: Option<String>,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct ApiSearchResult {
    items: Vec<ApiSearchItem>,
}

#[derive(Debug, Deserialize)]
struct ApiSearchItem {
    number: u64,
    title: String,
    html_url: String,
    repository_url: String,
    #[serde(default)]
    user: Option<ApiUser>,
}

impl From<ApiItem> for ItemDetail {
    fn from(item: ApiItem) -> Self {
        Self {
            state: item.state,
            merged: item.merged.unwrap_or(false),
            author: item.user.map(|u| u.login).unwrap_or_default(),
            body: item.body.unwrap_or_default(),
            html_url: item.html_url,
        }
    }
}

impl From<ApiComment> for Comment {
    fn from(c: ApiComment) -> Self {
        Self {
            id: c.id,
            author: c.user.map(|u| u.login).unwrap_or_default(),
            body: c.body.unwrap_or_default(),
            created_at: c.created_at,
        }
    }
}

impl From<ApiNotification> for RawEvent {
    fn from(n: ApiNotification) -> Self {
        Self {
            id: n.id,
            reason: n.reason,
            subject_kind: n.subject.kind,
            repo: RepoRef::new(n.repository.owner.login, n.repository.name),
            title: n.subject.title,
            subject_url: n.subject.url.unwrap_or_default(),
            latest_comment_url: n.subject.latest_comment_url,
        }
    }
}

/// 单账号 GitHub 客户端
pub struct GitHubClient {
    client: Client,
    api_url: String,
    token: String,
}

impl GitHubClient {
    /// 创建客户端
    pub fn new(token: impl Into<String>, config: &GitHubConfig) -> Result<Self, SourceError> {
        let token = token.into();
        if token.is_empty() {
            return Err(SourceError::malformed("credential", "empty token"));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SourceError::transient("build http client", e.to_string()))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.api_url, path)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(header::AUTHORIZATION, format!("Bearer {}", self.token))
            .header(header::ACCEPT, "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28")
    }

    /// 发送请求并把 HTTP 状态映射为错误类型
    async fn send(&self, builder: RequestBuilder, operation: &str) -> Result<Response, SourceError> {
        let response = self
            .authorized(builder)
            .send()
            .await
            .map_err(|e| SourceError::transient(operation, e.to_string()))?;

        check_status(response.status(), operation)?;
        Ok(response)
    }

    async fn decode<T: DeserializeOwned>(response: Response, operation: &str) -> Result<T, SourceError> {
        response
            .json()
            .await
            .map_err(|e| SourceError::malformed(format!("response of {}", operation), e.to_string()))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, operation: &str) -> Result<T, SourceError> {
        let response = self.send(self.client.get(self.url(path)), operation).await?;
        Self::decode(response, operation).await
    }

    /// 按 Link 头翻页读取列表
    async fn get_paginated<T: DeserializeOwned>(
        &self,
        first: RequestBuilder,
        operation: &str,
    ) -> Result<Vec<T>, SourceError> {
        let mut items = Vec::new();
        let mut response = self.send(first, operation).await?;

        for page in 1..=MAX_PAGES {
            let next = response
                .headers()
                .get(header::LINK)
                .and_then(|v| v.to_str().ok())
                .and_then(next_link);
            let mut batch: Vec<T> = Self::decode(response, operation).await?;
            items.append(&mut batch);

            match next {
                Some(url) if page < MAX_PAGES => {
                    debug!(operation, page = page + 1, "Fetching next page");
                    response = self.send(self.client.get(url), operation).await?;
                }
                _ => break,
            }
        }

        Ok(items)
    }

    /// 获取 token 对应的登录名
    pub async fn authenticated_login(&self) -> Result<String, SourceError> {
        let user: ApiUser = self.get_json("/user", "GET /user").await?;
        Ok(user.login)
    }
}

/// 把非成功状态码映射为错误类型
/// 只有 2xx 可以继续解码；不发送条件请求，304 也按错误处理
fn check_status(status: StatusCode, operation: &str) -> Result<(), SourceError> {
    if status.is_success() {
        Ok(())
    } else {
        Err(status_error(status, operation))
    }
}

fn status_error(status: StatusCode, operation: &str) -> SourceError {
    match status {
        StatusCode::NOT_FOUND | StatusCode::GONE => SourceError::not_found(operation),
        _ => SourceError::transient(operation, format!("GitHub API returned {}", status)),
    }
}

/// 从 Link 头中取出 `rel="next"` 的 URL
fn next_link(link: &str) -> Option<String> {
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        if !params.split(';').any(|p| p.trim() == "rel=\"next\"") {
            return None;
        }
        let target = target.trim();
        target
            .strip_prefix('<')
            .and_then(|t| t.strip_suffix('>'))
            .map(String::from)
    })
}

#[async_trait]
impl EventSource for GitHubClient {
    async fn list_unread_events(&self) -> Result<Vec<RawEvent>, SourceError> {
        let request = self
            .client
            .get(self.url("/notifications"))
            .query(&[("per_page", "50")]);
        let notifications: Vec<ApiNotification> =
            self.get_paginated(request, "GET /notifications").await?;
        Ok(notifications.into_iter().map(RawEvent::from).collect())
    }

    async fn get_issue(&self, repo: &RepoRef, number: u64) -> Result<ItemDetail, SourceError> {
        let path = format!("/repos/{}/issues/{}", repo, number);
        let operation = format!("GET {}", path);
        let item: ApiItem = self.get_json(&path, &operation).await?;
        Ok(item.into())
    }

    async fn get_pull_request(&self, repo: &RepoRef, number: u64) -> Result<ItemDetail, SourceError> {
        let path = format!("/repos/{}/pulls/{}", repo, number);
        let operation = format!("GET {}", path);
        let item: ApiItem = self.get_json(&path, &operation).await?;
        Ok(item.into())
    }

    async fn list_comments(
        &self,
        repo: &RepoRef,
        number: u64,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Comment>, SourceError> {
        let path = format!("/repos/{}/issues/{}/comments", repo, number);
        let operation = format!("GET {}", path);
        let mut request = self.client.get(self.url(&path)).query(&[("per_page", "100")]);
        if let Some(since) = since {
            request = request.query(&[("since", since.to_rfc3339())]);
        }
        let comments: Vec<ApiComment> = self.get_paginated(request, &operation).await?;
        Ok(comments.into_iter().map(Comment::from).collect())
    }

    async fn get_comment(&self, repo: &RepoRef, comment: CommentRef) -> Result<Comment, SourceError> {
        let path = match comment {
            CommentRef::Issue { id } => format!("/repos/{}/issues/comments/{}", repo, id),
            CommentRef::Review { id } => format!("/repos/{}/pulls/comments/{}", repo, id),
        };
        let operation = format!("GET {}", path);
        let comment: ApiComment = self.get_json(&path, &operation).await?;
        Ok(comment.into())
    }

    async fn search_review_requests(&self, username: &str) -> Result<Vec<ReviewRequest>, SourceError> {
        let query = format!("review-requested:{} is:open is:pr", username);
        let request = self
            .client
            .get(self.url("/search/issues"))
            .query(&[("q", query.as_str()), ("per_page", "100")]);
        let response = self.send(request, "GET /search/issues").await?;
        let result: ApiSearchResult = Self::decode(response, "GET /search/issues").await?;

        result
            .items
            .into_iter()
            .map(|item| {
                Ok(ReviewRequest {
                    repo: reference::parse_repository_url(&item.repository_url)?,
                    number: item.number,
                    title: item.title,
                    author: item.user.map(|u| u.login).unwrap_or_default(),
                    html_url: item.html_url,
                })
            })
            .collect()
    }

    async fn mark_consumed(&self, event_id: &str) -> Result<(), SourceError> {
        let path = format!("/notifications/threads/{}", event_id);
        let operation = format!("PATCH {}", path);
        self.send(self.client.patch(self.url(&path)), &operation).await?;
        Ok(())
    }
}

/// 基于 token 创建 GitHubClient 的工厂
#[derive(Debug, Clone, Default)]
pub struct GitHubSourceFactory {
    config: GitHubConfig,
}

impl GitHubSourceFactory {
    pub fn new(config: GitHubConfig) -> Self {
        Self { config }
    }
}

impl SourceFactory for GitHubSourceFactory {
    fn connect(&self, account: &MonitoredAccount) -> Result<Box<dyn EventSource>, SourceError> {
        let client = GitHubClient::new(account.token.clone(), &self.config)?;
        Ok(Box::new(client))
    }
}

#[async_trait]
impl CredentialVerifier for GitHubSourceFactory {
    async fn verify(&self, token: &str) -> Result<String, SourceError> {
        GitHubClient::new(token, &self.config)?
            .authenticated_login()
            .await
    }
}
