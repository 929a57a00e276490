//! GitHub 事件源
//!
//! `source` 定义远端适配器契约，`client` 是基于 REST API 的实现。

pub mod client;
pub mod model;
pub mod reference;
pub mod source;

pub use client::{GitHubClient, GitHubConfig, GitHubSourceFactory};
pub use model::{
    Comment, CommentRef, ItemDetail, ItemState, RawEvent, Reason, RepoRef, ReviewRequest,
    SubjectKind, SubjectRef,
};
pub use source::{CredentialVerifier, EventSource, SourceFactory};
