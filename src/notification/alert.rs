//! 候选通知

use serde::{Deserialize, Serialize};
use std::fmt;

use super::fingerprint::Fingerprint;

/// 本系统处理的通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    Mention,
    ReviewRequested,
}

impl AlertKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertKind::Mention => "mention",
            AlertKind::ReviewRequested => "review_requested",
        }
    }

    /// 展示用标题，如 "Review Requested"
    pub fn title(&self) -> &'static str {
        match self {
            AlertKind::Mention => "Mention",
            AlertKind::ReviewRequested => "Review Requested",
        }
    }

    pub fn emoji(&self) -> &'static str {
        match self {
            AlertKind::Mention => "💬",
            AlertKind::ReviewRequested => "👀",
        }
    }
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 分类器输出，只在单轮内存在
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alert {
    pub kind: AlertKind,
    /// 已渲染的消息（已截断），决定指纹
    pub message: String,
    /// 条目的网页链接
    pub url: String,
}

impl Alert {
    pub fn new(kind: AlertKind, message: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            url: url.into(),
        }
    }

    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of(&self.message)
    }
}
