//! Telegram Bot API 渠道
//!
//! - `sendMessage`：先以 MarkdownV2 发送，被拒绝时降级为纯文本重试一次
//! - `getUpdates`：长轮询，供聊天命令使用

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::notification::alert::Alert;
use crate::notification::channel::{MessageSink, SendResult};
use crate::notification::formatter::{format_alert, format_alert_plain};
use crate::registry::RecipientId;

/// 默认 API 地址
pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

const PARSE_MODE_MARKDOWN_V2: &str = "MarkdownV2";

/// Telegram 客户端配置
#[derive(Debug, Clone)]
pub struct TelegramConfig {
    /// Bot token
    pub bot_token: String,
    /// API 地址（测试时可替换）
    pub api_url: String,
    /// 普通请求超时（秒）
    pub timeout_secs: u64,
}

impl TelegramConfig {
    pub fn new(bot_token: impl Into<String>) -> Self {
        Self {
            bot_token: bot_token.into(),
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: 30,
        }
    }
}

/// Telegram API 错误
#[derive(Debug, Error)]
pub enum TelegramError {
    /// API 返回 ok=false
    #[error("telegram rejected {method} ({code}): {description}")]
    Rejected {
        method: &'static str,
        code: i64,
        description: String,
    },
    /// 网络或解码失败
    #[error("telegram {method} failed: {message}")]
    Http { method: &'static str, message: String },
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

#[derive(Debug, Serialize)]
struct SendMessageRequest<'a> {
    chat_id: i64,
    text: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parse_mode: Option<&'a str>,
    disable_web_page_preview: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    reply_markup: Option<&'a InlineKeyboardMarkup>,
}

/// 内联按钮，点击后以 `callback_data` 回调
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboardButton {
    pub fn callback(text: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: data.into(),
        }
    }
}

/// 附在消息下方的内联键盘（按行排列）
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Serialize)]
struct GetUpdatesRequest {
    offset: i64,
    timeout: u64,
    allowed_updates: [&'static str; 2],
}

#[derive(Debug, Serialize)]
struct AnswerCallbackRequest<'a> {
    callback_query_id: &'a str,
}

/// 聊天
#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

/// 消息
#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

/// 内联按钮回调
#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    #[serde(default)]
    pub data: Option<String>,
    #[serde(default)]
    pub message: Option<Message>,
}

/// `getUpdates` 返回的单条更新
#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

/// Telegram Bot API 客户端
#[derive(Debug, Clone)]
pub struct TelegramClient {
    client: Client,
    api_url: String,
    bot_token: String,
}

impl TelegramClient {
    /// 创建客户端
    pub fn new(config: &TelegramConfig) -> Result<Self> {
        if config.bot_token.is_empty() {
            anyhow::bail!("telegram bot token is required");
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            api_url: config.api_url.trim_end_matches('/').to_string(),
            bot_token: config.bot_token.clone(),
        })
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.bot_token, method)
    }

    async fn call<B: Serialize + ?Sized, T: serde::de::DeserializeOwned>(
        &self,
        method: &'static str,
        body: &B,
        timeout: Option<Duration>,
    ) -> Result<T, TelegramError> {
        let mut request = self.client.post(self.method_url(method)).json(body);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        // reqwest 的错误信息会带上 URL（含 token），只保留错误类型
        let response = request.send().await.map_err(|e| TelegramError::Http {
            method,
            message: describe_reqwest_error(&e),
        })?;

        let status = response.status();
        let parsed: ApiResponse<T> = response.json().await.map_err(|e| TelegramError::Http {
            method,
            message: format!("invalid response (HTTP {}): {}", status, describe_reqwest_error(&e)),
        })?;

        match (parsed.ok, parsed.result) {
            (true, Some(result)) => Ok(result),
            (ok, _) => Err(TelegramError::Rejected {
                method,
                code: parsed.error_code.unwrap_or(status.as_u16() as i64),
                description: parsed.description.unwrap_or_else(|| {
                    if ok { "missing result".to_string() } else { "unknown error".to_string() }
                }),
            }),
        }
    }

    /// 发送消息，`parse_mode` 为 `None` 时按纯文本发送
    pub async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        parse_mode: Option<&str>,
    ) -> Result<(), TelegramError> {
        let body = SendMessageRequest {
            chat_id,
            text,
            parse_mode,
            disable_web_page_preview: true,
            reply_markup: None,
        };
        let _: serde_json::Value = self.call("sendMessage", &body, None).await?;
        Ok(())
    }

    /// 发送带内联键盘的纯文本消息
    pub async fn send_with_keyboard(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: &InlineKeyboardMarkup,
    ) -> Result<(), TelegramError> {
        let body = SendMessageRequest {
            chat_id,
            text,
            parse_mode: None,
            disable_web_page_preview: true,
            reply_markup: Some(keyboard),
        };
        let _: serde_json::Value = self.call("sendMessage", &body, None).await?;
        Ok(())
    }

    /// 以 MarkdownV2 发送，被 API 拒绝时降级为纯文本重试一次
    pub async fn send_markdown_or_plain(
        &self,
        chat_id: i64,
        markdown: &str,
        plain: &str,
    ) -> Result<(), TelegramError> {
        match self
            .send_message(chat_id, markdown, Some(PARSE_MODE_MARKDOWN_V2))
            .await
        {
            Ok(()) => Ok(()),
            Err(e @ TelegramError::Rejected { .. }) => {
                warn!(chat_id, error = %e, "MarkdownV2 rejected, retrying as plain text");
                self.send_message(chat_id, plain, None).await
            }
            Err(e) => Err(e),
        }
    }

    /// 长轮询获取更新
    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, TelegramError> {
        let body = GetUpdatesRequest {
            offset,
            timeout: timeout_secs,
            allowed_updates: ["message", "callback_query"],
        };
        // HTTP 超时要比服务端长轮询时间长
        let timeout = Duration::from_secs(timeout_secs + 10);
        self.call("getUpdates", &body, Some(timeout)).await
    }

    /// 回应按钮点击，清除客户端的 loading 状态
    pub async fn answer_callback_query(&self, callback_query_id: &str) -> Result<(), TelegramError> {
        let body = AnswerCallbackRequest { callback_query_id };
        let _: serde_json::Value = self.call("answerCallbackQuery", &body, None).await?;
        Ok(())
    }
}

fn describe_reqwest_error(e: &reqwest::Error) -> String {
    let kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection error"
    } else if e.is_decode() {
        "decode error"
    } else {
        "request error"
    };
    match e.status() {
        Some(status) => format!("{} (HTTP {})", kind, status),
        None => kind.to_string(),
    }
}

/// Telegram 通知渠道
pub struct TelegramSink {
    client: TelegramClient,
}

impl TelegramSink {
    pub fn new(client: TelegramClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageSink for TelegramSink {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn deliver(&self, recipient: RecipientId, alert: &Alert) -> Result<SendResult> {
        let markdown = format_alert(alert);
        let plain = format_alert_plain(alert);
        match self.client.send_markdown_or_plain(recipient, &markdown, &plain).await {
            Ok(()) => {
                debug!(chat_id = recipient, url = %alert.url, "Telegram message sent");
                Ok(SendResult::Sent)
            }
            Err(e) => Ok(SendResult::Failed(e.to_string())),
        }
    }
}
