//! 消息格式化 - Telegram MarkdownV2
//!
//! 分类器产出的是纯文本；这里负责转义和最终版式：
//! ```text
//! 💬 *Mention*
//!
//! 消息正文
//!
//! 🔗 [View on GitHub](url)
//! ```

use super::alert::Alert;

/// MarkdownV2 中必须转义的字符
const MARKDOWN_V2_SPECIAL: &[char] = &[
    '\\', '_', '*', '[', ']', '(', ')', '~', '`', '>', '#', '+', '-', '=', '|', '{', '}', '.', '!',
];

/// 转义 MarkdownV2 控制字符
pub fn escape_markdown_v2(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len() + text.len() / 4);
    for c in text.chars() {
        if MARKDOWN_V2_SPECIAL.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// 转义链接目标：`(...)` 内只需转义 `)` 和 `\`
pub fn escape_link_url(url: &str) -> String {
    let mut escaped = String::with_capacity(url.len());
    for c in url.chars() {
        if c == ')' || c == '\\' {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// 转义文本，保留反引号包裹的代码片段原样
///
/// 用于机器人回复，如 "Usage: `/add <token> <username>`"。
pub fn escape_preserving_code(text: &str) -> String {
    text.split('`')
        .enumerate()
        .map(|(i, part)| {
            if i % 2 == 0 {
                escape_markdown_v2(part)
            } else {
                part.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("`")
}

/// 通知的 MarkdownV2 版式
pub fn format_alert(alert: &Alert) -> String {
    format!(
        "{} *{}*\n\n{}\n\n🔗 [View on GitHub]({})",
        alert.kind.emoji(),
        escape_markdown_v2(alert.kind.title()),
        escape_markdown_v2(&alert.message),
        escape_link_url(&alert.url)
    )
}

/// 纯文本版式（MarkdownV2 被拒绝时的降级）
pub fn format_alert_plain(alert: &Alert) -> String {
    format!(
        "{} {}\n\n{}\n\n🔗 {}",
        alert.kind.emoji(),
        alert.kind.title(),
        alert.message,
        alert.url
    )
}
