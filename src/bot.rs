//! 聊天命令 - 通过 Telegram 管理被监控的 GitHub 账号
//!
//! 支持的命令：
//! - `/start`、`/help`
//! - `/add <token> <username>`：校验 token 后添加账号
//! - `/remove <username>`
//! - `/toggle <username>`：启用 / 停用通知
//! - `/status`：列出账号及状态

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::github::source::CredentialVerifier;
use crate::notification::channels::telegram::{
    InlineKeyboardButton, InlineKeyboardMarkup, TelegramClient, Update,
};
use crate::notification::formatter::escape_preserving_code;
use crate::notification::resolver::same_login;
use crate::registry::{AccountRegistry, RecipientId};

const WELCOME: &str = "Welcome to GitHub Notification Bot! 🚀\n\n\
I can help you monitor your GitHub notifications from multiple accounts.\n\n\
Here are the available commands:\n\n\
➕ /add - Add a GitHub account\n\
❌ /remove - Remove a GitHub account\n\
🔄 /toggle - Enable/disable notifications\n\
📊 /status - List your accounts\n\
❓ /help - Show help message\n\n\
Click the buttons below to get started!";

const HELP: &str = "Available commands:\n\
/start - Get started with the bot\n\
/add <token> <username> - Add a GitHub account\n\
/remove <username> - Remove a GitHub account\n\
/toggle <username> - Enable/disable notifications for an account\n\
/status - List your GitHub accounts\n\
/help - Show this help message";

const UNKNOWN: &str = "Unknown command. Type /help for available commands.";

/// `/start` 回复附带的命令按钮；回调数据就是命令本身
pub fn command_keyboard() -> InlineKeyboardMarkup {
    let button = |text: &str, data: &str| InlineKeyboardButton::callback(text, data);
    InlineKeyboardMarkup {
        inline_keyboard: vec![
            vec![
                button("➕ Add Account", "/add"),
                button("❌ Remove Account", "/remove"),
            ],
            vec![
                button("🔄 Toggle Account", "/toggle"),
                button("📊 Status", "/status"),
            ],
            vec![button("❓ Help", "/help")],
        ],
    }
}

/// getUpdates 失败后的等待时间
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// 聊天命令
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    Add(Vec<String>),
    Remove(Vec<String>),
    Toggle(Vec<String>),
    Status,
    Unknown(String),
}

impl Command {
    /// 命令名（日志用，不含参数）
    pub fn name(&self) -> &str {
        match self {
            Command::Start => "start",
            Command::Help => "help",
            Command::Add(_) => "add",
            Command::Remove(_) => "remove",
            Command::Toggle(_) => "toggle",
            Command::Status => "status",
            Command::Unknown(name) => name,
        }
    }
}

/// 解析消息文本；非命令文本返回 None
///
/// 群聊中的 `/status@my_bot` 形式会去掉 bot 名。
pub fn parse_command(text: &str) -> Option<Command> {
    let mut parts = text.split_whitespace();
    let head = parts.next()?.strip_prefix('/')?;
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    let args: Vec<String> = parts.map(str::to_string).collect();

    let command = match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "add" => Command::Add(args),
        "remove" => Command::Remove(args),
        "toggle" => Command::Toggle(args),
        "status" => Command::Status,
        _ => Command::Unknown(name),
    };
    Some(command)
}

/// 命令处理器
pub struct CommandHandler {
    registry: Arc<AccountRegistry>,
    verifier: Arc<dyn CredentialVerifier>,
}

impl CommandHandler {
    pub fn new(registry: Arc<AccountRegistry>, verifier: Arc<dyn CredentialVerifier>) -> Self {
        Self { registry, verifier }
    }

    /// 处理命令并返回回复文本
    pub async fn handle(&self, chat_id: RecipientId, command: Command) -> String {
        match command {
            Command::Start => WELCOME.to_string(),
            Command::Help => HELP.to_string(),
            Command::Add(args) => self.add(chat_id, &args).await,
            Command::Remove(args) => self.remove(chat_id, &args),
            Command::Toggle(args) => self.toggle(chat_id, &args),
            Command::Status => self.status(chat_id),
            Command::Unknown(_) => UNKNOWN.to_string(),
        }
    }

    async fn add(&self, chat_id: RecipientId, args: &[String]) -> String {
        let (token, username) = match args {
            [] => {
                return "To add a GitHub account, use the command:\n\
                        `/add <github_token> <github_username>`\n\n\
                        Example:\n\
                        `/add ghp_1234567890abcdef username`"
                    .to_string()
            }
            [token, username] => (token, username),
            _ => {
                return "Please provide both GitHub token and username.\n\
                        Usage: /add <github_token> <github_username>"
                    .to_string()
            }
        };

        let login = match self.verifier.verify(token).await {
            Ok(login) => login,
            Err(e) => {
                warn!(chat_id, username = %username, error = %e, "GitHub token validation failed");
                return format!("Invalid GitHub token. Please check and try again. Error: {}", e);
            }
        };
        // 用户名用于识别自我提及，必须与 token 所属账号一致
        if !same_login(&login, username) {
            return format!(
                "This token belongs to {}, not {}. Please check and try again.",
                login, username
            );
        }

        match self.registry.add(chat_id, &login, token) {
            Ok(()) => {
                info!(chat_id, username = %login, "GitHub account added");
                format!("Successfully added GitHub account: {}!", login)
            }
            Err(e) => {
                warn!(chat_id, error = %e, "Failed to add GitHub account");
                "Failed to add account. Please try again later.".to_string()
            }
        }
    }

    fn remove(&self, chat_id: RecipientId, args: &[String]) -> String {
        let username = match args {
            [] => {
                return "To remove a GitHub account, use the command:\n\
                        `/remove <github_username>`\n\n\
                        Example:\n\
                        `/remove username`"
                    .to_string()
            }
            [username] => username,
            _ => {
                return "Please provide the GitHub username.\nUsage: /remove <github_username>"
                    .to_string()
            }
        };

        match self.registry.remove(chat_id, username) {
            Ok(true) => format!("Successfully removed GitHub account: {}", username),
            Ok(false) => format!("No GitHub account named {} is registered.", username),
            Err(e) => {
                warn!(chat_id, error = %e, "Failed to remove GitHub account");
                "Failed to remove account. Please try again later.".to_string()
            }
        }
    }

    fn toggle(&self, chat_id: RecipientId, args: &[String]) -> String {
        let username = match args {
            [] => {
                return "To toggle a GitHub account, use the command:\n\
                        `/toggle <github_username>`\n\n\
                        Example:\n\
                        `/toggle username`"
                    .to_string()
            }
            [username] => username,
            _ => {
                return "Please provide the GitHub username.\nUsage: /toggle <github_username>"
                    .to_string()
            }
        };

        match self.registry.toggle(chat_id, username) {
            Ok(active) => {
                let state = if active { "enabled" } else { "disabled" };
                format!("Successfully {} notifications for account: {}", state, username)
            }
            Err(e) => format!("Failed to toggle account: {}", e),
        }
    }

    fn status(&self, chat_id: RecipientId) -> String {
        match self.registry.accounts_for(chat_id) {
            Ok(accounts) if accounts.is_empty() => {
                "You have no GitHub accounts registered. Use /add to add an account.".to_string()
            }
            Ok(accounts) => {
                let lines: Vec<String> = accounts
                    .iter()
                    .map(|a| format!("{} {}", if a.is_active { "🟢" } else { "🔴" }, a.username))
                    .collect();
                format!("Your GitHub accounts:\n{}", lines.join("\n"))
            }
            Err(e) => {
                warn!(chat_id, error = %e, "Failed to read accounts");
                "Failed to load accounts. Please try again later.".to_string()
            }
        }
    }
}

/// getUpdates 长轮询 worker
pub struct BotWorker {
    client: TelegramClient,
    handler: CommandHandler,
    polling_timeout_secs: u64,
}

impl BotWorker {
    pub fn new(client: TelegramClient, handler: CommandHandler, polling_timeout_secs: u64) -> Self {
        Self {
            client,
            handler,
            polling_timeout_secs,
        }
    }

    /// 轮询直到收到关闭信号
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut offset = 0;
        info!("Bot update loop started");

        loop {
            if *shutdown.borrow() {
                break;
            }
            let updates = tokio::select! {
                result = self.client.get_updates(offset, self.polling_timeout_secs) => result,
                _ = shutdown.changed() => break,
            };

            match updates {
                Ok(updates) => {
                    for update in updates {
                        offset = offset.max(update.update_id + 1);
                        self.handle_update(update).await;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "Failed to fetch bot updates");
                    tokio::select! {
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                        _ = shutdown.changed() => break,
                    }
                }
            }
        }
        info!("Bot update loop stopped");
    }

    async fn handle_update(&self, update: Update) {
        let (chat_id, text) = if let Some(callback) = update.callback_query {
            if let Err(e) = self.client.answer_callback_query(&callback.id).await {
                debug!(error = %e, "Failed to answer callback query");
            }
            match (callback.message, callback.data) {
                (Some(message), Some(data)) => (message.chat.id, data),
                _ => return,
            }
        } else if let Some(message) = update.message {
            match message.text {
                Some(text) => (message.chat.id, text),
                None => return,
            }
        } else {
            return;
        };

        let Some(command) = parse_command(&text) else {
            debug!(chat_id, "Ignoring non-command message");
            return;
        };
        info!(chat_id, command = command.name(), "Received command");

        let keyboard = (command == Command::Start).then(command_keyboard);
        let reply = self.handler.handle(chat_id, command).await;
        self.send_reply(chat_id, &reply, keyboard.as_ref()).await;
    }

    async fn send_reply(&self, chat_id: RecipientId, reply: &str, keyboard: Option<&InlineKeyboardMarkup>) {
        let result = if let Some(keyboard) = keyboard {
            self.client.send_with_keyboard(chat_id, reply, keyboard).await
        } else if reply.contains('`') {
            let markdown = escape_preserving_code(reply);
            self.client.send_markdown_or_plain(chat_id, &markdown, reply).await
        } else {
            self.client.send_message(chat_id, reply, None).await
        };
        if let Err(e) = result {
            warn!(chat_id, error = %e, "Failed to send reply");
        }
    }
}
