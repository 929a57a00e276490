//! 运行配置
//!
//! 优先级（后者覆盖前者）：默认值 → `<data_dir>/config.json` → 环境变量 → 命令行参数。
//! 数据目录本身只能由 `GNM_DATA_DIR` 或命令行指定。

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::ConfigError;
use crate::github::GitHubConfig;
use crate::notification::channels::TelegramConfig;

pub const CONFIG_FILE: &str = "config.json";

pub const ENV_POLL_INTERVAL: &str = "POLL_INTERVAL";
pub const ENV_RENOTIFY_INTERVAL: &str = "RENOTIFY_INTERVAL";
pub const ENV_MAX_BODY_LENGTH: &str = "MAX_BODY_LENGTH";
pub const ENV_MAX_CONCURRENT_ACCOUNTS: &str = "MAX_CONCURRENT_ACCOUNTS";
pub const ENV_TELEGRAM_BOT_TOKEN: &str = "TELEGRAM_BOT_TOKEN";
pub const ENV_GITHUB_API_URL: &str = "GITHUB_API_URL";
pub const ENV_TELEGRAM_API_URL: &str = "TELEGRAM_API_URL";
pub const ENV_HTTP_TIMEOUT: &str = "HTTP_TIMEOUT";
pub const ENV_REVIEW_SEARCH: &str = "REVIEW_SEARCH";
pub const ENV_DATA_DIR: &str = "GNM_DATA_DIR";

/// 冷却期上限（一年）
pub const MAX_RENOTIFY_INTERVAL_SECS: u64 = 365 * 24 * 3600;
/// 轮询间隔上限（一天）
pub const MAX_POLL_INTERVAL_SECS: u64 = 24 * 3600;

/// 默认数据目录 ~/.config/gh-notify-monitor
pub fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join(".config/gh-notify-monitor"))
        .unwrap_or_else(|| PathBuf::from(".gh-notify-monitor"))
}

/// 监控配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// 轮询间隔（秒）
    pub poll_interval_secs: u64,
    /// 重复通知冷却期（秒）
    pub renotify_interval_secs: u64,
    /// 消息正文最大字符数
    pub max_body_len: usize,
    /// 同时处理的账号数上限
    pub max_concurrent_accounts: usize,
    pub telegram_bot_token: Option<String>,
    pub github_api_url: String,
    pub telegram_api_url: String,
    /// HTTP 超时（秒）
    pub http_timeout_secs: u64,
    /// getUpdates 长轮询时间（秒）
    pub bot_polling_timeout_secs: u64,
    /// 是否额外搜索待 review 的 PR
    pub review_search: bool,
    #[serde(skip)]
    pub data_dir: PathBuf,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 60,
            renotify_interval_secs: 3600,
            max_body_len: 300,
            max_concurrent_accounts: 4,
            telegram_bot_token: None,
            github_api_url: crate::github::client::DEFAULT_API_URL.to_string(),
            telegram_api_url: crate::notification::channels::telegram::DEFAULT_API_URL.to_string(),
            http_timeout_secs: 30,
            bot_polling_timeout_secs: 60,
            review_search: true,
            data_dir: default_data_dir(),
        }
    }
}

impl MonitorConfig {
    /// 从配置文件和进程环境加载
    pub fn load(data_dir: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load_with(data_dir, |key| std::env::var(key).ok())
    }

    /// 从配置文件和指定的环境读取函数加载
    pub fn load_with<F>(data_dir: Option<PathBuf>, env: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let data_dir = data_dir
            .or_else(|| env(ENV_DATA_DIR).filter(|d| !d.is_empty()).map(PathBuf::from))
            .unwrap_or_else(default_data_dir);

        let mut config = Self::from_file(&data_dir.join(CONFIG_FILE))?;
        config.data_dir = data_dir;
        config.apply_env(env)?;
        Ok(config)
    }

    /// 读取 JSON 配置文件，不存在时返回默认值
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Invalid {
            key: CONFIG_FILE,
            reason: format!("{}: {}", path.display(), e),
        })?;
        let config = serde_json::from_str(&content).map_err(|e| ConfigError::Invalid {
            key: CONFIG_FILE,
            reason: format!("{}: {}", path.display(), e),
        })?;
        debug!(path = %path.display(), "Loaded config file");
        Ok(config)
    }

    fn apply_env<F>(&mut self, env: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| env(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        if let Some(v) = get(ENV_POLL_INTERVAL) {
            self.poll_interval_secs = parse_number(ENV_POLL_INTERVAL, &v)?;
        }
        if let Some(v) = get(ENV_RENOTIFY_INTERVAL) {
            self.renotify_interval_secs = parse_number(ENV_RENOTIFY_INTERVAL, &v)?;
        }
        if let Some(v) = get(ENV_MAX_BODY_LENGTH) {
            self.max_body_len = parse_number(ENV_MAX_BODY_LENGTH, &v)?;
        }
        if let Some(v) = get(ENV_MAX_CONCURRENT_ACCOUNTS) {
            self.max_concurrent_accounts = parse_number(ENV_MAX_CONCURRENT_ACCOUNTS, &v)?;
        }
        if let Some(v) = get(ENV_HTTP_TIMEOUT) {
            self.http_timeout_secs = parse_number(ENV_HTTP_TIMEOUT, &v)?;
        }
        if let Some(v) = get(ENV_TELEGRAM_BOT_TOKEN) {
            self.telegram_bot_token = Some(v);
        }
        if let Some(v) = get(ENV_GITHUB_API_URL) {
            self.github_api_url = v;
        }
        if let Some(v) = get(ENV_TELEGRAM_API_URL) {
            self.telegram_api_url = v;
        }
        if let Some(v) = get(ENV_REVIEW_SEARCH) {
            self.review_search = parse_bool(ENV_REVIEW_SEARCH, &v)?;
        }
        Ok(())
    }

    /// 启动前校验；`require_token` 为 false 时（dry-run）不要求 bot token
    pub fn validate(&self, require_token: bool) -> Result<(), ConfigError> {
        if self.poll_interval_secs == 0 {
            return Err(invalid(ENV_POLL_INTERVAL, "must be positive"));
        }
        if self.poll_interval_secs > MAX_POLL_INTERVAL_SECS {
            return Err(invalid(ENV_POLL_INTERVAL, "must be at most 86400 seconds"));
        }
        if self.renotify_interval_secs == 0 {
            return Err(invalid(ENV_RENOTIFY_INTERVAL, "must be positive"));
        }
        if self.renotify_interval_secs > MAX_RENOTIFY_INTERVAL_SECS {
            return Err(invalid(ENV_RENOTIFY_INTERVAL, "must be at most one year (31536000 seconds)"));
        }
        if self.max_body_len < 4 {
            return Err(invalid(ENV_MAX_BODY_LENGTH, "must be at least 4"));
        }
        if self.max_concurrent_accounts == 0 {
            return Err(invalid(ENV_MAX_CONCURRENT_ACCOUNTS, "must be positive"));
        }
        if self.http_timeout_secs == 0 {
            return Err(invalid(ENV_HTTP_TIMEOUT, "must be positive"));
        }
        if require_token && self.telegram_bot_token.as_deref().map_or(true, str::is_empty) {
            return Err(ConfigError::Missing(ENV_TELEGRAM_BOT_TOKEN));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn cool_down(&self) -> chrono::Duration {
        // validate() 之前也不能溢出
        chrono::Duration::seconds(self.renotify_interval_secs.min(MAX_RENOTIFY_INTERVAL_SECS) as i64)
    }

    pub fn github_config(&self) -> GitHubConfig {
        GitHubConfig {
            api_url: self.github_api_url.clone(),
            timeout_secs: self.http_timeout_secs,
        }
    }

    pub fn telegram_config(&self) -> Result<TelegramConfig, ConfigError> {
        let token = self
            .telegram_bot_token
            .clone()
            .filter(|t| !t.is_empty())
            .ok_or(ConfigError::Missing(ENV_TELEGRAM_BOT_TOKEN))?;
        Ok(TelegramConfig {
            bot_token: token,
            api_url: self.telegram_api_url.clone(),
            timeout_secs: self.http_timeout_secs,
        })
    }
}

fn invalid(key: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        key,
        reason: reason.to_string(),
    }
}

fn parse_number<T: std::str::FromStr>(key: &'static str, value: &str) -> Result<T, ConfigError> {
    value
        .parse()
        .map_err(|_| invalid(key, &format!("'{}' is not a valid number", value)))
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, &format!("'{}' is not a boolean", value))),
    }
}
