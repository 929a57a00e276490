//! GitHub Notify Monitor - 轮询 GitHub 通知，分类去重后推送到 Telegram

pub mod bot;
pub mod config;
pub mod error;
pub mod github;
pub mod monitor;
pub mod notification;
pub mod registry;

pub use bot::{BotWorker, Command, CommandHandler};
pub use config::MonitorConfig;
pub use error::{ConfigError, SourceError};
pub use github::{EventSource, GitHubClient, GitHubSourceFactory, SourceFactory};
pub use monitor::{CycleReport, Monitor, MonitorDaemon, MonitorSettings, Scheduler};
pub use notification::{Alert, AlertKind, JsonlLedger, Ledger, MemoryLedger, MessageSink, SendResult};
pub use registry::{AccountRegistry, MonitoredAccount, RecipientId};
