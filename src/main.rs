//! GitHub Notify Monitor CLI
//!
//! 轮询 GitHub 通知（mention / review request），去重后推送到 Telegram

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use gh_notify_monitor::bot::{BotWorker, CommandHandler};
use gh_notify_monitor::config::MonitorConfig;
use gh_notify_monitor::github::{CredentialVerifier, GitHubSourceFactory};
use gh_notify_monitor::monitor::{forward_signals, shutdown_channel, Monitor, MonitorDaemon, MonitorSettings, Scheduler};
use gh_notify_monitor::notification::channels::{ConsoleSink, TelegramClient, TelegramSink};
use gh_notify_monitor::notification::{retention, JsonlLedger, Ledger, MemoryLedger, MessageSink};
use gh_notify_monitor::registry::{mask_token, AccountRegistry};

#[derive(Parser)]
#[command(name = "gnm")]
#[command(about = "GitHub Notify Monitor - 把 GitHub 提及和 review 请求推送到 Telegram")]
#[command(version)]
struct Cli {
    /// 数据目录（默认 ~/.config/gh-notify-monitor）
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 前台运行：轮询循环 + bot 命令
    Run {
        /// 轮询间隔（秒），覆盖配置
        #[arg(long, short)]
        interval: Option<u64>,
        /// 只打印通知，不发送也不写 ledger
        #[arg(long)]
        dry_run: bool,
        /// 不启动 bot 命令处理
        #[arg(long)]
        no_bot: bool,
    },
    /// 执行单个周期并输出报告
    Once {
        /// 只打印通知，不发送也不写 ledger
        #[arg(long)]
        dry_run: bool,
    },
    /// 清理过期的 ledger 记录
    Sweep,
    /// 后台启动
    Start,
    /// 停止后台进程
    Stop,
    /// 查看后台进程状态
    Status,
    /// 管理被监控的账号
    Accounts {
        #[command(subcommand)]
        action: AccountsAction,
    },
}

#[derive(Subcommand)]
enum AccountsAction {
    /// 添加账号（会校验 token）
    Add {
        /// Telegram chat id
        chat_id: i64,
        /// GitHub 用户名
        username: String,
        /// GitHub token
        #[arg(long, env = "GITHUB_TOKEN")]
        token: String,
    },
    /// 删除账号
    Remove { chat_id: i64, username: String },
    /// 启用 / 停用账号
    Toggle { chat_id: i64, username: String },
    /// 列出账号
    List {
        /// 只列出某个 chat 的账号
        #[arg(long)]
        chat_id: Option<i64>,
        /// 输出 JSON 格式
        #[arg(long)]
        json: bool,
    },
}

fn build_monitor(config: &MonitorConfig, dry_run: bool) -> Result<Monitor> {
    let sources = Arc::new(GitHubSourceFactory::new(config.github_config()));
    let (ledger, sink): (Arc<dyn Ledger>, Arc<dyn MessageSink>) = if dry_run {
        (Arc::new(MemoryLedger::new()), Arc::new(ConsoleSink::new()))
    } else {
        let client = TelegramClient::new(&config.telegram_config()?)?;
        (
            Arc::new(JsonlLedger::open(&config.data_dir)?),
            Arc::new(TelegramSink::new(client)),
        )
    };
    Ok(Monitor::new(sources, ledger, sink, MonitorSettings::from(config)))
}

async fn run(config: MonitorConfig, dry_run: bool, no_bot: bool) -> Result<()> {
    let registry = Arc::new(AccountRegistry::new(&config.data_dir)?);
    let monitor = build_monitor(&config, dry_run)?;

    let (shutdown_tx, shutdown_rx) = shutdown_channel();
    tokio::spawn(forward_signals(shutdown_tx));

    let bot = if dry_run || no_bot {
        None
    } else {
        let client = TelegramClient::new(&config.telegram_config()?)?;
        let verifier: Arc<dyn CredentialVerifier> =
            Arc::new(GitHubSourceFactory::new(config.github_config()));
        let worker = BotWorker::new(
            client,
            CommandHandler::new(registry.clone(), verifier),
            config.bot_polling_timeout_secs,
        );
        let rx = shutdown_rx.clone();
        Some(tokio::spawn(async move { worker.run(rx).await }))
    };

    info!(
        data_dir = %config.data_dir.display(),
        dry_run,
        renotify_secs = config.renotify_interval_secs,
        "Monitor started"
    );
    let accounts = registry.clone();
    Scheduler::new(config.poll_interval())
        .run(&monitor, move || accounts.active_accounts(), shutdown_rx)
        .await;

    if let Some(bot) = bot {
        let _ = bot.await;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // 通过 RUST_LOG 控制日志级别，例如: RUST_LOG=debug gnm run
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("gh_notify_monitor=info,gnm=info"));

    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    let cli = Cli::parse();
    let mut config = MonitorConfig::load(cli.data_dir.clone())?;

    match cli.command {
        Commands::Run { interval, dry_run, no_bot } => {
            if let Some(interval) = interval {
                config.poll_interval_secs = interval;
            }
            config.validate(!dry_run)?;
            run(config, dry_run, no_bot).await?;
        }
        Commands::Once { dry_run } => {
            config.validate(!dry_run)?;
            let registry = AccountRegistry::new(&config.data_dir)?;
            let monitor = build_monitor(&config, dry_run)?;
            let (_shutdown_tx, shutdown_rx) = shutdown_channel();
            let report = monitor
                .run_cycle(&registry.active_accounts()?, &shutdown_rx)
                .await;
            print!("{}", report);
        }
        Commands::Sweep => {
            config.validate(false)?;
            let ledger = JsonlLedger::open(&config.data_dir)?;
            let removed = retention::sweep(&ledger, config.cool_down()).await?;
            println!("Removed {} expired ledger entries", removed);
        }
        Commands::Start => {
            config.validate(true)?;
            let daemon = MonitorDaemon::new(&config.data_dir)?;
            let args = match &cli.data_dir {
                Some(dir) => vec!["--data-dir".to_string(), dir.display().to_string()],
                None => Vec::new(),
            };
            if daemon.ensure_started(&args)? {
                println!("Monitor started (log: {})", daemon.log_file_path().display());
            } else {
                println!("Monitor is already running");
            }
        }
        Commands::Stop => {
            let daemon = MonitorDaemon::new(&config.data_dir)?;
            if daemon.stop()? {
                println!("Monitor stopped");
            } else {
                println!("Monitor is not running");
            }
        }
        Commands::Status => {
            let daemon = MonitorDaemon::new(&config.data_dir)?;
            match daemon.read_pid()? {
                Some(pid) if daemon.is_running() => println!("Monitor is running (pid {})", pid),
                _ => println!("Monitor is not running"),
            }
            let registry = AccountRegistry::new(&config.data_dir)?;
            let accounts = registry.all_accounts()?;
            let active = accounts.iter().filter(|a| a.is_active).count();
            println!("Accounts: {} ({} active)", accounts.len(), active);
        }
        Commands::Accounts { action } => {
            let registry = AccountRegistry::new(&config.data_dir)?;
            match action {
                AccountsAction::Add { chat_id, username, token } => {
                    let verifier = GitHubSourceFactory::new(config.github_config());
                    let login = verifier.verify(&token).await?;
                    if !login.eq_ignore_ascii_case(&username) {
                        return Err(anyhow!("token belongs to {}, not {}", login, username));
                    }
                    registry.add(chat_id, &login, &token)?;
                    println!("Added {} for chat {} ({})", login, chat_id, mask_token(&token));
                }
                AccountsAction::Remove { chat_id, username } => {
                    if registry.remove(chat_id, &username)? {
                        println!("Removed {} for chat {}", username, chat_id);
                    } else {
                        println!("No account {} for chat {}", username, chat_id);
                    }
                }
                AccountsAction::Toggle { chat_id, username } => {
                    let active = registry.toggle(chat_id, &username)?;
                    println!(
                        "{} is now {}",
                        username,
                        if active { "active" } else { "inactive" }
                    );
                }
                AccountsAction::List { chat_id, json } => {
                    let mut accounts = match chat_id {
                        Some(chat_id) => registry.accounts_for(chat_id)?,
                        None => registry.all_accounts()?,
                    };
                    for account in &mut accounts {
                        account.token = mask_token(&account.token);
                    }
                    if json {
                        println!("{}", serde_json::to_string_pretty(&accounts)?);
                    } else if accounts.is_empty() {
                        println!("No accounts registered");
                    } else {
                        for account in &accounts {
                            println!(
                                "{} chat {} | {} | {}",
                                if account.is_active { "🟢" } else { "🔴" },
                                account.recipient_id,
                                account.username,
                                account.token
                            );
                        }
                    }
                }
            }
        }
    }

    Ok(())
}
