//! 周期调度与优雅退出
//!
//! 单一定时器驱动周期，周期串行执行：耗时过长的周期只会推迟下一次 tick，
//! 不会与之重叠。关闭信号通过 `watch` 通道广播。

use anyhow::Result;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{info, warn};

use super::orchestrator::Monitor;
use crate::registry::MonitoredAccount;

/// 创建关闭信号通道
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// 周期调度器
#[derive(Debug, Clone, Copy)]
pub struct Scheduler {
    period: Duration,
}

impl Scheduler {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// 循环执行周期直到收到关闭信号，返回执行的周期数
    ///
    /// 每个周期开始前通过 `load_accounts` 重新读取账号，使注册表的变更在下一轮生效。
    pub async fn run<F>(
        &self,
        monitor: &Monitor,
        load_accounts: F,
        mut shutdown: watch::Receiver<bool>,
    ) -> usize
    where
        F: Fn() -> Result<Vec<MonitoredAccount>>,
    {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut cycles = 0;

        info!(interval_secs = self.period.as_secs(), "Poll loop started");
        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => {}
            }
            if *shutdown.borrow() || shutdown.has_changed().is_err() {
                break;
            }

            let accounts = match load_accounts() {
                Ok(accounts) => accounts,
                Err(e) => {
                    warn!(error = %e, "Failed to load accounts, skipping cycle");
                    continue;
                }
            };

            monitor.run_cycle(&accounts, &shutdown).await;
            cycles += 1;
        }
        info!(cycles, "Poll loop stopped");
        cycles
    }
}

/// 等待 SIGINT / SIGTERM 后广播关闭信号
pub async fn forward_signals(shutdown: watch::Sender<bool>) {
    wait_for_signal().await;
    info!("Shutdown signal received, finishing in-flight work");
    let _ = shutdown.send(true);
}

#[cfg(unix)]
async fn wait_for_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    match signal(SignalKind::terminate()) {
        Ok(mut term) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = term.recv() => {}
            }
        }
        Err(e) => {
            warn!(error = %e, "Failed to install SIGTERM handler, listening for Ctrl-C only");
            let _ = tokio::signal::ctrl_c().await;
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_signal() {
    let _ = tokio::signal::ctrl_c().await;
}
