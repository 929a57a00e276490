//! 监控服务 - 周期编排、调度与后台进程

pub mod daemon;
pub mod orchestrator;
pub mod scheduler;

pub use daemon::MonitorDaemon;
pub use orchestrator::{AccountReport, CycleReport, DropReason, EventOutcome, Monitor, MonitorSettings};
pub use scheduler::{forward_signals, shutdown_channel, Scheduler};
