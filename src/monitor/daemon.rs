//! 后台进程管理 - 通过 PID 文件启动 / 停止 `gnm run`

use anyhow::Result;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

const PID_FILE: &str = "monitor.pid";
const LOG_FILE: &str = "monitor.log";

/// 后台监控进程管理器
pub struct MonitorDaemon {
    data_dir: PathBuf,
}

impl MonitorDaemon {
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn pid_file_path(&self) -> PathBuf {
        self.data_dir.join(PID_FILE)
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.data_dir.join(LOG_FILE)
    }

    /// 后台进程是否在运行
    pub fn is_running(&self) -> bool {
        match self.read_pid() {
            Ok(Some(pid)) => Self::process_exists(pid),
            _ => false,
        }
    }

    /// kill -0 检查进程是否存在
    fn process_exists(pid: u32) -> bool {
        Command::new("kill")
            .args(["-0", &pid.to_string()])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    pub fn write_pid(&self, pid: u32) -> Result<()> {
        fs::write(self.pid_file_path(), pid.to_string())?;
        Ok(())
    }

    pub fn read_pid(&self) -> Result<Option<u32>> {
        let pid_file = self.pid_file_path();
        if !pid_file.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&pid_file)?;
        Ok(content.trim().parse().ok())
    }

    pub fn remove_pid(&self) -> Result<()> {
        let pid_file = self.pid_file_path();
        if pid_file.exists() {
            fs::remove_file(pid_file)?;
        }
        Ok(())
    }

    /// 未运行时启动后台进程，返回是否新启动
    ///
    /// `args` 追加在 `run` 之后（如 `--data-dir`）；日志写入 `monitor.log`。
    pub fn ensure_started(&self, args: &[String]) -> Result<bool> {
        if self.is_running() {
            return Ok(false);
        }

        let exe = std::env::current_exe()?;
        let log = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.log_file_path())?;

        let child = Command::new(&exe)
            .arg("run")
            .args(args)
            .stdin(Stdio::null())
            .stdout(log.try_clone()?)
            .stderr(log)
            .spawn()?;

        self.write_pid(child.id())?;
        Ok(true)
    }

    /// 发送 SIGTERM，返回是否存在需要停止的进程
    pub fn stop(&self) -> Result<bool> {
        match self.read_pid()? {
            Some(pid) => {
                let _ = Command::new("kill")
                    .args(["-TERM", &pid.to_string()])
                    .output();
                self.remove_pid()?;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}
