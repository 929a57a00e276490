//! 账号注册表 - 维护 聊天 ID → GitHub 账号 的映射
//!
//! 数据保存在 `accounts.json`，所有读-改-写都在文件锁保护下进行，
//! 因此 bot 命令与 CLI 可以同时操作。

use anyhow::{anyhow, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::info;

/// 消息接收方（Telegram chat id）
pub type RecipientId = i64;

/// 被监控的 GitHub 账号
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitoredAccount {
    pub recipient_id: RecipientId,
    pub username: String,
    pub token: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

/// accounts.json 结构
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct AccountsFile {
    accounts: Vec<MonitoredAccount>,
}

/// 账号注册表
pub struct AccountRegistry {
    data_dir: PathBuf,
}

impl AccountRegistry {
    /// 在指定数据目录下打开注册表
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    fn accounts_file_path(&self) -> PathBuf {
        self.data_dir.join("accounts.json")
    }

    fn lock_file_path(&self) -> PathBuf {
        self.data_dir.join("accounts.json.lock")
    }

    fn read_file_internal(&self) -> Result<AccountsFile> {
        let path = self.accounts_file_path();
        if path.exists() {
            let content = fs::read_to_string(&path)?;
            Ok(serde_json::from_str(&content)?)
        } else {
            Ok(AccountsFile::default())
        }
    }

    fn write_file_internal(&self, file: &AccountsFile) -> Result<()> {
        let path = self.accounts_file_path();
        let temp = path.with_extension("tmp");
        fs::write(&temp, serde_json::to_string_pretty(file)?)?;
        fs::rename(&temp, &path)?;
        Ok(())
    }

    /// 在排他锁下执行读-改-写
    fn with_locked_file<F, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&mut AccountsFile) -> Result<T>,
    {
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(self.lock_file_path())?;
        lock_file.lock_exclusive()?;

        let result = (|| {
            let mut file = self.read_file_internal()?;
            let result = operation(&mut file)?;
            self.write_file_internal(&file)?;
            Ok(result)
        })();

        let _ = lock_file.unlock();
        result
    }

    /// 在共享锁下只读
    fn with_locked_file_read<F, T>(&self, operation: F) -> Result<T>
    where
        F: FnOnce(&AccountsFile) -> Result<T>,
    {
        let lock_file = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(self.lock_file_path())?;
        lock_file.lock_shared()?;

        let result = self.read_file_internal().and_then(|file| operation(&file));

        let _ = lock_file.unlock();
        result
    }

    /// 添加账号；已存在时替换 token 并重新启用
    pub fn add(&self, recipient_id: RecipientId, username: &str, token: &str) -> Result<()> {
        self.with_locked_file(|file| {
            match file
                .accounts
                .iter_mut()
                .find(|a| a.recipient_id == recipient_id && same_user(a, username))
            {
                Some(existing) => {
                    existing.token = token.to_string();
                    existing.is_active = true;
                }
                None => file.accounts.push(MonitoredAccount {
                    recipient_id,
                    username: username.to_string(),
                    token: token.to_string(),
                    is_active: true,
                }),
            }
            Ok(())
        })?;
        info!(chat_id = recipient_id, account = %username, "Account registered");
        Ok(())
    }

    /// 删除账号，返回是否确实删除了记录
    pub fn remove(&self, recipient_id: RecipientId, username: &str) -> Result<bool> {
        let removed = self.with_locked_file(|file| {
            let before = file.accounts.len();
            file.accounts
                .retain(|a| !(a.recipient_id == recipient_id && same_user(a, username)));
            Ok(file.accounts.len() != before)
        })?;
        if removed {
            info!(chat_id = recipient_id, account = %username, "Account removed");
        }
        Ok(removed)
    }

    /// 切换启用状态，返回切换后的状态
    pub fn toggle(&self, recipient_id: RecipientId, username: &str) -> Result<bool> {
        self.with_locked_file(|file| {
            let account = file
                .accounts
                .iter_mut()
                .find(|a| a.recipient_id == recipient_id && same_user(a, username))
                .ok_or_else(|| anyhow!("account not found: {}", username))?;
            account.is_active = !account.is_active;
            Ok(account.is_active)
        })
    }

    /// 某个接收方的全部账号（按用户名排序）
    pub fn accounts_for(&self, recipient_id: RecipientId) -> Result<Vec<MonitoredAccount>> {
        self.with_locked_file_read(|file| {
            let mut accounts: Vec<_> = file
                .accounts
                .iter()
                .filter(|a| a.recipient_id == recipient_id)
                .cloned()
                .collect();
            accounts.sort_by(|a, b| a.username.cmp(&b.username));
            Ok(accounts)
        })
    }

    /// 某个接收方当前启用的账号
    pub fn active_for(&self, recipient_id: RecipientId) -> Result<Vec<MonitoredAccount>> {
        Ok(self
            .accounts_for(recipient_id)?
            .into_iter()
            .filter(|a| a.is_active)
            .collect())
    }

    /// 所有启用的 (接收方, 账号) 组合
    pub fn active_accounts(&self) -> Result<Vec<MonitoredAccount>> {
        self.with_locked_file_read(|file| {
            Ok(file.accounts.iter().filter(|a| a.is_active).cloned().collect())
        })
    }

    /// 所有账号
    pub fn all_accounts(&self) -> Result<Vec<MonitoredAccount>> {
        self.with_locked_file_read(|file| Ok(file.accounts.clone()))
    }
}

/// GitHub 用户名不区分大小写
fn same_user(account: &MonitoredAccount, username: &str) -> bool {
    account.username.eq_ignore_ascii_case(username)
}

/// 日志 / 展示用的 token 掩码，只保留前缀和末 4 位
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 8 {
        return "*".repeat(chars.len());
    }
    let prefix: String = chars[..4].iter().collect();
    let suffix: String = chars[chars.len() - 4..].iter().collect();
    format!("{}…{}", prefix, suffix)
}
