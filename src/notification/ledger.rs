//! 投递记录（ledger）
//!
//! 每次成功投递追加一条记录，门控读取同一键的最新投递时间，
//! 保留策略按时间清理。记录只追加、只按时间删除，从不原地修改。
//!
//! 两种实现：
//! - `JsonlLedger`：本地 JSONL 文件，读写都在文件锁下进行
//! - `MemoryLedger`：进程内实现，用于测试和 dry-run

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use super::alert::{Alert, AlertKind};
use super::fingerprint::Fingerprint;
use crate::registry::RecipientId;

/// 门控键：(接收方, 条目 URL, 类型, 内容指纹)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LedgerKey {
    pub recipient_id: RecipientId,
    pub item_url: String,
    pub kind: AlertKind,
    pub fingerprint: Fingerprint,
}

impl LedgerKey {
    pub fn for_alert(recipient_id: RecipientId, alert: &Alert) -> Self {
        Self {
            recipient_id,
            item_url: alert.url.clone(),
            kind: alert.kind,
            fingerprint: alert.fingerprint(),
        }
    }
}

/// 一次成功投递的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub recipient_id: RecipientId,
    pub item_url: String,
    pub notification_type: AlertKind,
    pub content_fingerprint: Fingerprint,
    pub delivered_at: DateTime<Utc>,
}

impl LedgerEntry {
    pub fn new(key: &LedgerKey, delivered_at: DateTime<Utc>) -> Self {
        Self {
            recipient_id: key.recipient_id,
            item_url: key.item_url.clone(),
            notification_type: key.kind,
            content_fingerprint: key.fingerprint,
            delivered_at,
        }
    }

    pub fn matches(&self, key: &LedgerKey) -> bool {
        self.recipient_id == key.recipient_id
            && self.notification_type == key.kind
            && self.content_fingerprint == key.fingerprint
            && self.item_url == key.item_url
    }
}

/// 投递记录存储
///
/// 每个操作单独原子，不提供跨操作事务。
#[async_trait]
pub trait Ledger: Send + Sync {
    /// 同一键的最新投递时间
    async fn latest_delivery(&self, key: &LedgerKey) -> Result<Option<DateTime<Utc>>>;

    /// 追加一条投递记录
    async fn record_delivery(&self, key: &LedgerKey, delivered_at: DateTime<Utc>) -> Result<()>;

    /// 删除 `delivered_at < cutoff` 的记录，返回删除数量
    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize>;
}

fn latest_matching<'a>(
    entries: impl Iterator<Item = &'a LedgerEntry>,
    key: &LedgerKey,
) -> Option<DateTime<Utc>> {
    entries
        .filter(|e| e.matches(key))
        .map(|e| e.delivered_at)
        .max()
}

// ==================== MemoryLedger ====================

/// 进程内 ledger
#[derive(Default)]
pub struct MemoryLedger {
    entries: Mutex<Vec<LedgerEntry>>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前所有记录的快照
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Vec<LedgerEntry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("memory ledger lock poisoned"))
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn latest_delivery(&self, key: &LedgerKey) -> Result<Option<DateTime<Utc>>> {
        let entries = self.lock()?;
        Ok(latest_matching(entries.iter(), key))
    }

    async fn record_delivery(&self, key: &LedgerKey, delivered_at: DateTime<Utc>) -> Result<()> {
        self.lock()?.push(LedgerEntry::new(key, delivered_at));
        Ok(())
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let mut entries = self.lock()?;
        let before = entries.len();
        entries.retain(|e| e.delivered_at >= cutoff);
        Ok(before - entries.len())
    }
}

// ==================== JsonlLedger ====================

/// 基于 JSONL 文件的 ledger
///
/// 读操作持共享锁，追加和清理持排他锁。文件 I/O 在
/// `spawn_blocking` 中执行，不阻塞异步运行时。
#[derive(Debug, Clone)]
pub struct JsonlLedger {
    path: PathBuf,
}

impl JsonlLedger {
    /// 在数据目录下打开 `ledger.jsonl`
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        fs::create_dir_all(data_dir)?;
        Ok(Self {
            path: data_dir.join("ledger.jsonl"),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(path: &Path) -> PathBuf {
        path.with_extension("jsonl.lock")
    }

    fn open_lock(path: &Path) -> Result<File> {
        Ok(OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(Self::lock_path(path))?)
    }

    fn read_entries(path: &Path) -> Result<Vec<LedgerEntry>> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        // 按字节切行：损坏的行（半截写入、非 UTF-8）只跳过自身
        let reader = BufReader::new(File::open(path)?);
        Ok(reader
            .split(b'\n')
            .filter_map(|line| line.ok())
            .filter_map(|line| serde_json::from_slice(&line).ok())
            .collect())
    }

    /// 文件非空且最后一个字节不是换行（上次写入被截断）
    fn ends_mid_line(file: &mut File) -> Result<bool> {
        let len = file.metadata()?.len();
        if len == 0 {
            return Ok(false);
        }
        file.seek(SeekFrom::Start(len - 1))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)?;
        Ok(last[0] != b'\n')
    }

    fn latest_blocking(path: &Path, key: &LedgerKey) -> Result<Option<DateTime<Utc>>> {
        let lock = Self::open_lock(path)?;
        lock.lock_shared()?;
        let result = Self::read_entries(path).map(|entries| latest_matching(entries.iter(), key));
        let _ = lock.unlock();
        result
    }

    fn append_blocking(path: &Path, entry: &LedgerEntry) -> Result<()> {
        let lock = Self::open_lock(path)?;
        lock.lock_exclusive()?;
        let result = (|| {
            let mut file = OpenOptions::new()
                .create(true)
                .read(true)
                .append(true)
                .open(path)?;
            if Self::ends_mid_line(&mut file)? {
                file.write_all(b"\n")?;
            }
            writeln!(file, "{}", serde_json::to_string(entry)?)?;
            Ok(())
        })();
        let _ = lock.unlock();
        result
    }

    fn purge_blocking(path: &Path, cutoff: DateTime<Utc>) -> Result<usize> {
        let lock = Self::open_lock(path)?;
        lock.lock_exclusive()?;
        let result = (|| {
            let entries = Self::read_entries(path)?;
            let before = entries.len();
            let kept: Vec<&LedgerEntry> =
                entries.iter().filter(|e| e.delivered_at >= cutoff).collect();
            let removed = before - kept.len();
            if removed == 0 {
                return Ok(0);
            }

            // 写临时文件后原子替换
            let temp_path = path.with_extension("jsonl.tmp");
            {
                let mut temp = File::create(&temp_path)?;
                for entry in &kept {
                    writeln!(temp, "{}", serde_json::to_string(entry)?)?;
                }
            }
            fs::rename(&temp_path, path)?;
            debug!(removed, kept = kept.len(), "Ledger compacted");
            Ok(removed)
        })();
        let _ = lock.unlock();
        result
    }
}

#[async_trait]
impl Ledger for JsonlLedger {
    async fn latest_delivery(&self, key: &LedgerKey) -> Result<Option<DateTime<Utc>>> {
        let path = self.path.clone();
        let key = key.clone();
        tokio::task::spawn_blocking(move || Self::latest_blocking(&path, &key)).await?
    }

    async fn record_delivery(&self, key: &LedgerKey, delivered_at: DateTime<Utc>) -> Result<()> {
        let path = self.path.clone();
        let entry = LedgerEntry::new(key, delivered_at);
        tokio::task::spawn_blocking(move || Self::append_blocking(&path, &entry)).await?
    }

    async fn purge_older_than(&self, cutoff: DateTime<Utc>) -> Result<usize> {
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || Self::purge_blocking(&path, cutoff)).await?
    }
}
