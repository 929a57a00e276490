//! 通知引擎 - 分类、去重、投递
//!
//! 处理链路：
//! 1. `resolver` 重新拉取条目状态，过滤已关闭 / 已合并 / 自己创建的条目
//! 2. `classifier` 生成候选通知（消息文本决定指纹）
//! 3. `gate` 基于 ledger 判断冷却期内是否已投递
//! 4. `channel` 投递，成功后写入 ledger
//! 5. `retention` 每轮清理过期 ledger 记录

pub mod alert;
pub mod channel;
pub mod channels;
pub mod classifier;
pub mod fingerprint;
pub mod formatter;
pub mod gate;
pub mod ledger;
pub mod resolver;
pub mod retention;

pub use alert::{Alert, AlertKind};
pub use channel::{MessageSink, SendResult};
pub use classifier::{Classification, CommentCache, NotificationClassifier};
pub use fingerprint::{fingerprint, Fingerprint};
pub use gate::RenotifyGate;
pub use ledger::{JsonlLedger, Ledger, LedgerEntry, LedgerKey, MemoryLedger};
pub use resolver::{resolve, Resolution, StaleReason};
