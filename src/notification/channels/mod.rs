//! 具体渠道实现

pub mod console;
pub mod telegram;

pub use console::ConsoleSink;
pub use telegram::{
    InlineKeyboardButton, InlineKeyboardMarkup, TelegramClient, TelegramConfig, TelegramSink,
};
