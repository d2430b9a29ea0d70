//! Cross-messenger abstractions (Telegram today).

pub mod notifier;
pub mod port;
pub mod throttled;
pub mod types;
