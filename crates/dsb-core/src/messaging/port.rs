use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    messaging::types::{Attachment, ChatAction, MessagingCapabilities},
    Result,
};

/// Outbound notification channel.
///
/// Telegram is the only implementation; the core only ever sends short status
/// strings and, for search results, a single named attachment.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    fn capabilities(&self) -> MessagingCapabilities;

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    async fn send_document(&self, chat_id: ChatId, attachment: Attachment) -> Result<MessageRef>;

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()>;
}
