use std::sync::Arc;

use crate::{
    domain::ChatId,
    messaging::{
        port::MessagingPort,
        types::{truncate_for, Attachment, ChatAction},
    },
};

/// Best-effort status channel bound to the chat that triggered an operation.
///
/// Delivery failures are logged and swallowed: a notification that cannot be
/// sent must never abort an ingestion or search that already did its work.
#[derive(Clone)]
pub struct Notifier {
    messenger: Arc<dyn MessagingPort>,
    chat_id: ChatId,
}

impl Notifier {
    pub fn new(messenger: Arc<dyn MessagingPort>, chat_id: ChatId) -> Self {
        Self { messenger, chat_id }
    }

    pub async fn say(&self, text: &str) {
        let max = self.messenger.capabilities().max_message_len;
        if let Err(e) = self
            .messenger
            .send_text(self.chat_id, &truncate_for(text, max))
            .await
        {
            tracing::warn!(chat_id = self.chat_id.0, "failed to send notification: {e}");
        }
    }

    pub async fn attach(&self, mut attachment: Attachment) {
        let caps = self.messenger.capabilities();
        if !caps.supports_documents {
            self.say("Results are ready, but this chat cannot receive files.")
                .await;
            return;
        }
        attachment.caption = attachment
            .caption
            .map(|c| truncate_for(&c, caps.max_caption_len));
        if let Err(e) = self.messenger.send_document(self.chat_id, attachment).await {
            tracing::warn!(chat_id = self.chat_id.0, "failed to send attachment: {e}");
            self.say(&format!("❌ Failed to send results: {e}")).await;
        }
    }

    pub async fn action(&self, action: ChatAction) {
        if !self.messenger.capabilities().supports_chat_actions {
            return;
        }
        let _ = self.messenger.send_chat_action(self.chat_id, action).await;
    }
}
