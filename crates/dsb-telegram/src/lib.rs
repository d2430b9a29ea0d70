//! Telegram adapter (teloxide).
//!
//! This crate implements the `dsb-core` MessagingPort and ContentSource over
//! the Telegram Bot API, and routes updates to the core services.

use std::path::Path;

use async_trait::async_trait;

use teloxide::{net::Download, prelude::*, types::InputFile};

use tokio::{io::AsyncWriteExt, time::sleep};

pub mod handlers;
pub mod router;

use dsb_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{Attachment, ChatAction, MessagingCapabilities},
    },
    ports::ContentSource,
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_documents: true,
            supports_chat_actions: true,
            max_message_len: 4096,
            max_caption_len: 1024,
        }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot
                    .send_message(Self::tg_chat(chat_id), text.to_string())
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn send_document(&self, chat_id: ChatId, attachment: Attachment) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                let file = InputFile::memory(attachment.bytes.clone())
                    .file_name(attachment.file_name.clone());
                let mut req = self.bot.send_document(Self::tg_chat(chat_id), file);
                if let Some(c) = &attachment.caption {
                    req = req.caption(c.clone());
                }
                req
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        let tg_action = match action {
            ChatAction::Typing => teloxide::types::ChatAction::Typing,
            ChatAction::UploadDocument => teloxide::types::ChatAction::UploadDocument,
        };
        self.with_retry(|| self.bot.send_chat_action(Self::tg_chat(chat_id), tg_action))
            .await?;
        Ok(())
    }
}

/// Downloads uploaded documents by Telegram file id.
#[derive(Clone)]
pub struct TelegramSource {
    bot: Bot,
}

impl TelegramSource {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ContentSource for TelegramSource {
    async fn download_to(&self, file_id: &str, dst: &Path) -> Result<u64> {
        let file = self
            .bot
            .get_file(file_id.to_string())
            .await
            .map_err(|e| Error::Transport(format!("telegram get_file failed: {e}")))?;

        let mut out = tokio::fs::File::create(dst).await?;
        self.bot
            .download_file(&file.path, &mut out)
            .await
            .map_err(|e| Error::Transport(format!("telegram download failed: {e}")))?;
        out.flush().await?;

        Ok(tokio::fs::metadata(dst).await?.len())
    }
}
