//! Telegram update handlers.
//!
//! Each handler is a small adapter that:
//! - validates auth + rate limits
//! - turns the Telegram message into a core boundary type
//! - calls into the `dsb-core` indexer / search service and reports back

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};

use dsb_core::domain::UserId;
use dsb_core::security::is_authorized;

use crate::router::AppState;

mod commands;
mod document;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = msg.chat.id.0;
    let user_id = msg.from().map(|u| UserId(u.id.0 as i64));

    if !is_authorized(user_id, &state.cfg.telegram_allowed_users) {
        let _ = bot
            .send_message(
                msg.chat.id,
                "Unauthorized. Contact the bot owner for access.",
            )
            .await;
        return Ok(());
    }

    if let Some(text) = msg.text() {
        if text.starts_with('/') {
            let _guard = state.chat_locks.lock_chat(chat_id).await;
            return commands::handle_command(&msg, text, user_id, state.clone()).await;
        }
        return Ok(());
    }

    if let Some(doc) = msg.document() {
        let _guard = state.chat_locks.lock_chat(chat_id).await;
        return document::handle_document(doc, chat_id, state.clone()).await;
    }

    Ok(())
}

/// Documents posted in a channel are ingested; notifications go back to that channel.
pub async fn handle_channel_post(msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    let chat_id = msg.chat.id.0;
    if let Some(expected) = state.cfg.channel_id {
        if expected != chat_id {
            tracing::debug!(chat_id, "ignoring post from unconfigured channel");
            return Ok(());
        }
    }

    let Some(doc) = msg.document() else {
        return Ok(());
    };

    let _guard = state.chat_locks.lock_chat(chat_id).await;
    document::handle_document(doc, chat_id, state.clone()).await
}
