use std::sync::Arc;

use teloxide::prelude::*;

use dsb_core::{
    domain::{ChatId, UserId},
    messaging::{notifier::Notifier, types::ChatAction},
    search::deliver_result,
};

use crate::router::AppState;

const HELP: &str = "Send me .txt files (or post them in the channel) and I index every domain in them.\n\n\
Commands:\n\
/search <text> - domains containing <text>\n\
/grep <text> - lines containing <text> in every indexed file\n\
/folder <dropbox path> - index all .txt files in a Dropbox folder (recursive)\n\
/link <url> - index a .txt file from a direct link\n\
/stats - number of indexed files and domains";

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// Commands that download or scan and therefore go through the rate limiter.
fn is_expensive(cmd: &str) -> bool {
    matches!(cmd, "search" | "grep" | "folder" | "link")
}

fn usage(cmd: &str) -> Option<&'static str> {
    match cmd {
        "search" => Some("Usage: /search <text>"),
        "grep" => Some("Usage: /grep <text>"),
        "folder" => Some("Usage: /folder <dropbox path>"),
        "link" => Some("Usage: /link <url>"),
        _ => None,
    }
}

pub async fn handle_command(
    msg: &Message,
    text: &str,
    user_id: Option<UserId>,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let (cmd, args) = parse_command(text);
    let notifier = Notifier::new(state.messenger.clone(), ChatId(msg.chat.id.0));

    if args.is_empty() {
        if let Some(u) = usage(&cmd) {
            notifier.say(u).await;
            return Ok(());
        }
    }

    if is_expensive(&cmd) {
        let mut rl = state.rate_limiter.lock().await;
        let (ok, retry_after) = rl.check(user_id.unwrap_or(UserId(msg.chat.id.0)));
        if !ok {
            let retry = retry_after.unwrap_or_default().as_secs_f64();
            tracing::info!(chat_id = msg.chat.id.0, retry, "rate limited");
            drop(rl);
            notifier
                .say(&format!("⏳ Rate limited. Please wait {retry:.1} seconds."))
                .await;
            return Ok(());
        }
    }

    tracing::info!(chat_id = msg.chat.id.0, command = %cmd, "command");
    match cmd.as_str() {
        "start" | "help" => notifier.say(HELP).await,
        "search" => {
            notifier.action(ChatAction::UploadDocument).await;
            deliver_result(state.search.search_domains(&args).await, &notifier).await;
        }
        "grep" => {
            notifier.action(ChatAction::UploadDocument).await;
            let result = state.search.search_content(&args, &state.sources).await;
            deliver_result(result, &notifier).await;
        }
        "folder" => {
            if state.cfg.dropbox_token.is_none() {
                notifier
                    .say("Dropbox is not configured (set DROPBOX_TOKEN).")
                    .await;
                return Ok(());
            }
            notifier.say(&format!("📁 Indexing {args} ...")).await;
            state
                .indexer
                .ingest_folder(&args, state.hosting.as_ref(), &notifier)
                .await;
        }
        "link" => {
            notifier.action(ChatAction::Typing).await;
            state
                .indexer
                .ingest_link(&args, state.hosting.as_ref(), &notifier)
                .await;
        }
        "stats" => match state.store.stats().await {
            Ok(s) => {
                notifier
                    .say(&format!(
                        "📊 {} files and {} domains indexed.",
                        s.files, s.domains
                    ))
                    .await
            }
            Err(e) => notifier.say(&format!("❌ Could not read stats: {e}")).await,
        },
        _ => {
            notifier
                .say(&format!("Unknown command /{cmd}. Try /help."))
                .await;
        }
    }

    Ok(())
}
