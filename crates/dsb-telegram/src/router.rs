use std::{collections::HashMap, sync::Arc};

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};

use tokio::sync::{Mutex, OwnedMutexGuard};

use dsb_core::{
    config::Config,
    ingest::Indexer,
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    ports::{ContentSource, HostingPort, SourceSet},
    search::SearchService,
    security::RateLimiter,
    store::FileStore,
};

use crate::handlers;
use crate::{TelegramMessenger, TelegramSource};

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub store: Arc<dyn FileStore>,
    pub indexer: Arc<Indexer>,
    pub search: Arc<SearchService>,
    pub messenger: Arc<dyn MessagingPort>,
    pub upload_source: Arc<dyn ContentSource>,
    pub hosting: Arc<dyn HostingPort>,
    pub sources: SourceSet,
    pub rate_limiter: Arc<Mutex<RateLimiter>>,
    pub chat_locks: Arc<ChatLocks>,
}

/// One lock per chat so an ingestion or search runs to completion before the
/// next message from the same chat is handled.
#[derive(Default)]
pub struct ChatLocks {
    inner: Mutex<HashMap<i64, Arc<Mutex<()>>>>,
}

impl ChatLocks {
    pub async fn lock_chat(&self, chat_id: i64) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(chat_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}

pub async fn run_polling(
    cfg: Arc<Config>,
    store: Arc<dyn FileStore>,
    hosting: Arc<dyn HostingPort>,
) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    if let Ok(me) = bot.get_me().await {
        tracing::info!("dsb started: @{}", me.username());
    }
    match cfg.channel_id {
        Some(id) => tracing::info!(channel_id = id, "ingesting documents posted to channel"),
        None => tracing::info!("ingesting documents posted to any channel"),
    }
    if cfg.dropbox_token.is_none() {
        tracing::info!("DROPBOX_TOKEN not set; /folder is disabled");
    }

    // Folder walks emit one status line per file; throttle to stay under Telegram flood limits.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::default(),
    ));

    let upload_source: Arc<dyn ContentSource> = Arc::new(TelegramSource::new(bot.clone()));
    let sources = SourceSet {
        upload: Some(upload_source.clone()),
        hosting: Some(hosting.clone()),
    };

    let state = Arc::new(AppState {
        cfg: cfg.clone(),
        store: store.clone(),
        indexer: Arc::new(Indexer::from_config(store.clone(), &cfg)),
        search: Arc::new(SearchService::from_config(store, &cfg)),
        messenger,
        upload_source,
        hosting,
        sources,
        rate_limiter: Arc::new(Mutex::new(RateLimiter::new(
            cfg.rate_limit_enabled,
            cfg.rate_limit_requests,
            cfg.rate_limit_window,
        ))),
        chat_locks: Arc::new(ChatLocks::default()),
    });

    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_channel_post().endpoint(handlers::handle_channel_post));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .build()
        .dispatch()
        .await;

    Ok(())
}
