//! Outbound pacing for chats that receive bursts of status lines.
//!
//! A folder walk reports every leaf file as its own message. Without pacing a
//! large folder trips Telegram's flood control and the tail of the report is
//! lost to 429s.

use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tokio::time::{sleep, Instant};

use crate::{
    domain::{ChatId, MessageRef},
    messaging::{
        port::MessagingPort,
        types::{Attachment, ChatAction, MessagingCapabilities},
    },
    Result,
};

#[derive(Clone, Copy, Debug)]
pub struct ThrottleConfig {
    /// Gap between any two outbound calls, whatever the chat.
    pub global_min_interval: Duration,
    /// Gap between two messages or documents to the same chat.
    pub per_chat_min_interval: Duration,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            global_min_interval: Duration::from_millis(40),
            // Channels tolerate about one post per second.
            per_chat_min_interval: Duration::from_millis(1050),
        }
    }
}

/// Next free send slot on one lane (global or a single chat).
#[derive(Debug)]
struct Lane {
    gap: Duration,
    free_at: Instant,
}

impl Lane {
    fn new(gap: Duration, now: Instant) -> Self {
        Self { gap, free_at: now }
    }

    /// Take the next slot at or after `now`; returns how long to wait for it.
    fn claim(&mut self, now: Instant) -> Duration {
        let slot = self.free_at.max(now);
        self.free_at = slot + self.gap;
        slot - now
    }
}

/// [`MessagingPort`] decorator that spaces out outbound calls.
///
/// Texts and documents wait for both the global lane and their chat's lane.
/// Chat actions only use the global lane.
pub struct ThrottledMessenger {
    inner: Arc<dyn MessagingPort>,
    cfg: ThrottleConfig,
    global: Mutex<Lane>,
    chats: Mutex<HashMap<i64, Lane>>,
}

impl ThrottledMessenger {
    pub fn new(inner: Arc<dyn MessagingPort>, cfg: ThrottleConfig) -> Self {
        Self {
            inner,
            cfg,
            global: Mutex::new(Lane::new(cfg.global_min_interval, Instant::now())),
            chats: Mutex::new(HashMap::new()),
        }
    }

    async fn pace(&self, chat: Option<ChatId>) {
        let now = Instant::now();
        let mut wait = self.global.lock().await.claim(now);
        if let Some(ChatId(id)) = chat {
            let mut chats = self.chats.lock().await;
            let lane = chats
                .entry(id)
                .or_insert_with(|| Lane::new(self.cfg.per_chat_min_interval, now));
            wait = wait.max(lane.claim(now));
        }
        if !wait.is_zero() {
            tracing::trace!(wait_ms = wait.as_millis() as u64, "pacing outbound call");
            sleep(wait).await;
        }
    }
}

#[async_trait::async_trait]
impl MessagingPort for ThrottledMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        self.inner.capabilities()
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.pace(Some(chat_id)).await;
        self.inner.send_text(chat_id, text).await
    }

    async fn send_document(&self, chat_id: ChatId, attachment: Attachment) -> Result<MessageRef> {
        self.pace(Some(chat_id)).await;
        self.inner.send_document(chat_id, attachment).await
    }

    async fn send_chat_action(&self, chat_id: ChatId, action: ChatAction) -> Result<()> {
        self.pace(None).await;
        self.inner.send_chat_action(chat_id, action).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeMessenger;

    #[tokio::test(start_paused = true)]
    async fn lane_hands_out_spaced_slots() {
        let start = Instant::now();
        let mut lane = Lane::new(Duration::from_millis(100), start);
        assert_eq!(lane.claim(start), Duration::ZERO);
        assert_eq!(lane.claim(start), Duration::from_millis(100));
        assert_eq!(lane.claim(start), Duration::from_millis(200));

        tokio::time::advance(Duration::from_millis(500)).await;
        assert_eq!(lane.claim(Instant::now()), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn folder_report_burst_is_paced_per_chat() {
        let fake = Arc::new(FakeMessenger::default());
        let throttled = ThrottledMessenger::new(
            fake.clone(),
            ThrottleConfig {
                global_min_interval: Duration::from_millis(10),
                per_chat_min_interval: Duration::from_secs(1),
            },
        );

        let start = Instant::now();
        for i in 0..3 {
            throttled
                .send_text(ChatId(7), &format!("✅ Indexed {i}.txt"))
                .await
                .unwrap();
        }
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(fake.sent_text().len(), 3);

        // Another chat only waits on the global lane.
        let before = Instant::now();
        throttled.send_text(ChatId(8), "hello").await.unwrap();
        throttled
            .send_chat_action(ChatId(7), ChatAction::Typing)
            .await
            .unwrap();
        assert!(before.elapsed() < Duration::from_millis(100));
    }
}
