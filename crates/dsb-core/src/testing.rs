//! Port fakes shared by the pipeline and search tests.

use std::{
    collections::{BTreeSet, HashMap},
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicI32, AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;

use crate::{
    domain::{ChatId, DomainEntry, FileRecord, MessageId, MessageRef},
    errors::Error,
    messaging::{
        port::MessagingPort,
        types::{Attachment, ChatAction, MessagingCapabilities},
    },
    ports::{ContentSource, HostedEntry, HostingPort},
    store::{FileStore, MemoryFileStore, NewFileRecord, StoreStats},
    Result,
};

pub fn scratch_dir(tag: &str) -> PathBuf {
    let ts = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let dir = PathBuf::from(format!("/tmp/dsb-test-{tag}-{}-{ts}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    dir
}

async fn write_or_missing(contents: Option<&Vec<u8>>, reference: &str, dst: &Path) -> Result<u64> {
    let Some(bytes) = contents else {
        return Err(Error::Transport(format!("{reference}: not found")));
    };
    tokio::fs::write(dst, bytes).await?;
    Ok(bytes.len() as u64)
}

#[derive(Default)]
pub struct FakeSource {
    files: HashMap<String, Vec<u8>>,
    calls: AtomicUsize,
}

impl FakeSource {
    pub fn with(mut self, reference: &str, content: &str) -> Self {
        self.files
            .insert(reference.to_string(), content.as_bytes().to_vec());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn download_to(&self, reference: &str, dst: &Path) -> Result<u64> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        write_or_missing(self.files.get(reference), reference, dst).await
    }
}

#[derive(Default)]
pub struct FakeHosting {
    folders: HashMap<String, Vec<HostedEntry>>,
    contents: HashMap<String, Vec<u8>>,
}

impl FakeHosting {
    pub fn file(name: &str, path: &str) -> HostedEntry {
        HostedEntry::File {
            name: name.to_string(),
            path: path.to_string(),
            size: 0,
        }
    }

    pub fn dir(name: &str, path: &str) -> HostedEntry {
        HostedEntry::Folder {
            name: name.to_string(),
            path: path.to_string(),
        }
    }

    pub fn folder(mut self, path: &str, entries: Vec<HostedEntry>) -> Self {
        self.folders.insert(path.to_string(), entries);
        self
    }

    pub fn content(mut self, path_or_url: &str, content: &str) -> Self {
        self.contents
            .insert(path_or_url.to_string(), content.as_bytes().to_vec());
        self
    }
}

#[async_trait]
impl ContentSource for FakeHosting {
    async fn download_to(&self, reference: &str, dst: &Path) -> Result<u64> {
        write_or_missing(self.contents.get(reference), reference, dst).await
    }
}

#[async_trait]
impl HostingPort for FakeHosting {
    async fn list_folder(&self, path: &str) -> Result<Vec<HostedEntry>> {
        self.folders
            .get(path)
            .cloned()
            .ok_or_else(|| Error::Transport(format!("{path}: folder not found")))
    }

    async fn download_link_to(&self, url: &str, dst: &Path) -> Result<u64> {
        write_or_missing(self.contents.get(url), url, dst).await
    }
}

#[derive(Default)]
pub struct FakeMessenger {
    next_id: AtomicI32,
    texts: Mutex<Vec<String>>,
    documents: Mutex<Vec<Attachment>>,
}

impl FakeMessenger {
    pub fn sent_text(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    pub fn sent_documents(&self) -> Vec<Attachment> {
        self.documents.lock().unwrap().clone()
    }

    fn alloc(&self, chat_id: ChatId) -> MessageRef {
        MessageRef {
            chat_id,
            message_id: MessageId(self.next_id.fetch_add(1, Ordering::SeqCst)),
        }
    }
}

#[async_trait]
impl MessagingPort for FakeMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            supports_documents: true,
            supports_chat_actions: true,
            max_message_len: 4096,
            max_caption_len: 1024,
        }
    }

    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        self.texts.lock().unwrap().push(text.to_string());
        Ok(self.alloc(chat_id))
    }

    async fn send_document(&self, chat_id: ChatId, attachment: Attachment) -> Result<MessageRef> {
        self.documents.lock().unwrap().push(attachment);
        Ok(self.alloc(chat_id))
    }

    async fn send_chat_action(&self, _chat_id: ChatId, _action: ChatAction) -> Result<()> {
        Ok(())
    }
}

/// Memory store whose writes fail for one poisoned domain, or whose reads all fail.
///
/// A failed `record_ingestion` keeps nothing, like a rolled-back transaction.
#[derive(Default)]
pub struct FailingStore {
    pub inner: MemoryFileStore,
    poisoned: Option<String>,
    reads_fail: bool,
}

impl FailingStore {
    pub fn rejecting(domain: &str) -> Self {
        Self {
            poisoned: Some(domain.to_string()),
            ..Self::default()
        }
    }

    pub fn unreadable() -> Self {
        Self {
            reads_fail: true,
            ..Self::default()
        }
    }

    fn down() -> Error {
        Error::Storage("down".to_string())
    }

    fn read_gate(&self) -> Result<()> {
        if self.reads_fail {
            return Err(Self::down());
        }
        Ok(())
    }
}

#[async_trait]
impl FileStore for FailingStore {
    async fn init_schema(&self) -> Result<()> {
        self.inner.init_schema().await
    }

    async fn record_file(&self, file: NewFileRecord) -> Result<FileRecord> {
        self.inner.record_file(file).await
    }

    async fn insert_domain_if_absent(&self, domain: &str, source_file: &str) -> Result<bool> {
        if self.poisoned.as_deref() == Some(domain) {
            return Err(Self::down());
        }
        self.inner.insert_domain_if_absent(domain, source_file).await
    }

    async fn record_ingestion(
        &self,
        file: NewFileRecord,
        domains: &BTreeSet<String>,
    ) -> Result<(FileRecord, usize)> {
        if let Some(poisoned) = &self.poisoned {
            if domains.contains(poisoned) {
                return Err(Self::down());
            }
        }
        self.inner.record_ingestion(file, domains).await
    }

    async fn list_all_files(&self) -> Result<Vec<FileRecord>> {
        self.read_gate()?;
        self.inner.list_all_files().await
    }

    async fn search_domains(&self, substring: &str, limit: usize) -> Result<Vec<DomainEntry>> {
        self.read_gate()?;
        self.inner.search_domains(substring, limit).await
    }

    async fn stats(&self) -> Result<StoreStats> {
        self.read_gate()?;
        self.inner.stats().await
    }
}
