//! File Store port: durable records of ingested files and the global domain set.

use std::collections::BTreeSet;

use async_trait::async_trait;

use crate::{
    domain::{DomainEntry, FileRecord, Provenance},
    Result,
};

pub mod memory;

pub use memory::MemoryFileStore;

/// Upper bound on rows returned by [`FileStore::search_domains`].
pub const MAX_SEARCH_LIMIT: usize = 1000;

/// Metadata for a file about to be recorded.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewFileRecord {
    pub name: String,
    pub size: u64,
    pub provenance: Provenance,
    pub provenance_ref: String,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StoreStats {
    pub files: u64,
    pub domains: u64,
}

/// Hexagonal port for persistence.
///
/// Implementations must be safe to share between the bot loop and the health
/// task, and must enforce domain uniqueness themselves: concurrent ingestions
/// of different files containing the same domain race only inside the store.
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Create tables and indexes if they do not exist yet.
    async fn init_schema(&self) -> Result<()>;

    /// Append a file record. Records are never updated or deleted.
    async fn record_file(&self, file: NewFileRecord) -> Result<FileRecord>;

    /// Insert `domain` unless it is already known. Returns `true` if a row was created.
    async fn insert_domain_if_absent(&self, domain: &str, source_file: &str) -> Result<bool>;

    /// Record `file` and insert its `domains` as one unit: on error neither the
    /// file record nor any of the domains is kept. Returns the record and the
    /// number of domains that were new.
    async fn record_ingestion(
        &self,
        file: NewFileRecord,
        domains: &BTreeSet<String>,
    ) -> Result<(FileRecord, usize)>;

    /// All file records in insertion order.
    async fn list_all_files(&self) -> Result<Vec<FileRecord>>;

    /// Up to `limit` (capped at [`MAX_SEARCH_LIMIT`]) domains containing `substring`,
    /// case-insensitively. No particular order.
    async fn search_domains(&self, substring: &str, limit: usize) -> Result<Vec<DomainEntry>>;

    async fn stats(&self) -> Result<StoreStats>;
}

/// Clamp a caller-provided limit to `1..=MAX_SEARCH_LIMIT`.
pub fn clamp_limit(limit: usize) -> usize {
    limit.clamp(1, MAX_SEARCH_LIMIT)
}
