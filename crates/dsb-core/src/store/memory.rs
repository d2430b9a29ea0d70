use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;

use crate::{
    domain::{DomainEntry, FileRecord},
    store::{clamp_limit, FileStore, NewFileRecord, StoreStats},
    Result,
};

#[derive(Debug, Default)]
struct Tables {
    files: Vec<FileRecord>,
    domains: Vec<DomainEntry>,
}

impl Tables {
    fn push_file(&mut self, file: NewFileRecord) -> FileRecord {
        let record = FileRecord {
            id: self.files.len() as i64 + 1,
            name: file.name,
            size: file.size,
            provenance: file.provenance,
            provenance_ref: file.provenance_ref,
            ingested_at: Utc::now(),
        };
        self.files.push(record.clone());
        record
    }

    fn push_domain_if_absent(&mut self, domain: &str, source_file: &str) -> bool {
        let domain = domain.to_ascii_lowercase();
        if self.domains.iter().any(|d| d.domain == domain) {
            return false;
        }
        self.domains.push(DomainEntry {
            domain,
            source_file: Some(source_file.to_string()),
            indexed_at: Utc::now(),
        });
        true
    }
}

/// In-process store with the same semantics as the PostgreSQL one.
///
/// Nothing survives a restart. Used by tests and by `DSB_STORE=memory` for
/// local runs without a database.
#[derive(Debug, Default)]
pub struct MemoryFileStore {
    tables: Mutex<Tables>,
}

impl MemoryFileStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FileStore for MemoryFileStore {
    async fn init_schema(&self) -> Result<()> {
        Ok(())
    }

    async fn record_file(&self, file: NewFileRecord) -> Result<FileRecord> {
        Ok(self.tables.lock().await.push_file(file))
    }

    async fn insert_domain_if_absent(&self, domain: &str, source_file: &str) -> Result<bool> {
        Ok(self
            .tables
            .lock()
            .await
            .push_domain_if_absent(domain, source_file))
    }

    async fn record_ingestion(
        &self,
        file: NewFileRecord,
        domains: &BTreeSet<String>,
    ) -> Result<(FileRecord, usize)> {
        let mut t = self.tables.lock().await;
        let record = t.push_file(file);
        let new = domains
            .iter()
            .filter(|d| t.push_domain_if_absent(d, &record.name))
            .count();
        Ok((record, new))
    }

    async fn list_all_files(&self) -> Result<Vec<FileRecord>> {
        Ok(self.tables.lock().await.files.clone())
    }

    async fn search_domains(&self, substring: &str, limit: usize) -> Result<Vec<DomainEntry>> {
        let needle = substring.to_lowercase();
        let t = self.tables.lock().await;
        Ok(t.domains
            .iter()
            .filter(|d| d.domain.contains(&needle))
            .take(clamp_limit(limit))
            .cloned()
            .collect())
    }

    async fn stats(&self) -> Result<StoreStats> {
        let t = self.tables.lock().await;
        Ok(StoreStats {
            files: t.files.len() as u64,
            domains: t.domains.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Provenance;

    fn upload(name: &str) -> NewFileRecord {
        NewFileRecord {
            name: name.to_string(),
            size: 12,
            provenance: Provenance::DirectUpload,
            provenance_ref: format!("file-id-{name}"),
        }
    }

    #[tokio::test]
    async fn duplicate_domain_is_a_noop() {
        let store = MemoryFileStore::new();
        assert!(store.insert_domain_if_absent("a.com", "one.txt").await.unwrap());
        assert!(!store.insert_domain_if_absent("a.com", "two.txt").await.unwrap());
        assert!(!store.insert_domain_if_absent("A.COM", "two.txt").await.unwrap());

        let hits = store.search_domains("a.com", 1000).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].source_file.as_deref(), Some("one.txt"));
        assert_eq!(store.stats().await.unwrap().domains, 1);
    }

    #[tokio::test]
    async fn search_is_substring_and_case_insensitive() {
        let store = MemoryFileStore::new();
        for d in ["a.com", "b.com", "ab.com"] {
            store.insert_domain_if_absent(d, "f.txt").await.unwrap();
        }

        let mut hits: Vec<String> = store
            .search_domains("B.com", 1000)
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.domain)
            .collect();
        hits.sort();
        assert_eq!(hits, vec!["ab.com".to_string(), "b.com".to_string()]);

        let hits = store.search_domains("A.COM", 1000).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].domain, "a.com");

        assert!(store.search_domains("zzz", 1000).await.unwrap().is_empty());
        assert_eq!(store.search_domains(".com", 2).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn files_are_listed_in_insertion_order() {
        let store = MemoryFileStore::new();
        store.record_file(upload("first.txt")).await.unwrap();
        store.record_file(upload("first.txt")).await.unwrap();
        store.record_file(upload("second.txt")).await.unwrap();

        let files = store.list_all_files().await.unwrap();
        let ids: Vec<i64> = files.iter().map(|f| f.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
        assert_eq!(files[2].name, "second.txt");
        assert_eq!(files[0].provenance_ref, "file-id-first.txt");
    }

    #[tokio::test]
    async fn ingestion_counts_only_new_domains() {
        let store = MemoryFileStore::new();
        store.insert_domain_if_absent("known.com", "old.txt").await.unwrap();

        let domains: BTreeSet<String> = ["known.com", "fresh.org"]
            .into_iter()
            .map(str::to_string)
            .collect();
        let (record, new) = store
            .record_ingestion(upload("list.txt"), &domains)
            .await
            .unwrap();

        assert_eq!(record.id, 1);
        assert_eq!(new, 1);
        let fresh = store.search_domains("fresh", 10).await.unwrap();
        assert_eq!(fresh[0].source_file.as_deref(), Some("list.txt"));
        assert_eq!(store.stats().await.unwrap(), StoreStats { files: 1, domains: 2 });
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_inserts_of_one_domain_create_one_entry() {
        let store = std::sync::Arc::new(MemoryFileStore::new());
        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .insert_domain_if_absent("same.com", &format!("f{i}.txt"))
                        .await
                        .unwrap()
                })
            })
            .collect();

        let mut created = 0;
        for task in tasks {
            if task.await.unwrap() {
                created += 1;
            }
        }
        assert_eq!(created, 1);
        assert_eq!(store.stats().await.unwrap().domains, 1);
    }
}
