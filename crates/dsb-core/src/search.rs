//! Search over the domain index (`/search`) or the stored files' content (`/grep`).

use std::{path::PathBuf, sync::Arc, time::Duration};

use crate::{
    config::Config,
    domain::FileRecord,
    errors::Error,
    messaging::{notifier::Notifier, types::Attachment},
    ports::SourceSet,
    store::{clamp_limit, FileStore},
    utils::{sanitize_filename, ScratchFile},
    Result,
};

/// Trim and case-fold a raw query. `None` when nothing is left.
pub fn normalize_query(raw: &str) -> Option<String> {
    let q = raw.trim().to_lowercase();
    if q.is_empty() {
        None
    } else {
        Some(q)
    }
}

#[derive(Debug)]
pub enum SearchOutcome {
    /// Full-content search with no stored files; nothing was downloaded.
    NoFiles,
    NoResults {
        query: String,
        /// Files that could not be re-acquired (name, error).
        unreadable: Vec<(String, String)>,
    },
    Found {
        query: String,
        hits: usize,
        attachment: Attachment,
        unreadable: Vec<(String, String)>,
    },
}

impl SearchOutcome {
    /// Send the outcome to the chat that asked.
    pub async fn deliver(self, notifier: &Notifier) {
        match self {
            SearchOutcome::NoFiles => notifier.say("No files available.").await,
            SearchOutcome::NoResults { query, unreadable } => {
                notifier
                    .say(&format!("No results for \"{query}\".{}", unreadable_note(&unreadable)))
                    .await;
            }
            SearchOutcome::Found {
                attachment,
                unreadable,
                ..
            } => {
                notifier.attach(attachment).await;
                if !unreadable.is_empty() {
                    notifier.say(unreadable_note(&unreadable).trim_start()).await;
                }
            }
        }
    }
}

/// Deliver a search result; a failed search is reported instead of propagated.
pub async fn deliver_result(result: Result<SearchOutcome>, notifier: &Notifier) {
    match result {
        Ok(outcome) => outcome.deliver(notifier).await,
        Err(e) => {
            tracing::warn!(kind = e.kind(), "search failed: {e}");
            notifier.say(&format!("❌ Search failed: {e}")).await;
        }
    }
}

fn unreadable_note(unreadable: &[(String, String)]) -> String {
    if unreadable.is_empty() {
        return String::new();
    }
    let names = unreadable
        .iter()
        .map(|(name, _)| name.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "\n⚠️ {} file(s) could not be read: {names}",
        unreadable.len()
    )
}

pub struct SearchService {
    store: Arc<dyn FileStore>,
    limit: usize,
    temp_dir: PathBuf,
    download_timeout: Duration,
}

impl SearchService {
    pub fn new(
        store: Arc<dyn FileStore>,
        limit: usize,
        temp_dir: PathBuf,
        download_timeout: Duration,
    ) -> Self {
        Self {
            store,
            limit: clamp_limit(limit),
            temp_dir,
            download_timeout,
        }
    }

    pub fn from_config(store: Arc<dyn FileStore>, cfg: &Config) -> Self {
        Self::new(
            store,
            cfg.search_result_limit,
            cfg.temp_dir.clone(),
            cfg.download_timeout,
        )
    }

    /// Substring lookup in the global domain index. One domain per line.
    pub async fn search_domains(&self, raw_query: &str) -> Result<SearchOutcome> {
        let query = require_query(raw_query)?;
        let mut domains: Vec<String> = self
            .store
            .search_domains(&query, self.limit)
            .await?
            .into_iter()
            .map(|d| d.domain)
            .collect();

        tracing::info!(query = %query, hits = domains.len(), "domain search");
        if domains.is_empty() {
            return Ok(SearchOutcome::NoResults {
                query,
                unreadable: Vec::new(),
            });
        }
        domains.sort();

        let mut body = domains.join("\n");
        body.push('\n');
        Ok(SearchOutcome::Found {
            hits: domains.len(),
            attachment: result_attachment(&query, body),
            query,
            unreadable: Vec::new(),
        })
    }

    /// Re-acquire every stored file and collect the lines containing the query,
    /// grouped per file. A file that cannot be re-acquired is listed as
    /// unreadable and the scan moves on.
    pub async fn search_content(&self, raw_query: &str, sources: &SourceSet) -> Result<SearchOutcome> {
        let query = require_query(raw_query)?;
        let files = self.store.list_all_files().await?;
        if files.is_empty() {
            return Ok(SearchOutcome::NoFiles);
        }

        let mut body = format!("Search results for: {query}\n\n");
        let mut hits = 0usize;
        let mut unreadable = Vec::new();

        for file in &files {
            let content = match self.reacquire(sources, file).await {
                Ok(c) => c,
                Err(e) => {
                    tracing::warn!(file = %file.name, id = file.id, "re-acquisition failed: {e}");
                    unreadable.push((file.name.clone(), e.to_string()));
                    continue;
                }
            };

            let matches = matching_lines(&content, &query);
            if matches.is_empty() {
                continue;
            }
            hits += matches.len();
            body.push_str(&format!("--- {} ---\n", file.name));
            for line in matches {
                body.push_str(line);
                body.push('\n');
            }
            body.push('\n');
        }

        tracing::info!(
            query = %query,
            files = files.len(),
            hits,
            unreadable = unreadable.len(),
            "content search"
        );
        if hits == 0 {
            return Ok(SearchOutcome::NoResults { query, unreadable });
        }
        Ok(SearchOutcome::Found {
            hits,
            attachment: result_attachment(&query, body),
            query,
            unreadable,
        })
    }

    async fn reacquire(
        &self,
        sources: &SourceSet,
        file: &FileRecord,
    ) -> Result<String> {
        let scratch = ScratchFile::new(&self.temp_dir, &file.name);
        tokio::time::timeout(
            self.download_timeout,
            sources.download(file.provenance, &file.provenance_ref, scratch.path()),
        )
        .await
        .map_err(|_| Error::Transport("download timed out".to_string()))??;
        let bytes = tokio::fs::read(scratch.path()).await?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

fn require_query(raw: &str) -> Result<String> {
    normalize_query(raw).ok_or_else(|| Error::Validation("search query is empty.".to_string()))
}

/// Lines of `content` containing `query` (already lowercased), case-insensitively.
fn matching_lines<'a>(content: &'a str, query: &str) -> Vec<&'a str> {
    content
        .lines()
        .filter(|line| line.to_lowercase().contains(query))
        .collect()
}

fn result_attachment(query: &str, body: String) -> Attachment {
    Attachment {
        file_name: format!("results_{}.txt", sanitize_filename(query)),
        bytes: body.into_bytes(),
        caption: Some(format!("Results for {query}")),
    }
}
