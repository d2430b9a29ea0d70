//! Ingestion pipeline: bytes from a source → FileRecord + DomainEntries.
//!
//! Every step can fail on its own (acquire, extract, persist). Failures
//! are caught per file and turned into an [`IngestOutcome`]; they never abort
//! sibling files in a folder walk.

use std::{path::PathBuf, sync::Arc, time::Duration};

use async_trait::async_trait;

use crate::{
    config::Config,
    domain::{FileRecord, IncomingFile, Provenance},
    errors::Error,
    extract::extract_domains_lossy,
    messaging::notifier::Notifier,
    ports::{ContentSource, HostedEntry, HostingPort},
    store::{FileStore, NewFileRecord},
    utils::{format_bytes, has_text_suffix, ScratchFile},
    Result,
};

/// Limits applied by the pipeline.
#[derive(Clone, Copy, Debug)]
pub struct IngestPolicy {
    /// Size limit for direct uploads only; hosted sources are not size-checked.
    pub max_upload_bytes: u64,
    pub download_timeout: Duration,
    pub folder_max_depth: usize,
    pub folder_max_entries: usize,
}

impl From<&Config> for IngestPolicy {
    fn from(cfg: &Config) -> Self {
        Self {
            max_upload_bytes: cfg.max_upload_bytes,
            download_timeout: cfg.download_timeout,
            folder_max_depth: cfg.folder_max_depth,
            folder_max_entries: cfg.folder_max_entries,
        }
    }
}

#[derive(Debug)]
pub enum IngestOutcome {
    Indexed {
        file: FileRecord,
        domains_found: usize,
        domains_new: usize,
    },
    /// Policy rejection; nothing was downloaded or stored.
    Rejected { name: String, reason: Error },
    Failed { name: String, error: Error },
}

impl IngestOutcome {
    pub fn is_indexed(&self) -> bool {
        matches!(self, IngestOutcome::Indexed { .. })
    }

    pub fn message(&self) -> String {
        match self {
            IngestOutcome::Indexed {
                file,
                domains_found,
                domains_new,
            } => format!(
                "✅ Indexed {}: {domains_found} domains found, {domains_new} new.",
                file.name
            ),
            IngestOutcome::Rejected { name, reason } => format!("⚠️ Skipped {name}: {reason}"),
            IngestOutcome::Failed { name, error } => {
                format!("❌ Failed to index {name}: {error}")
            }
        }
    }
}

/// Result of walking one hosted folder.
#[derive(Debug, Default)]
pub struct FolderReport {
    pub root: String,
    pub outcomes: Vec<IngestOutcome>,
    /// Leaf files without the text suffix.
    pub skipped: usize,
    /// Folders whose listing failed, with the error text.
    pub folder_failures: Vec<(String, String)>,
    /// Whether the depth or entry budget cut the walk short.
    pub truncated: bool,
}

impl FolderReport {
    pub fn indexed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_indexed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.indexed()
    }

    pub fn summary(&self) -> String {
        let mut out = format!(
            "📁 {}: {} indexed, {} failed, {} skipped (not .txt).",
            self.root,
            self.indexed(),
            self.failed(),
            self.skipped
        );
        for (path, err) in &self.folder_failures {
            out.push_str(&format!("\n❌ Could not list {path}: {err}"));
        }
        if self.truncated {
            out.push_str("\n⚠️ Folder too deep or too large; the walk stopped early.");
        }
        out
    }
}

pub struct Indexer {
    store: Arc<dyn FileStore>,
    policy: IngestPolicy,
    temp_dir: PathBuf,
}

impl Indexer {
    pub fn new(store: Arc<dyn FileStore>, policy: IngestPolicy, temp_dir: PathBuf) -> Self {
        Self {
            store,
            policy,
            temp_dir,
        }
    }

    pub fn from_config(store: Arc<dyn FileStore>, cfg: &Config) -> Self {
        Self::new(store, IngestPolicy::from(cfg), cfg.temp_dir.clone())
    }

    /// Policy gate, applied before any byte is fetched.
    pub fn validate(&self, file: &IncomingFile) -> Result<()> {
        if !has_text_suffix(&file.name) {
            return Err(Error::Validation(
                "only plain-text (.txt) files are indexed.".to_string(),
            ));
        }
        if file.provenance == Provenance::DirectUpload && file.size > self.policy.max_upload_bytes
        {
            return Err(Error::Validation(format!(
                "file is too large. Maximum size is {}.",
                format_bytes(self.policy.max_upload_bytes)
            )));
        }
        Ok(())
    }

    /// Ingest one file. Never returns an error; see [`IngestOutcome`].
    pub async fn ingest(&self, file: IncomingFile, source: &dyn ContentSource) -> IngestOutcome {
        if let Err(reason) = self.validate(&file) {
            tracing::info!(file = %file.name, provenance = %file.provenance, "rejected: {reason}");
            return IngestOutcome::Rejected {
                name: file.name,
                reason,
            };
        }

        match self.run_steps(&file, source).await {
            Ok((record, domains_found, domains_new)) => {
                tracing::info!(
                    file = %record.name,
                    id = record.id,
                    size = record.size,
                    domains_found,
                    domains_new,
                    "indexed file"
                );
                IngestOutcome::Indexed {
                    file: record,
                    domains_found,
                    domains_new,
                }
            }
            Err(error) => {
                tracing::warn!(file = %file.name, kind = error.kind(), "ingestion failed: {error}");
                IngestOutcome::Failed {
                    name: file.name,
                    error,
                }
            }
        }
    }

    /// [`Indexer::ingest`] followed by a status message to `notifier`.
    pub async fn ingest_and_notify(
        &self,
        file: IncomingFile,
        source: &dyn ContentSource,
        notifier: &Notifier,
    ) -> IngestOutcome {
        let outcome = self.ingest(file, source).await;
        notifier.say(&outcome.message()).await;
        outcome
    }

    async fn run_steps(
        &self,
        file: &IncomingFile,
        source: &dyn ContentSource,
    ) -> Result<(FileRecord, usize, usize)> {
        // 1. Acquire into a scratch buffer; the guard deletes it on every path.
        let scratch = ScratchFile::new(&self.temp_dir, &file.name);
        let written = tokio::time::timeout(
            self.policy.download_timeout,
            source.download_to(&file.provenance_ref, scratch.path()),
        )
        .await
        .map_err(|_| {
            Error::Transport(format!(
                "download timed out after {}s",
                self.policy.download_timeout.as_secs()
            ))
        })??;

        // 2. Extract before anything is persisted.
        let content = tokio::fs::read(scratch.path()).await?;
        let domains = extract_domains_lossy(&content);

        // 3. Record the file and its domains in one unit; uniqueness is the store's job.
        let (record, domains_new) = self
            .store
            .record_ingestion(
                NewFileRecord {
                    name: file.name.clone(),
                    size: written,
                    provenance: file.provenance,
                    provenance_ref: file.provenance_ref.clone(),
                },
                &domains,
            )
            .await?;

        Ok((record, domains.len(), domains_new))
    }

    /// Walk a hosted folder, ingesting every `.txt` leaf as its own unit.
    ///
    /// Sub-folders are followed up to `folder_max_depth` levels below `root`, and
    /// at most `folder_max_entries` listing entries are looked at overall.
    pub async fn ingest_folder(
        &self,
        root: &str,
        hosting: &dyn HostingPort,
        notifier: &Notifier,
    ) -> FolderReport {
        let mut report = FolderReport {
            root: root.to_string(),
            ..FolderReport::default()
        };
        let source = FolderFileSource(hosting);
        let mut seen = 0usize;
        let mut pending: Vec<(String, usize)> = vec![(root.to_string(), 0)];

        'walk: while let Some((path, depth)) = pending.pop() {
            let listing = tokio::time::timeout(self.policy.download_timeout, hosting.list_folder(&path))
                .await
                .unwrap_or_else(|_| Err(Error::Transport("folder listing timed out".to_string())));
            let entries = match listing {
                Ok(entries) => entries,
                Err(e) => {
                    tracing::warn!(folder = %path, "failed to list folder: {e}");
                    report.folder_failures.push((path, e.to_string()));
                    continue;
                }
            };

            let mut subfolders = Vec::new();
            for entry in entries {
                if seen >= self.policy.folder_max_entries {
                    report.truncated = true;
                    break 'walk;
                }
                seen += 1;

                match entry {
                    HostedEntry::Folder { path: sub, .. } => {
                        if depth + 1 > self.policy.folder_max_depth {
                            tracing::warn!(folder = %sub, depth, "folder depth limit reached");
                            report.truncated = true;
                        } else {
                            subfolders.push(sub);
                        }
                    }
                    HostedEntry::File { name, path, size } => {
                        if !has_text_suffix(&name) {
                            report.skipped += 1;
                            continue;
                        }
                        let file = IncomingFile {
                            name,
                            size,
                            provenance: Provenance::HostedFolder,
                            provenance_ref: path,
                        };
                        let outcome = self.ingest_and_notify(file, &source, notifier).await;
                        report.outcomes.push(outcome);
                    }
                }
            }

            // Reversed so the first listed sub-folder is walked first.
            pending.extend(subfolders.into_iter().rev().map(|p| (p, depth + 1)));
        }

        tracing::info!(
            root = %report.root,
            indexed = report.indexed(),
            failed = report.failed(),
            skipped = report.skipped,
            truncated = report.truncated,
            "folder walk finished"
        );
        notifier.say(&report.summary()).await;
        report
    }

    /// Ingest the file behind a hosted direct link.
    pub async fn ingest_link(
        &self,
        url: &str,
        hosting: &dyn HostingPort,
        notifier: &Notifier,
    ) -> IngestOutcome {
        let name = match link_file_name(url) {
            Ok(name) => name,
            Err(reason) => {
                let outcome = IngestOutcome::Rejected {
                    name: url.to_string(),
                    reason,
                };
                notifier.say(&outcome.message()).await;
                return outcome;
            }
        };
        let file = IncomingFile {
            name,
            size: 0,
            provenance: Provenance::HostedLink,
            provenance_ref: url.to_string(),
        };
        self.ingest_and_notify(file, &LinkSource(hosting), notifier)
            .await
    }
}

/// File name for a direct link: the last path segment, without query or fragment.
pub fn link_file_name(url: &str) -> Result<String> {
    let url = url.trim();
    let rest = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .ok_or_else(|| Error::Validation("links must start with http:// or https://".to_string()))?;

    let rest = rest.split(['?', '#']).next().unwrap_or("");
    let Some((_, path)) = rest.split_once('/') else {
        return Err(Error::Validation("link does not point to a file.".to_string()));
    };
    let name = path.trim_end_matches('/').rsplit('/').next().unwrap_or("");
    if name.is_empty() {
        return Err(Error::Validation("link does not point to a file.".to_string()));
    }
    Ok(name.to_string())
}

struct FolderFileSource<'a>(&'a dyn HostingPort);

#[async_trait]
impl ContentSource for FolderFileSource<'_> {
    async fn download_to(&self, reference: &str, dst: &std::path::Path) -> Result<u64> {
        self.0.download_to(reference, dst).await
    }
}

struct LinkSource<'a>(&'a dyn HostingPort);

#[async_trait]
impl ContentSource for LinkSource<'_> {
    async fn download_to(&self, reference: &str, dst: &std::path::Path) -> Result<u64> {
        self.0.download_link_to(reference, dst).await
    }
}
