use std::{path::Path, sync::Arc};

use async_trait::async_trait;

use crate::{domain::Provenance, Result};

/// Hexagonal port for acquiring file bytes.
///
/// `reference` is the opaque provenance reference stored with the file
/// (Telegram file id, Dropbox path, URL). Implementations write the full
/// content to `dst`, replacing anything there, and return the byte count.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn download_to(&self, reference: &str, dst: &Path) -> Result<u64>;
}

/// One entry of a hosted folder listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HostedEntry {
    Folder { name: String, path: String },
    File { name: String, path: String, size: u64 },
}

/// Hexagonal port for a third-party file-hosting service.
///
/// `download_to` on the [`ContentSource`] side takes a file path inside the
/// hosting account; `download_link_to` fetches a shared/direct URL.
#[async_trait]
pub trait HostingPort: ContentSource {
    /// Direct children of `path` (not recursive).
    async fn list_folder(&self, path: &str) -> Result<Vec<HostedEntry>>;

    async fn download_link_to(&self, url: &str, dst: &Path) -> Result<u64>;
}

/// Content sources keyed by provenance, used to re-acquire stored files.
#[derive(Clone, Default)]
pub struct SourceSet {
    pub upload: Option<Arc<dyn ContentSource>>,
    pub hosting: Option<Arc<dyn HostingPort>>,
}

impl SourceSet {
    /// Download `reference` for a file of the given provenance into `dst`.
    pub async fn download(
        &self,
        provenance: Provenance,
        reference: &str,
        dst: &Path,
    ) -> Result<u64> {
        let unavailable = |what: &str| {
            crate::Error::Transport(format!("no {what} source configured for {provenance} files"))
        };
        match provenance {
            Provenance::DirectUpload => {
                let src = self.upload.as_ref().ok_or_else(|| unavailable("upload"))?;
                src.download_to(reference, dst).await
            }
            Provenance::HostedFolder => {
                let src = self.hosting.as_ref().ok_or_else(|| unavailable("hosting"))?;
                src.download_to(reference, dst).await
            }
            Provenance::HostedLink => {
                let src = self.hosting.as_ref().ok_or_else(|| unavailable("hosting"))?;
                src.download_link_to(reference, dst).await
            }
        }
    }
}
