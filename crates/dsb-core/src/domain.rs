use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric). Channels use negative ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

/// Where an ingested file came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// Sent to the bot (or posted in the watched channel) as a document.
    DirectUpload,
    /// Leaf file found while walking a hosted folder.
    HostedFolder,
    /// Single file fetched from a hosted direct link.
    HostedLink,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::DirectUpload => "direct_upload",
            Provenance::HostedFolder => "hosted_folder",
            Provenance::HostedLink => "hosted_link",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct_upload" => Some(Provenance::DirectUpload),
            "hosted_folder" => Some(Provenance::HostedFolder),
            "hosted_link" => Some(Provenance::HostedLink),
            _ => None,
        }
    }
}

impl fmt::Display for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A file handed to the ingestion pipeline by an adapter.
///
/// Adapters build this right at the edge so nothing downstream depends on
/// transport-specific message shapes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IncomingFile {
    pub name: String,
    /// Size declared by the transport; hosted sources may report 0 when unknown.
    pub size: u64,
    pub provenance: Provenance,
    /// Telegram file id, Dropbox path or URL.
    pub provenance_ref: String,
}

/// Metadata for one successfully ingested file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub id: i64,
    pub name: String,
    pub size: u64,
    pub provenance: Provenance,
    pub provenance_ref: String,
    pub ingested_at: DateTime<Utc>,
}

/// A globally unique, lowercase domain seen in some ingested file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct DomainEntry {
    pub domain: String,
    /// Name of the file that introduced the domain (not a foreign key).
    pub source_file: Option<String>,
    pub indexed_at: DateTime<Utc>,
}
