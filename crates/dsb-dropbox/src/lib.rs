//! Dropbox adapter (folder listing + downloads).
//!
//! Uses the Dropbox HTTP API v2 `files/list_folder` and `files/download`
//! endpoints with a bearer token. Direct links are plain GETs and work
//! without a token.

use std::{path::Path, time::Duration};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use dsb_core::{
    errors::Error,
    ports::{ContentSource, HostedEntry, HostingPort},
    Result,
};

const API_BASE: &str = "https://api.dropboxapi.com/2";
const CONTENT_BASE: &str = "https://content.dropboxapi.com/2";

#[derive(Clone, Debug)]
pub struct DropboxClient {
    token: Option<String>,
    http: reqwest::Client,
}

impl DropboxClient {
    pub fn new(token: Option<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Config(format!("http client build failed: {e}")))?;
        Ok(Self { token, http })
    }

    fn token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| Error::Transport("DROPBOX_TOKEN is not configured".to_string()))
    }

    async fn list_page(&self, url: String, body: serde_json::Value) -> Result<ListFolderPage> {
        let resp = self
            .http
            .post(url)
            .bearer_auth(self.token()?)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("dropbox request error: {e}")))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Transport(format!("dropbox read error: {e}")))?;
        if !status.is_success() {
            return Err(api_error("list_folder", status, &text));
        }
        parse_list_folder(&text)
    }
}

#[async_trait]
impl ContentSource for DropboxClient {
    async fn download_to(&self, path: &str, dst: &Path) -> Result<u64> {
        let arg = serde_json::json!({ "path": path }).to_string();
        let resp = self
            .http
            .post(format!("{CONTENT_BASE}/files/download"))
            .bearer_auth(self.token()?)
            .header("Dropbox-API-Arg", arg)
            .send()
            .await
            .map_err(|e| Error::Transport(format!("dropbox request error: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(api_error("download", status, &body));
        }
        stream_to_file(resp, dst).await
    }
}

#[async_trait]
impl HostingPort for DropboxClient {
    async fn list_folder(&self, path: &str) -> Result<Vec<HostedEntry>> {
        let mut page = self
            .list_page(
                format!("{API_BASE}/files/list_folder"),
                serde_json::json!({ "path": api_path(path), "recursive": false }),
            )
            .await?;
        let mut entries = std::mem::take(&mut page.entries);

        while page.has_more {
            page = self
                .list_page(
                    format!("{API_BASE}/files/list_folder/continue"),
                    serde_json::json!({ "cursor": page.cursor }),
                )
                .await?;
            entries.append(&mut page.entries);
        }

        tracing::debug!(folder = %path, entries = entries.len(), "listed dropbox folder");
        Ok(entries)
    }

    async fn download_link_to(&self, url: &str, dst: &Path) -> Result<u64> {
        let resp = self
            .http
            .get(direct_download_url(url))
            .send()
            .await
            .map_err(|e| Error::Transport(format!("link request error: {e}")))?;

        if !resp.status().is_success() {
            return Err(Error::Transport(format!(
                "link download failed: {}",
                resp.status()
            )));
        }
        stream_to_file(resp, dst).await
    }
}

async fn stream_to_file(mut resp: reqwest::Response, dst: &Path) -> Result<u64> {
    let mut out = tokio::fs::File::create(dst).await?;
    let mut written = 0u64;
    while let Some(chunk) = resp
        .chunk()
        .await
        .map_err(|e| Error::Transport(format!("download interrupted: {e}")))?
    {
        out.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    out.flush().await?;
    Ok(written)
}

fn api_error(op: &str, status: reqwest::StatusCode, body: &str) -> Error {
    // 409 carries a structured `error_summary`, e.g. "path/not_found/..".
    let summary = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("error_summary").and_then(|s| s.as_str()).map(str::to_string))
        .unwrap_or_else(|| body.chars().take(200).collect());
    if summary.starts_with("path/not_found") {
        return Error::Transport(format!("dropbox {op}: path not found"));
    }
    Error::Transport(format!("dropbox {op} failed: {status} {summary}"))
}

/// Dropbox addresses the root folder as the empty string.
fn api_path(path: &str) -> String {
    let trimmed = path.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Force `dl=1` on dropbox.com share links so they return the raw file.
fn direct_download_url(url: &str) -> String {
    let url = url.trim();
    let is_dropbox = url
        .split("://")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .is_some_and(|host| host == "dropbox.com" || host.ends_with(".dropbox.com"));
    if !is_dropbox {
        return url.to_string();
    }
    if url.contains("dl=0") {
        return url.replacen("dl=0", "dl=1", 1);
    }
    if url.contains("dl=1") {
        return url.to_string();
    }
    let sep = if url.contains('?') { '&' } else { '?' };
    format!("{url}{sep}dl=1")
}

#[derive(Debug)]
struct ListFolderPage {
    entries: Vec<HostedEntry>,
    cursor: String,
    has_more: bool,
}

#[derive(Debug, Deserialize)]
#[serde(tag = ".tag", rename_all = "snake_case")]
enum RawEntry {
    File {
        name: String,
        path_display: Option<String>,
        path_lower: Option<String>,
        #[serde(default)]
        size: u64,
    },
    Folder {
        name: String,
        path_display: Option<String>,
        path_lower: Option<String>,
    },
    Deleted {},
}

#[derive(Debug, Deserialize)]
struct RawPage {
    #[serde(default)]
    entries: Vec<RawEntry>,
    #[serde(default)]
    cursor: String,
    #[serde(default)]
    has_more: bool,
}

fn parse_list_folder(body: &str) -> Result<ListFolderPage> {
    let raw: RawPage = serde_json::from_str(body)?;
    let entries = raw
        .entries
        .into_iter()
        .filter_map(|e| match e {
            RawEntry::File {
                name,
                path_display,
                path_lower,
                size,
            } => {
                let path = path_display.or(path_lower)?;
                Some(HostedEntry::File { name, path, size })
            }
            RawEntry::Folder {
                name,
                path_display,
                path_lower,
            } => {
                let path = path_display.or(path_lower)?;
                Some(HostedEntry::Folder { name, path })
            }
            RawEntry::Deleted {} => None,
        })
        .collect();

    Ok(ListFolderPage {
        entries,
        cursor: raw.cursor,
        has_more: raw.has_more,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_folder_page() {
        let body = r#"{
          "entries": [
            {".tag": "folder", "name": "nested", "path_lower": "/lists/nested", "path_display": "/Lists/nested", "id": "id:a"},
            {".tag": "file", "name": "hosts.txt", "path_lower": "/lists/hosts.txt", "path_display": "/Lists/hosts.txt", "size": 1234, "id": "id:b"},
            {".tag": "deleted", "name": "old.txt", "path_lower": "/lists/old.txt"}
          ],
          "cursor": "AAE",
          "has_more": true
        }"#;

        let page = parse_list_folder(body).unwrap();
        assert_eq!(
            page.entries,
            vec![
                HostedEntry::Folder {
                    name: "nested".to_string(),
                    path: "/Lists/nested".to_string()
                },
                HostedEntry::File {
                    name: "hosts.txt".to_string(),
                    path: "/Lists/hosts.txt".to_string(),
                    size: 1234
                },
            ]
        );
        assert_eq!(page.cursor, "AAE");
        assert!(page.has_more);
    }

    #[test]
    fn rejects_malformed_listing() {
        assert!(matches!(parse_list_folder("not json"), Err(Error::Json(_))));
    }

    #[test]
    fn normalizes_api_paths() {
        assert_eq!(api_path("/"), "");
        assert_eq!(api_path(""), "");
        assert_eq!(api_path("Lists/"), "/Lists");
        assert_eq!(api_path("/Lists/sub"), "/Lists/sub");
    }

    #[test]
    fn forces_raw_download_on_dropbox_links() {
        assert_eq!(
            direct_download_url("https://www.dropbox.com/s/abc/list.txt?dl=0"),
            "https://www.dropbox.com/s/abc/list.txt?dl=1"
        );
        assert_eq!(
            direct_download_url("https://www.dropbox.com/scl/fi/x/list.txt?rlkey=k"),
            "https://www.dropbox.com/scl/fi/x/list.txt?rlkey=k&dl=1"
        );
        assert_eq!(
            direct_download_url("https://dropbox.com/s/abc/list.txt"),
            "https://dropbox.com/s/abc/list.txt?dl=1"
        );
        assert_eq!(
            direct_download_url("https://example.org/list.txt?dl=0"),
            "https://example.org/list.txt?dl=0"
        );
    }

    #[test]
    fn not_found_errors_are_summarized() {
        let err = api_error(
            "list_folder",
            reqwest::StatusCode::CONFLICT,
            r#"{"error_summary": "path/not_found/..", "error": {".tag": "path"}}"#,
        );
        assert_eq!(err.to_string(), "transport error: dropbox list_folder: path not found");
    }

    #[tokio::test]
    async fn folder_operations_require_a_token() {
        let client = DropboxClient::new(None, Duration::from_secs(1)).unwrap();
        let err = client.list_folder("/x").await.unwrap_err();
        assert!(err.to_string().contains("DROPBOX_TOKEN"));
    }
}
