//! Google Drive v3 backend

use crate::archive::{sort_newest_first, RemoteArchive, RemoteEntry};
use crate::credentials::{Credentials, TokenCache};
use chrono::{DateTime, Utc};
use ledger_core::error::IoResultExt;
use ledger_core::{Result, SyncError};
use reqwest::blocking::{Client, Response};
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const FOLDER_MIME: &str = "application/vnd.google-apps.folder";
const UPLOAD_BOUNDARY: &str = "ledger-sync-upload-boundary";

/// Bounds on every remote call, so a hung transport fails one loop iteration
/// instead of stalling it
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HttpTimeouts {
    pub connect: Duration,
    pub overall: Duration,
}

impl Default for HttpTimeouts {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(15),
            overall: Duration::from_secs(60),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    created_time: Option<String>,
    /// Drive encodes sizes as decimal strings
    #[serde(default)]
    size: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    #[serde(default)]
    next_page_token: Option<String>,
}

/// Remote archive stored in a Google Drive folder
pub struct DriveArchive {
    http: Client,
    tokens: TokenCache,
    api_base: String,
    upload_base: String,
}

impl DriveArchive {
    pub fn new(credentials: Credentials, timeouts: HttpTimeouts) -> Result<Self> {
        let http = Client::builder()
            .connect_timeout(timeouts.connect)
            .timeout(timeouts.overall)
            .build()
            .map_err(|e| SyncError::transport("client setup", e))?;

        Ok(Self {
            http,
            tokens: TokenCache::new(credentials),
            api_base: API_BASE.to_string(),
            upload_base: UPLOAD_BASE.to_string(),
        })
    }

    /// Point the backend at a different API host
    pub fn with_base_urls(mut self, api: impl Into<String>, upload: impl Into<String>) -> Self {
        self.api_base = api.into();
        self.upload_base = upload.into();
        self
    }

    fn bearer(&self) -> Result<String> {
        self.tokens.token(&self.http)
    }

    /// Send a request built by `build`, retrying once with a fresh token on 401
    fn send<F>(&self, operation: &str, build: F) -> Result<Response>
    where
        F: Fn(&Client, &str) -> reqwest::blocking::RequestBuilder,
    {
        let token = self.bearer()?;
        let response = build(&self.http, &token)
            .send()
            .map_err(|e| SyncError::transport(operation, e))?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return check_status(response, operation);
        }

        tracing::debug!("{} rejected the access token, refreshing", operation);
        self.tokens.invalidate();
        let token = self.bearer()?;
        let response = build(&self.http, &token)
            .send()
            .map_err(|e| SyncError::transport(operation, e))?;
        check_status(response, operation)
    }
}

impl RemoteArchive for DriveArchive {
    fn find_folder(&self, name: &str) -> Result<Option<String>> {
        let query = format!(
            "name = '{}' and mimeType = '{}' and trashed = false",
            escape_query(name),
            FOLDER_MIME
        );
        let url = format!("{}/files", self.api_base);

        let list: FileList = self
            .send("folder lookup", |http, token| {
                http.get(&url).bearer_auth(token).query(&[
                    ("q", query.as_str()),
                    ("spaces", "drive"),
                    ("fields", "files(id,name)"),
                ])
            })?
            .json()
            .map_err(|e| SyncError::transport("folder lookup", e))?;

        Ok(list.files.into_iter().next().map(|f| f.id))
    }

    fn create_folder(&self, name: &str) -> Result<String> {
        let url = format!("{}/files", self.api_base);
        let body = serde_json::json!({ "name": name, "mimeType": FOLDER_MIME });

        let created: DriveFile = self
            .send("folder create", |http, token| {
                http.post(&url)
                    .bearer_auth(token)
                    .query(&[("fields", "id")])
                    .json(&body)
            })?
            .json()
            .map_err(|e| SyncError::transport("folder create", e))?;

        tracing::info!("Created remote folder {} ({})", name, created.id);
        Ok(created.id)
    }

    fn upload(&self, local: &Path, folder_id: &str) -> Result<String> {
        let name = local
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| SyncError::transport("upload", format!("{} has no file name", local.display())))?;
        let contents = std::fs::read(local).at_path(local)?;
        let metadata = serde_json::json!({ "name": name, "parents": [folder_id] });
        let body = multipart_related(&metadata.to_string(), &contents);
        let url = format!("{}/files", self.upload_base);

        let uploaded: DriveFile = self
            .send("upload", |http, token| {
                http.post(&url)
                    .bearer_auth(token)
                    .query(&[("uploadType", "multipart"), ("fields", "id")])
                    .header(
                        reqwest::header::CONTENT_TYPE,
                        format!("multipart/related; boundary={}", UPLOAD_BOUNDARY),
                    )
                    .body(body.clone())
            })?
            .json()
            .map_err(|e| SyncError::transport("upload", e))?;

        Ok(uploaded.id)
    }

    fn list(&self, folder_id: &str) -> Result<Vec<RemoteEntry>> {
        let query = format!("'{}' in parents and trashed = false", escape_query(folder_id));
        let url = format!("{}/files", self.api_base);
        let mut entries = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let page: FileList = self
                .send("list", |http, token| {
                    let mut request = http.get(&url).bearer_auth(token).query(&[
                        ("q", query.as_str()),
                        ("orderBy", "createdTime desc"),
                        ("pageSize", "1000"),
                        ("fields", "nextPageToken,files(id,name,createdTime,size)"),
                    ]);
                    if let Some(page_token) = &page_token {
                        request = request.query(&[("pageToken", page_token.as_str())]);
                    }
                    request
                })?
                .json()
                .map_err(|e| SyncError::transport("list", e))?;

            entries.extend(page.files.into_iter().map(|file| RemoteEntry {
                created_at: file
                    .created_time
                    .as_deref()
                    .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                    .map(|t| t.with_timezone(&Utc))
                    .unwrap_or_default(),
                size_bytes: file.size.and_then(|s| s.parse().ok()),
                id: file.id,
                name: file.name,
            }));

            match page.next_page_token {
                Some(next) => page_token = Some(next),
                None => break,
            }
        }

        sort_newest_first(&mut entries);
        Ok(entries)
    }

    fn download(&self, remote_id: &str, dest: &Path) -> Result<()> {
        let url = format!("{}/files/{}", self.api_base, remote_id);
        let mut response = self.send("download", |http, token| {
            http.get(&url).bearer_auth(token).query(&[("alt", "media")])
        })?;

        let mut file = std::fs::File::create(dest).at_path(dest)?;
        response
            .copy_to(&mut file)
            .map_err(|e| SyncError::transport("download", e))?;
        file.sync_all().at_path(dest)?;
        Ok(())
    }

    fn delete(&self, remote_id: &str) -> Result<()> {
        let url = format!("{}/files/{}", self.api_base, remote_id);
        self.send("delete", |http, token| http.delete(&url).bearer_auth(token))?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "drive"
    }
}

/// Turn a non-success response into a transport error carrying the body
pub(crate) fn check_status(response: Response, operation: &str) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .unwrap_or_else(|_| "unable to read response body".to_string());
    Err(SyncError::transport(
        operation,
        format!("HTTP {}: {}", status.as_u16(), body.trim()),
    ))
}

fn escape_query(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

/// Build a `multipart/related` body: JSON metadata part, then the file bytes
fn multipart_related(metadata: &str, contents: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(contents.len() + metadata.len() + 256);
    body.extend_from_slice(format!("--{}\r\n", UPLOAD_BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Type: application/json; charset=UTF-8\r\n\r\n");
    body.extend_from_slice(metadata.as_bytes());
    body.extend_from_slice(format!("\r\n--{}\r\n", UPLOAD_BOUNDARY).as_bytes());
    body.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
    body.extend_from_slice(contents);
    body.extend_from_slice(format!("\r\n--{}--\r\n", UPLOAD_BOUNDARY).as_bytes());
    body
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_query() {
        assert_eq!(escape_query("AI Finance App Backups"), "AI Finance App Backups");
        assert_eq!(escape_query("it's"), "it\\'s");
        assert_eq!(escape_query("a\\b"), "a\\\\b");
    }

    #[test]
    fn test_multipart_layout() {
        let body = multipart_related("{\"name\":\"a.db\"}", b"SQLite format 3\0");
        let text = String::from_utf8_lossy(&body);

        assert!(text.starts_with("--ledger-sync-upload-boundary\r\n"));
        assert!(text.contains("{\"name\":\"a.db\"}"));
        assert!(text.contains("application/octet-stream\r\n\r\nSQLite format 3"));
        assert!(text.ends_with("--ledger-sync-upload-boundary--\r\n"));
    }

    #[test]
    fn test_default_timeouts_are_bounded() {
        let timeouts = HttpTimeouts::default();
        assert_eq!(timeouts.connect, Duration::from_secs(15));
        assert_eq!(timeouts.overall, Duration::from_secs(60));
    }

    #[test]
    fn test_file_list_parses_string_sizes() {
        let list: FileList = serde_json::from_str(
            r#"{"files": [{"id": "1", "name": "a.db", "createdTime": "2025-07-10T14:34:03.000Z", "size": "40960"}]}"#,
        )
        .unwrap();
        assert_eq!(list.files[0].size.as_deref(), Some("40960"));
        assert!(list.next_page_token.is_none());
    }
}
