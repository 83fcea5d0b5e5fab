//! Google Drive v3 implementation of RemoteTree.

use crate::auth::TokenManager;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use drivewatch_core::remote::Result;
use drivewatch_core::{Change, ChangePage, ChildPage, Node, RemoteError, RemoteTree};
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

/// Default REST endpoint.
pub const DRIVE_API_BASE: &str = "https://www.googleapis.com/drive/v3";

/// Mime type Drive uses for folders.
pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

const CHANGE_FIELDS: &str = "nextPageToken,newStartPageToken,changes(time,removed,fileId,\
file(id,name,trashed,mimeType,parents,owners(emailAddress),lastModifyingUser(emailAddress),modifiedTime))";

const NODE_FIELDS: &str = "id,name,parents,mimeType";

const LIST_FIELDS: &str = "nextPageToken,files(id,name,parents,mimeType)";

/// Changes requested per page.
pub const CHANGE_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartPageToken {
    start_page_token: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChangeList {
    #[serde(default)]
    changes: Vec<WireChange>,
    next_page_token: Option<String>,
    new_start_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireChange {
    file_id: Option<String>,
    #[serde(default)]
    removed: bool,
    file: Option<WireFile>,
    time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireFile {
    id: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    trashed: bool,
    mime_type: Option<String>,
    #[serde(default)]
    parents: Vec<String>,
    #[serde(default)]
    owners: Vec<WireUser>,
    last_modifying_user: Option<WireUser>,
    modified_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUser {
    email_address: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<WireFile>,
    next_page_token: Option<String>,
}

fn parse_time(raw: Option<&str>) -> Option<DateTime<Utc>> {
    let raw = raw?;
    match DateTime::parse_from_rfc3339(raw) {
        Ok(t) => Some(t.with_timezone(&Utc)),
        Err(e) => {
            warn!("Unparsable timestamp {:?}: {}", raw, e);
            None
        }
    }
}

impl WireFile {
    /// Convert to a snapshot; `fallback_id` covers files reported without an id.
    fn into_node(self, fallback_id: Option<&str>) -> Option<Node> {
        let id = self.id.or_else(|| fallback_id.map(str::to_string))?;
        Some(Node {
            id,
            name: self.name,
            parents: self.parents,
            is_folder: self.mime_type.as_deref() == Some(FOLDER_MIME),
            trashed: self.trashed,
            owners: self
                .owners
                .into_iter()
                .map(|o| o.email_address.unwrap_or_default())
                .collect(),
            last_modifying_user: self.last_modifying_user.and_then(|u| u.email_address),
            modified_time: parse_time(self.modified_time.as_deref()),
        })
    }
}

impl From<WireChange> for Change {
    fn from(wire: WireChange) -> Self {
        let node = wire
            .file
            .and_then(|f| f.into_node(wire.file_id.as_deref()));
        Change {
            node_id: wire.file_id,
            removed: wire.removed,
            node,
            time: parse_time(wire.time.as_deref()),
        }
    }
}

impl From<ChangeList> for ChangePage {
    fn from(list: ChangeList) -> Self {
        ChangePage {
            changes: list.changes.into_iter().map(Change::from).collect(),
            next_page_token: list.next_page_token,
            new_start_page_token: list.new_start_page_token,
        }
    }
}

/// Map a failed HTTP status to the error taxonomy.
fn classify(status: StatusCode, body: &str) -> RemoteError {
    let detail = format!("{}: {}", status, body.trim());
    match status {
        StatusCode::UNAUTHORIZED => RemoteError::Auth(detail),
        StatusCode::TOO_MANY_REQUESTS => RemoteError::Transient(detail),
        StatusCode::FORBIDDEN if body.contains("RateLimitExceeded") || body.contains("rateLimitExceeded") => {
            RemoteError::Transient(detail)
        }
        StatusCode::FORBIDDEN | StatusCode::NOT_FOUND => RemoteError::NotFound(detail),
        _ => RemoteError::Transient(detail),
    }
}

/// Drive REST client with automatic token refresh.
pub struct DriveClient {
    http: reqwest::Client,
    base_url: String,
    auth: TokenManager,
}

impl DriveClient {
    pub fn new(http: reqwest::Client, base_url: impl Into<String>, auth: TokenManager) -> Self {
        Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            auth,
        }
    }

    /// GET `path` and decode the JSON body. A 401 triggers one token
    /// refresh and retry before surfacing as an auth error.
    async fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T> {
        let url = format!("{}/{}", self.base_url, path);
        let mut refreshed = false;

        loop {
            let token = self.auth.access_token().await?;
            let response = self
                .http
                .get(&url)
                .bearer_auth(&token)
                .query(query)
                .send()
                .await
                .map_err(|e| RemoteError::Transient(e.to_string()))?;

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED && !refreshed {
                debug!("Access token rejected for {}, refreshing", path);
                refreshed = true;
                self.auth.refresh().await?;
                continue;
            }
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(classify(status, &body));
            }

            return response
                .json::<T>()
                .await
                .map_err(|e| RemoteError::Malformed(format!("{}: {}", path, e)));
        }
    }
}

#[async_trait]
impl RemoteTree for DriveClient {
    async fn current_cursor(&self) -> Result<String> {
        let token: StartPageToken = self
            .get_json("changes/startPageToken", &[("supportsAllDrives", "true")])
            .await?;
        Ok(token.start_page_token)
    }

    async fn list_changes(&self, cursor: &str) -> Result<ChangePage> {
        let page_size = CHANGE_PAGE_SIZE.to_string();
        let list: ChangeList = self
            .get_json(
                "changes",
                &[
                    ("pageToken", cursor),
                    ("pageSize", page_size.as_str()),
                    ("includeRemoved", "true"),
                    ("includeItemsFromAllDrives", "true"),
                    ("supportsAllDrives", "true"),
                    ("fields", CHANGE_FIELDS),
                ],
            )
            .await?;
        Ok(list.into())
    }

    async fn get_node(&self, id: &str) -> Result<Node> {
        let file: WireFile = self
            .get_json(
                &format!("files/{}", id),
                &[("fields", NODE_FIELDS), ("supportsAllDrives", "true")],
            )
            .await?;
        file.into_node(Some(id))
            .ok_or_else(|| RemoteError::Malformed(format!("file {} without id", id)))
    }

    async fn list_child_folders(&self, folder_id: &str, page_token: Option<&str>) -> Result<ChildPage> {
        let q = format!(
            "'{}' in parents and mimeType = '{}' and trashed = false",
            folder_id, FOLDER_MIME
        );
        let mut query = vec![
            ("q", q.as_str()),
            ("spaces", "drive"),
            ("fields", LIST_FIELDS),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ];
        if let Some(token) = page_token {
            query.push(("pageToken", token));
        }

        let list: FileList = self.get_json("files", &query).await?;
        let nodes = list
            .files
            .into_iter()
            .filter_map(|f| f.into_node(None))
            .map(|mut node| {
                node.is_folder = true;
                node
            })
            .collect();

        Ok(ChildPage {
            nodes,
            next_page_token: list.next_page_token,
        })
    }
}
