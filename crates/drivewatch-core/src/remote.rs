//! RemoteTree trait abstraction over the remote storage API.
//!
//! Implementations:
//! - `InMemoryTree` - scripted tree and change feed for testing
//! - `DriveClient` (in drivewatch-daemon) - Google Drive v3 REST API

use crate::model::{ChangePage, ChildPage, Node};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// Network failure, rate limit or server error; worth retrying
    #[error("Transient remote error: {0}")]
    Transient(String),

    #[error("Node not found: {0}")]
    NotFound(String),

    /// Credentials are invalid and could not be refreshed
    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Malformed response: {0}")]
    Malformed(String),
}

impl RemoteError {
    /// Whether this error must stop monitoring instead of being retried.
    pub fn is_fatal(&self) -> bool {
        matches!(self, RemoteError::Auth(_))
    }
}

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Read-only view of a remote hierarchical file tree with a change feed.
#[async_trait]
pub trait RemoteTree: Send + Sync {
    /// Cursor pointing at "now" in the change history
    async fn current_cursor(&self) -> Result<String>;

    /// One page of changes starting at `cursor`, removals and shared drives included
    async fn list_changes(&self, cursor: &str) -> Result<ChangePage>;

    /// Fetch a node by id (only id, name and parents are guaranteed)
    async fn get_node(&self, id: &str) -> Result<Node>;

    /// One page of the non-trashed folders directly under `folder_id`
    async fn list_child_folders(&self, folder_id: &str, page_token: Option<&str>) -> Result<ChildPage>;
}

#[async_trait]
impl<T: RemoteTree + ?Sized> RemoteTree for std::sync::Arc<T> {
    async fn current_cursor(&self) -> Result<String> {
        (**self).current_cursor().await
    }

    async fn list_changes(&self, cursor: &str) -> Result<ChangePage> {
        (**self).list_changes(cursor).await
    }

    async fn get_node(&self, id: &str) -> Result<Node> {
        (**self).get_node(id).await
    }

    async fn list_child_folders(&self, folder_id: &str, page_token: Option<&str>) -> Result<ChildPage> {
        (**self).list_child_folders(folder_id, page_token).await
    }
}

/// In-memory tree for testing.
///
/// Change pages are scripted per cursor; a cursor with no script yields an
/// empty page whose new baseline is the same cursor (nothing happened).
pub struct InMemoryTree {
    nodes: RwLock<HashMap<String, Node>>,
    cursor: RwLock<String>,
    pages: RwLock<HashMap<String, ChangePage>>,
    /// Queued failures per operation key (`get:<id>`, `list:<id>`, `changes`, `cursor`)
    failures: RwLock<HashMap<String, VecDeque<RemoteError>>>,
    get_calls: RwLock<HashMap<String, usize>>,
    requested_cursors: RwLock<Vec<String>>,
    child_page_size: usize,
}

impl InMemoryTree {
    pub fn new() -> Self {
        Self {
            nodes: RwLock::new(HashMap::new()),
            cursor: RwLock::new("1".to_string()),
            pages: RwLock::new(HashMap::new()),
            failures: RwLock::new(HashMap::new()),
            get_calls: RwLock::new(HashMap::new()),
            requested_cursors: RwLock::new(Vec::new()),
            child_page_size: 100,
        }
    }

    /// Split folder listings into pages of `size` entries.
    pub fn with_child_page_size(mut self, size: usize) -> Self {
        self.child_page_size = size.max(1);
        self
    }

    pub fn insert(&self, node: Node) {
        self.nodes.write().unwrap().insert(node.id.clone(), node);
    }

    pub fn set_current_cursor(&self, cursor: &str) {
        *self.cursor.write().unwrap() = cursor.to_string();
    }

    /// Serve `page` when changes are listed from `cursor`.
    pub fn script_page(&self, cursor: &str, page: ChangePage) {
        self.pages.write().unwrap().insert(cursor.to_string(), page);
    }

    /// Make the next `get_node(id)` call fail with `error`.
    pub fn fail_get(&self, id: &str, error: RemoteError) {
        self.push_failure(format!("get:{id}"), error);
    }

    /// Make the next `list_child_folders(folder_id, _)` call fail with `error`.
    pub fn fail_list(&self, folder_id: &str, error: RemoteError) {
        self.push_failure(format!("list:{folder_id}"), error);
    }

    /// Make the next `list_changes` call fail with `error`.
    pub fn fail_changes(&self, error: RemoteError) {
        self.push_failure("changes".to_string(), error);
    }

    /// Make the next `current_cursor` call fail with `error`.
    pub fn fail_cursor(&self, error: RemoteError) {
        self.push_failure("cursor".to_string(), error);
    }

    /// Number of `get_node` calls made for `id`.
    pub fn get_count(&self, id: &str) -> usize {
        self.get_calls.read().unwrap().get(id).copied().unwrap_or(0)
    }

    /// Total number of `get_node` calls.
    pub fn total_gets(&self) -> usize {
        self.get_calls.read().unwrap().values().sum()
    }

    /// Cursors passed to `list_changes`, in call order.
    pub fn requested_cursors(&self) -> Vec<String> {
        self.requested_cursors.read().unwrap().clone()
    }

    fn push_failure(&self, key: String, error: RemoteError) {
        self.failures
            .write()
            .unwrap()
            .entry(key)
            .or_default()
            .push_back(error);
    }

    fn take_failure(&self, key: &str) -> Result<()> {
        let mut failures = self.failures.write().unwrap();
        match failures.get_mut(key).and_then(VecDeque::pop_front) {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

impl Default for InMemoryTree {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteTree for InMemoryTree {
    async fn current_cursor(&self) -> Result<String> {
        self.take_failure("cursor")?;
        Ok(self.cursor.read().unwrap().clone())
    }

    async fn list_changes(&self, cursor: &str) -> Result<ChangePage> {
        self.requested_cursors.write().unwrap().push(cursor.to_string());
        self.take_failure("changes")?;

        let pages = self.pages.read().unwrap();
        Ok(pages.get(cursor).cloned().unwrap_or_else(|| ChangePage {
            changes: Vec::new(),
            next_page_token: None,
            new_start_page_token: Some(cursor.to_string()),
        }))
    }

    async fn get_node(&self, id: &str) -> Result<Node> {
        *self.get_calls.write().unwrap().entry(id.to_string()).or_default() += 1;
        self.take_failure(&format!("get:{id}"))?;

        self.nodes
            .read()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| RemoteError::NotFound(id.to_string()))
    }

    async fn list_child_folders(&self, folder_id: &str, page_token: Option<&str>) -> Result<ChildPage> {
        self.take_failure(&format!("list:{folder_id}"))?;

        let offset = match page_token {
            Some(token) => token
                .parse::<usize>()
                .map_err(|_| RemoteError::Malformed(format!("bad page token: {token}")))?,
            None => 0,
        };

        let nodes = self.nodes.read().unwrap();
        let mut children: Vec<Node> = nodes
            .values()
            .filter(|n| n.is_folder && !n.trashed && n.parents.iter().any(|p| p == folder_id))
            .cloned()
            .collect();
        children.sort_by(|a, b| a.id.cmp(&b.id));

        let end = (offset + self.child_page_size).min(children.len());
        let page: Vec<Node> = children.get(offset..end).map(<[Node]>::to_vec).unwrap_or_default();
        let next_page_token = (end < children.len()).then(|| end.to_string());

        Ok(ChildPage {
            nodes: page,
            next_page_token,
        })
    }
}
