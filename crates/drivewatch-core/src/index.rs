//! Hierarchy index: node id → full slash-delimited path.
//!
//! Built once by walking every folder under the monitored root, then
//! extended lazily for nodes discovered later. Entries are never
//! invalidated within a run, so a rename or move keeps its old path until
//! restart.

use crate::ancestry::AncestryCache;
use crate::model::Node;
use crate::remote::{RemoteTree, Result};
use crate::retry::RetryPolicy;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{debug, info, warn};

/// Append-only map from node id to display path, seeded with the root.
#[derive(Debug, Clone)]
pub struct PathIndex {
    root_id: String,
    entries: HashMap<String, String>,
}

impl PathIndex {
    /// An index that only knows the root, labelled `root_label`.
    pub fn new(root_id: &str, root_label: &str) -> Self {
        let mut entries = HashMap::new();
        entries.insert(root_id.to_string(), root_label.to_string());
        Self {
            root_id: root_id.to_string(),
            entries,
        }
    }

    /// Walk every folder under `root_id` and record its path.
    ///
    /// Listing failures on one folder are retried per `policy`; if the
    /// policy gives up, that folder's subtree is left for lazy resolution.
    /// Only authentication errors abort the build.
    pub async fn build<R: RemoteTree + ?Sized>(
        remote: &R,
        root_id: &str,
        root_label: &str,
        policy: &RetryPolicy,
    ) -> Result<Self> {
        info!("Building folder path index under {} ({})", root_label, root_id);

        let mut index = Self::new(root_id, root_label);
        let mut queue = VecDeque::from([(root_id.to_string(), root_label.to_string())]);
        let mut seen = HashSet::from([root_id.to_string()]);

        while let Some((folder_id, folder_path)) = queue.pop_front() {
            let mut page_token: Option<String> = None;

            loop {
                let folder = folder_id.as_str();
                let token = page_token.as_deref();
                let page = match policy
                    .run("Listing folder", || remote.list_child_folders(folder, token))
                    .await
                {
                    Ok(page) => page,
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => {
                        warn!("Skipping folder {} ({}): {}", folder_path, folder_id, e);
                        break;
                    }
                };

                for child in page.nodes {
                    if !seen.insert(child.id.clone()) {
                        continue;
                    }
                    let path = format!("{}/{}", folder_path, child.name);
                    index.entries.insert(child.id.clone(), path.clone());
                    queue.push_back((child.id, path));
                }

                match page.next_page_token {
                    Some(next) => page_token = Some(next),
                    None => break,
                }
            }
        }

        info!("Completed path index ({} entries)", index.len());
        Ok(index)
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn get(&self, id: &str) -> Option<&str> {
        self.entries.get(id).map(String::as_str)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Path of `id`, fetching ancestors until an indexed one is reached.
    pub async fn resolve_path<R: RemoteTree + ?Sized>(&mut self, remote: &R, id: &str) -> Result<String> {
        if let Some(path) = self.get(id) {
            return Ok(path.to_string());
        }
        self.walk(remote, Vec::new(), Some(id.to_string()), None).await
    }

    /// Like [`resolve_path`](Self::resolve_path), but the node's own name and
    /// parents come from the snapshot instead of a fetch.
    pub async fn resolve_node_path<R: RemoteTree + ?Sized>(&mut self, remote: &R, node: &Node) -> Result<String> {
        self.resolve_snapshot(remote, node, None).await
    }

    /// Resolve through parents `ancestry` has proven to be under the root,
    /// so a node with several parents gets its path inside the subtree.
    pub async fn resolve_node_path_within<R: RemoteTree + ?Sized>(
        &mut self,
        remote: &R,
        node: &Node,
        ancestry: &AncestryCache,
    ) -> Result<String> {
        self.resolve_snapshot(remote, node, Some(ancestry)).await
    }

    async fn resolve_snapshot<R: RemoteTree + ?Sized>(
        &mut self,
        remote: &R,
        node: &Node,
        ancestry: Option<&AncestryCache>,
    ) -> Result<String> {
        if let Some(path) = self.get(&node.id) {
            return Ok(path.to_string());
        }
        let segments = vec![(node.id.clone(), node.name.clone())];
        let next = self.pick_parent(&node.parents, ancestry);
        self.walk(remote, segments, next, ancestry).await
    }

    /// Parent to follow: an indexed one, else one known to be inside the
    /// root, else the first.
    fn pick_parent(&self, parents: &[String], ancestry: Option<&AncestryCache>) -> Option<String> {
        parents
            .iter()
            .find(|p| self.entries.contains_key(p.as_str()))
            .or_else(|| {
                let ancestry = ancestry?;
                parents.iter().find(|p| ancestry.cached(p) == Some(true))
            })
            .or_else(|| parents.first())
            .cloned()
    }

    /// Follow parents from `next` until an indexed node or a node without
    /// parents. `segments` holds (id, name) pairs, leaf first.
    ///
    /// A fetch error or a cycle stops the walk; the partial path is
    /// returned but nothing is recorded.
    async fn walk<R: RemoteTree + ?Sized>(
        &mut self,
        remote: &R,
        mut segments: Vec<(String, String)>,
        mut next: Option<String>,
        ancestry: Option<&AncestryCache>,
    ) -> Result<String> {
        let mut visited: HashSet<String> = segments.iter().map(|(id, _)| id.clone()).collect();
        let mut base: Option<String> = None;
        let mut complete = true;

        while let Some(id) = next.take() {
            if let Some(path) = self.entries.get(&id) {
                base = Some(path.clone());
                break;
            }
            if !visited.insert(id.clone()) {
                warn!("Parent cycle through {} while resolving path", id);
                complete = false;
                break;
            }
            match remote.get_node(&id).await {
                Ok(node) => {
                    next = self.pick_parent(&node.parents, ancestry);
                    segments.push((id, node.name));
                }
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!("Error resolving path at {}: {}", id, e);
                    complete = false;
                    break;
                }
            }
        }

        let mut path = base.unwrap_or_default();
        let mut resolved = Vec::with_capacity(segments.len());
        for (id, name) in segments.into_iter().rev() {
            path = if path.is_empty() { name } else { format!("{}/{}", path, name) };
            resolved.push((id, path.clone()));
        }

        if complete {
            for (id, segment_path) in resolved {
                self.entries.entry(id).or_insert(segment_path);
            }
        } else {
            debug!("Returning partial path {}", path);
        }

        Ok(path)
    }
}
