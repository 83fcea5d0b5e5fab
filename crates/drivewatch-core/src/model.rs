//! Snapshots of remote nodes and the change records that carry them.

use chrono::{DateTime, Utc};
use std::fmt;

/// A remote node as observed at change time. Never mutated locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// Opaque remote identifier
    pub id: String,
    /// Display name (one path segment)
    pub name: String,
    /// Declared parents, in the order the remote reports them
    pub parents: Vec<String>,
    /// Whether this node is a folder
    pub is_folder: bool,
    /// Whether this node has been moved to the trash
    pub trashed: bool,
    /// Owner identities (email addresses)
    pub owners: Vec<String>,
    /// Identity of the last modifier, when the remote reports one
    pub last_modifying_user: Option<String>,
    /// Last modification time
    pub modified_time: Option<DateTime<Utc>>,
}

impl Node {
    /// Minimal folder snapshot, mostly useful for building test trees.
    pub fn folder(id: impl Into<String>, name: impl Into<String>, parents: &[&str]) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parents: parents.iter().map(|p| p.to_string()).collect(),
            is_folder: true,
            trashed: false,
            owners: Vec::new(),
            last_modifying_user: None,
            modified_time: None,
        }
    }

    /// Minimal file snapshot.
    pub fn file(id: impl Into<String>, name: impl Into<String>, parents: &[&str]) -> Self {
        Self {
            is_folder: false,
            ..Self::folder(id, name, parents)
        }
    }

    /// First declared parent.
    pub fn first_parent(&self) -> Option<&str> {
        self.parents.first().map(String::as_str)
    }

    pub fn kind(&self) -> NodeKind {
        if self.is_folder {
            NodeKind::Folder
        } else {
            NodeKind::File
        }
    }

    pub fn event_kind(&self) -> EventKind {
        if self.trashed {
            EventKind::Trashed
        } else {
            EventKind::Modified
        }
    }
}

/// One entry of a change page.
///
/// Fields are optional because the remote feed is allowed to omit them;
/// the poller decides which combinations are actionable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Change {
    /// Id of the changed node, when reported
    pub node_id: Option<String>,
    /// Whether the node was removed from the caller's view
    pub removed: bool,
    /// Snapshot of the node (absent for pure removals)
    pub node: Option<Node>,
    /// When the change happened; `None` if missing or unparsable
    pub time: Option<DateTime<Utc>>,
}

impl Change {
    /// A change carrying a snapshot, stamped at `time`.
    pub fn of(node: Node, time: DateTime<Utc>) -> Self {
        Self {
            node_id: Some(node.id.clone()),
            removed: false,
            node: Some(node),
            time: Some(time),
        }
    }
}

/// One page of the change feed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangePage {
    pub changes: Vec<Change>,
    /// Continuation cursor for the next page of the same listing
    pub next_page_token: Option<String>,
    /// New baseline cursor, present once the end of history is reached
    pub new_start_page_token: Option<String>,
}

/// One page of a folder listing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChildPage {
    pub nodes: Vec<Node>,
    pub next_page_token: Option<String>,
}

/// Notification event label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Modified,
    Trashed,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EventKind::Modified => f.write_str("MODIFIED"),
            EventKind::Trashed => f.write_str("TRASHED"),
        }
    }
}

/// Notification type label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    File,
    Folder,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::File => f.write_str("FILE"),
            NodeKind::Folder => f.write_str("FOLDER"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        let mut node = Node::file("X", "X", &["F1"]);
        assert_eq!(node.kind(), NodeKind::File);
        assert_eq!(node.event_kind(), EventKind::Modified);

        node.trashed = true;
        assert_eq!(node.event_kind(), EventKind::Trashed);

        let folder = Node::folder("F1", "Reports", &["F0"]);
        assert_eq!(folder.kind(), NodeKind::Folder);
        assert_eq!(folder.first_parent(), Some("F0"));
    }

    #[test]
    fn test_labels() {
        assert_eq!(EventKind::Modified.to_string(), "MODIFIED");
        assert_eq!(EventKind::Trashed.to_string(), "TRASHED");
        assert_eq!(NodeKind::File.to_string(), "FILE");
        assert_eq!(NodeKind::Folder.to_string(), "FOLDER");
    }
}
