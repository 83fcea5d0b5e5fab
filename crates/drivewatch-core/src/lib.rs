//! drivewatch-core: change tracking for a folder subtree of a remote file tree.
//!
//! This crate provides:
//! - A cursor-driven change feed poller with crash-safe resumption
//! - A node id → path index for the monitored subtree
//! - Ancestor-membership checks against the monitored root
//! - RemoteTree, CursorStore and Notifier trait abstractions with in-memory
//!   implementations for tests

pub mod ancestry;
pub mod format;
pub mod index;
pub mod model;
pub mod notify;
pub mod poller;
pub mod remote;
pub mod retry;
pub mod store;

pub use ancestry::{AncestryCache, Membership};
pub use format::Notification;
pub use index::PathIndex;
pub use model::{Change, ChangePage, ChildPage, EventKind, Node, NodeKind};
pub use notify::{Notifier, NotifyError, RecordingNotifier};
pub use poller::{CycleReport, MonitorConfig, MonitorError, Poller, PollerState};
pub use remote::{InMemoryTree, RemoteError, RemoteTree};
pub use retry::RetryPolicy;
pub use store::{CursorState, CursorStore, InMemoryCursorStore, StoreError};
