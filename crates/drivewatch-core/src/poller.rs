//! Change feed poller.
//!
//! Owns the cursor, the path index and the ancestry cache. One cycle
//! drains change pages from the current cursor, delivers a notification
//! for every change under the root, and persists the cursor after each
//! page. The run loop repeats cycles forever, sleeping in between; only
//! authentication failures end it.

use crate::ancestry::AncestryCache;
use crate::format::Notification;
use crate::index::PathIndex;
use crate::model::Change;
use crate::notify::Notifier;
use crate::remote::{RemoteError, RemoteTree};
use crate::retry::RetryPolicy;
use crate::store::{CursorState, CursorStore, StoreError};
use chrono_tz::Tz;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, trace, warn};

#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    #[error("Cursor store error: {0}")]
    Store(#[from] StoreError),

    #[error("Poller has no cursor; call start() first")]
    NotStarted,
}

impl MonitorError {
    /// Whether monitoring must stop.
    pub fn is_fatal(&self) -> bool {
        match self {
            MonitorError::Remote(e) => e.is_fatal(),
            MonitorError::Store(_) | MonitorError::NotStarted => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;

/// Monitoring settings.
#[derive(Debug, Clone)]
pub struct MonitorConfig {
    /// Id of the monitored root folder
    pub root_id: String,
    /// Display label the root path starts with
    pub root_label: String,
    /// Sleep between poll cycles
    pub poll_interval: Duration,
    /// Zone change times are shown in
    pub zone: Tz,
    /// Build the full path index on start even when resuming from a stored cursor
    pub rebuild_index: bool,
    /// Retry for fetching the initial cursor
    pub cursor_retry: RetryPolicy,
    /// Retry for listing one folder during the index build
    pub listing_retry: RetryPolicy,
    /// Wait after a failed parent fetch during ancestry checks
    pub ancestry_backoff: Duration,
}

impl MonitorConfig {
    pub fn new(root_id: impl Into<String>, root_label: impl Into<String>, zone: Tz) -> Self {
        Self {
            root_id: root_id.into(),
            root_label: root_label.into(),
            poll_interval: Duration::from_secs(60),
            zone,
            rebuild_index: false,
            cursor_retry: RetryPolicy::forever(Duration::from_secs(3)),
            listing_retry: RetryPolicy::forever(Duration::from_secs(3)),
            ancestry_backoff: Duration::from_secs(2),
        }
    }
}

/// Where the poller is in its loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// Not started yet
    Init,
    /// Requesting the first page of a cycle
    Fetching,
    /// Requesting continuation pages
    Draining,
    /// Adopting a new baseline cursor
    Rotating,
    /// Waiting for the next cycle
    Sleeping,
}

/// Summary of one poll cycle.
#[derive(Debug, Clone, Default)]
pub struct CycleReport {
    /// Pages fetched
    pub pages: usize,
    /// Change records seen
    pub seen: usize,
    /// Records skipped as not actionable or malformed
    pub skipped: usize,
    /// Notifications produced, in feed order (delivered or not)
    pub delivered: Vec<Notification>,
    /// Notifications the sink rejected
    pub failed_deliveries: usize,
    /// Whether the cycle ended on a new baseline cursor
    pub rotated: bool,
    /// Whether a cursor write failed and ended the cycle early
    pub persist_failed: bool,
}

/// Cursor-driven change poller.
pub struct Poller<R, S, N> {
    remote: R,
    store: S,
    notifier: N,
    config: MonitorConfig,
    cursor: Option<String>,
    index: PathIndex,
    ancestry: AncestryCache,
    state: PollerState,
}

impl<R, S, N> Poller<R, S, N>
where
    R: RemoteTree,
    S: CursorStore,
    N: Notifier,
{
    pub fn new(remote: R, store: S, notifier: N, config: MonitorConfig) -> Self {
        let index = PathIndex::new(&config.root_id, &config.root_label);
        let ancestry = AncestryCache::new(&config.root_id, config.ancestry_backoff);
        Self {
            remote,
            store,
            notifier,
            config,
            cursor: None,
            index,
            ancestry,
            state: PollerState::Init,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    /// Cursor the next cycle starts from.
    pub fn cursor(&self) -> Option<&str> {
        self.cursor.as_deref()
    }

    pub fn index(&self) -> &PathIndex {
        &self.index
    }

    pub fn ancestry(&self) -> &AncestryCache {
        &self.ancestry
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Load or create the cursor and prepare the path index.
    ///
    /// Without a stored cursor, the current remote cursor becomes the
    /// starting point and is persisted before the first poll; earlier
    /// history is never replayed. A cursor that cannot be persisted is not
    /// adopted.
    pub async fn start(&mut self) -> Result<()> {
        let stored = self.store.load().await?;

        let fresh = match stored.cursor {
            Some(cursor) => {
                info!("Resuming from stored cursor {}", cursor);
                self.cursor = Some(cursor);
                false
            }
            None => {
                info!("No stored cursor, fetching start cursor");
                let remote = &self.remote;
                let cursor = self
                    .config
                    .cursor_retry
                    .run("Fetching start cursor", || remote.current_cursor())
                    .await?;
                info!("Start cursor retrieved: {}", cursor);
                self.store.save(&CursorState::with_cursor(&cursor)).await?;
                self.cursor = Some(cursor);
                true
            }
        };

        if fresh || self.config.rebuild_index {
            self.index = PathIndex::build(
                &self.remote,
                &self.config.root_id,
                &self.config.root_label,
                &self.config.listing_retry,
            )
            .await?;
        } else {
            debug!("Skipping index build; paths resolve lazily");
        }

        self.state = PollerState::Fetching;
        Ok(())
    }

    /// Run one poll cycle: drain pages until a new baseline or the end of
    /// the listing. A failed cursor write ends the cycle without advancing.
    pub async fn poll_once(&mut self) -> Result<CycleReport> {
        let mut cursor = self.cursor.clone().ok_or(MonitorError::NotStarted)?;
        let mut report = CycleReport::default();
        self.state = PollerState::Fetching;

        loop {
            let page = self.remote.list_changes(&cursor).await?;
            report.pages += 1;

            for change in page.changes {
                report.seen += 1;
                self.process(change, &mut report).await?;
            }

            if let Some(next) = page.next_page_token {
                if !self.persist(&next).await {
                    report.persist_failed = true;
                    break;
                }
                cursor = next;
                self.state = PollerState::Draining;
                continue;
            }

            if let Some(baseline) = page.new_start_page_token {
                self.state = PollerState::Rotating;
                if self.persist(&baseline).await {
                    report.rotated = true;
                } else {
                    report.persist_failed = true;
                }
            }
            break;
        }

        Ok(report)
    }

    /// Poll forever. Returns only on fatal errors.
    pub async fn run(&mut self) -> Result<()> {
        while self.state == PollerState::Init {
            match self.start().await {
                Ok(()) => {}
                Err(e) if e.is_fatal() => {
                    error!("Fatal error during start-up: {}", e);
                    return Err(e);
                }
                Err(e) => {
                    error!("Start-up failed, retrying: {}", e);
                    tokio::time::sleep(self.config.cursor_retry.delay).await;
                }
            }
        }
        info!(
            "Monitoring folder: {} ({}) every {}s",
            self.config.root_label,
            self.config.root_id,
            self.config.poll_interval.as_secs()
        );

        loop {
            match self.poll_once().await {
                Ok(report) => debug!(
                    "Cycle done: {} page(s), {} change(s), {} notification(s)",
                    report.pages,
                    report.seen,
                    report.delivered.len()
                ),
                Err(e) if e.is_fatal() => {
                    error!("Fatal error, stopping monitor: {}", e);
                    return Err(e);
                }
                Err(e) => error!("Poll cycle failed: {}", e),
            }

            self.state = PollerState::Sleeping;
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Persist `cursor` and adopt it only if the write succeeded.
    async fn persist(&mut self, cursor: &str) -> bool {
        match self.store.save(&CursorState::with_cursor(cursor)).await {
            Ok(()) => {
                self.cursor = Some(cursor.to_string());
                true
            }
            Err(e) => {
                error!("Failed to persist cursor {}: {}", cursor, e);
                false
            }
        }
    }

    /// Filter, resolve and deliver one change. Only fatal errors escape.
    async fn process(&mut self, change: Change, report: &mut CycleReport) -> std::result::Result<(), RemoteError> {
        let Some(node) = change.node else {
            trace!("Skipping change without snapshot: {:?}", change.node_id);
            report.skipped += 1;
            return Ok(());
        };
        let Some(time) = change.time else {
            warn!("Skipping change for {} with missing or invalid time", node.id);
            report.skipped += 1;
            return Ok(());
        };
        if node.id.is_empty() {
            warn!("Skipping change with empty node id");
            report.skipped += 1;
            return Ok(());
        }

        if !self.ancestry.is_descendant(&self.remote, &node).await? {
            trace!("Ignoring change outside root: {}", node.id);
            return Ok(());
        }

        let path = self
            .index
            .resolve_node_path_within(&self.remote, &node, &self.ancestry)
            .await?;
        let notification = Notification::new(&node, node.event_kind(), time, self.config.zone, path);

        info!(
            "[{}] {} ({}) TYPE: {} PATH: {} OWNER: {} MODIFIED BY: {}",
            notification.event,
            notification.when,
            notification.zone.name(),
            notification.kind,
            notification.path,
            notification.owner_list(),
            notification.modified_by
        );

        if let Err(e) = self.notifier.send(&notification.render()).await {
            error!("Failed to deliver notification for {}: {}", notification.path, e);
            report.failed_deliveries += 1;
        }
        report.delivered.push(notification);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ChangePage, EventKind, Node, NodeKind};
    use crate::notify::RecordingNotifier;
    use crate::remote::InMemoryTree;
    use crate::store::InMemoryCursorStore;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    type TestPoller = Poller<Arc<InMemoryTree>, Arc<InMemoryCursorStore>, Arc<RecordingNotifier>>;

    struct Harness {
        tree: Arc<InMemoryTree>,
        store: Arc<InMemoryCursorStore>,
        sink: Arc<RecordingNotifier>,
    }

    impl Harness {
        fn new(store: InMemoryCursorStore) -> Self {
            let tree = InMemoryTree::new();
            tree.insert(Node::folder("top", "My Drive", &[]));
            tree.insert(Node::folder("F0", "Team Folder", &["top"]));
            tree.insert(Node::folder("F1", "Reports", &["F0"]));
            tree.insert(Node::folder("O1", "Personal", &["top"]));
            Self {
                tree: Arc::new(tree),
                store: Arc::new(store),
                sink: Arc::new(RecordingNotifier::new()),
            }
        }

        fn config() -> MonitorConfig {
            let mut config = MonitorConfig::new("F0", "Team", chrono_tz::America::Toronto);
            config.poll_interval = Duration::ZERO;
            config.cursor_retry = RetryPolicy::forever(Duration::ZERO);
            config.listing_retry = RetryPolicy::forever(Duration::ZERO);
            config.ancestry_backoff = Duration::ZERO;
            config
        }

        fn poller_with(&self, config: MonitorConfig) -> TestPoller {
            Poller::new(
                Arc::clone(&self.tree),
                Arc::clone(&self.store),
                Arc::clone(&self.sink),
                config,
            )
        }

        fn poller(&self) -> TestPoller {
            self.poller_with(Self::config())
        }
    }

    fn at(ts: &str) -> DateTime<Utc> {
        ts.parse().unwrap()
    }

    fn file_x(trashed: bool) -> Node {
        let mut node = Node::file("X", "X", &["F1"]);
        node.trashed = trashed;
        node.owners = vec!["owner@example.com".into()];
        node.last_modifying_user = Some("editor@example.com".into());
        node
    }

    fn page(changes: Vec<Change>, next: Option<&str>, baseline: Option<&str>) -> ChangePage {
        ChangePage {
            changes,
            next_page_token: next.map(str::to_string),
            new_start_page_token: baseline.map(str::to_string),
        }
    }

    #[tokio::test]
    async fn test_start_creates_and_persists_cursor() {
        let h = Harness::new(InMemoryCursorStore::new());
        h.tree.set_current_cursor("c1");
        let mut poller = h.poller();

        poller.start().await.unwrap();

        assert_eq!(poller.cursor(), Some("c1"));
        assert_eq!(h.store.cursor().as_deref(), Some("c1"));
        assert_eq!(poller.index().get("F1"), Some("Team/Reports"));
        assert_eq!(poller.state(), PollerState::Fetching);
        assert!(h.tree.requested_cursors().is_empty());
    }

    #[tokio::test]
    async fn test_start_retries_transient_cursor_errors() {
        let h = Harness::new(InMemoryCursorStore::new());
        h.tree.set_current_cursor("c1");
        h.tree.fail_cursor(RemoteError::Transient("503".into()));
        let mut poller = h.poller();

        poller.start().await.unwrap();
        assert_eq!(poller.cursor(), Some("c1"));
    }

    #[tokio::test]
    async fn test_modified_then_trashed_scenario() {
        let h = Harness::new(InMemoryCursorStore::new());
        h.tree.set_current_cursor("c1");
        h.tree.script_page(
            "c1",
            page(vec![Change::of(file_x(false), at("2024-01-01T12:00:00Z"))], None, Some("c2")),
        );
        h.tree.script_page(
            "c2",
            page(vec![Change::of(file_x(true), at("2024-01-01T13:00:00Z"))], None, Some("c3")),
        );
        let mut poller = h.poller();
        poller.start().await.unwrap();

        let first = poller.poll_once().await.unwrap();
        assert_eq!(first.delivered.len(), 1);
        let modified = &first.delivered[0];
        assert_eq!(modified.event, EventKind::Modified);
        assert_eq!(modified.path, "Team/Reports/X");
        assert_eq!(modified.kind, NodeKind::File);
        assert_eq!(modified.when, "2024-01-01 07:00:00");

        let second = poller.poll_once().await.unwrap();
        assert_eq!(second.delivered[0].event, EventKind::Trashed);
        assert_eq!(second.delivered[0].path, "Team/Reports/X");

        let sent = h.sink.sent();
        assert_eq!(sent.len(), 2);
        assert!(sent[0].starts_with("[MODIFIED] \n🕓 *Time:* 2024-01-01 07:00:00 (America/Toronto)\n📁 *Path:* Team/Reports/X\n"));
        assert!(sent[1].starts_with("[TRASHED] "));
        assert_eq!(h.store.cursor().as_deref(), Some("c3"));
    }

    #[tokio::test]
    async fn test_changes_outside_root_are_dropped() {
        let h = Harness::new(InMemoryCursorStore::with_cursor("c1"));
        let outside = Node::file("Y", "diary.txt", &["O1"]);
        h.tree.script_page(
            "c1",
            page(vec![Change::of(outside, at("2024-01-01T12:00:00Z"))], None, Some("c2")),
        );
        let mut poller = h.poller();
        poller.start().await.unwrap();

        let report = poller.poll_once().await.unwrap();

        assert_eq!(report.seen, 1);
        assert!(report.delivered.is_empty());
        assert!(h.sink.sent().is_empty());
        assert_eq!(h.store.cursor().as_deref(), Some("c2"));
    }

    #[tokio::test]
    async fn test_resume_from_stored_cursor_skips_index_build() {
        let h = Harness::new(InMemoryCursorStore::with_cursor("c42"));
        h.tree.set_current_cursor("c99");
        let mut poller = h.poller();

        poller.start().await.unwrap();
        poller.poll_once().await.unwrap();

        assert_eq!(h.tree.requested_cursors()[0], "c42");
        assert_eq!(poller.index().len(), 1);
        assert!(h.store.history().iter().all(|c| c != "c99"));
    }

    #[tokio::test]
    async fn test_resume_with_rebuild_builds_index() {
        let h = Harness::new(InMemoryCursorStore::with_cursor("c42"));
        let mut config = Harness::config();
        config.rebuild_index = true;
        let mut poller = h.poller_with(config);

        poller.start().await.unwrap();

        assert_eq!(poller.cursor(), Some("c42"));
        assert_eq!(poller.index().get("F1"), Some("Team/Reports"));
    }

    #[tokio::test]
    async fn test_lazy_path_resolution_after_resume() {
        let h = Harness::new(InMemoryCursorStore::with_cursor("c1"));
        h.tree.script_page(
            "c1",
            page(vec![Change::of(file_x(false), at("2024-01-01T12:00:00Z"))], None, Some("c2")),
        );
        let mut poller = h.poller();
        poller.start().await.unwrap();

        let report = poller.poll_once().await.unwrap();

        assert_eq!(report.delivered[0].path, "Team/Reports/X");
        assert_eq!(poller.index().get("F1"), Some("Team/Reports"));
    }

    #[tokio::test]
    async fn test_pages_persist_cursor_after_each_page() {
        let h = Harness::new(InMemoryCursorStore::with_cursor("c1"));
        let x = Change::of(file_x(false), at("2024-01-01T12:00:00Z"));
        h.tree.script_page("c1", page(vec![x.clone()], Some("p2"), None));
        h.tree.script_page("p2", page(vec![x], None, Some("c2")));
        let mut poller = h.poller();
        poller.start().await.unwrap();

        let report = poller.poll_once().await.unwrap();

        assert_eq!(report.pages, 2);
        assert!(report.rotated);
        assert_eq!(report.delivered.len(), 2);
        assert_eq!(h.store.history(), vec!["p2".to_string(), "c2".to_string()]);
        assert_eq!(poller.cursor(), Some("c2"));
        assert_eq!(h.tree.requested_cursors(), vec!["c1".to_string(), "p2".to_string()]);
    }

    #[tokio::test]
    async fn test_failed_cursor_write_does_not_advance() {
        let h = Harness::new(InMemoryCursorStore::with_cursor("c1"));
        let x = Change::of(file_x(false), at("2024-01-01T12:00:00Z"));
        h.tree.script_page("c1", page(vec![x.clone()], Some("p2"), None));
        h.tree.script_page("p2", page(vec![x], None, Some("c2")));
        let mut poller = h.poller();
        poller.start().await.unwrap();
        h.store.fail_next_writes(1);

        let first = poller.poll_once().await.unwrap();
        assert!(first.persist_failed);
        assert_eq!(first.pages, 1);
        assert_eq!(poller.cursor(), Some("c1"));
        assert_eq!(h.store.cursor().as_deref(), Some("c1"));

        // The same page is read again: delivery is at-least-once.
        let second = poller.poll_once().await.unwrap();
        assert_eq!(second.pages, 2);
        assert_eq!(h.tree.requested_cursors(), vec!["c1", "c1", "p2"]);
        assert_eq!(h.sink.sent().len(), 3);
    }

    #[tokio::test]
    async fn test_restart_after_crash_resumes_without_skipping() {
        let h = Harness::new(InMemoryCursorStore::with_cursor("c1"));
        let x = Change::of(file_x(false), at("2024-01-01T12:00:00Z"));
        h.tree.script_page("c1", page(vec![x.clone()], Some("p2"), None));
        h.tree.script_page("p2", page(vec![x.clone()], None, Some("c2")));
        h.tree.script_page("c2", page(vec![x], None, Some("c3")));

        {
            let mut poller = h.poller();
            poller.start().await.unwrap();
            poller.poll_once().await.unwrap();
            assert_eq!(h.store.cursor().as_deref(), Some("c2"));
        }

        // A new process picks up exactly where the stored cursor points.
        let mut restarted = h.poller();
        restarted.start().await.unwrap();
        let report = restarted.poll_once().await.unwrap();

        assert_eq!(report.delivered.len(), 1);
        assert_eq!(h.tree.requested_cursors().last().map(String::as_str), Some("c2"));
        assert_eq!(h.store.cursor().as_deref(), Some("c3"));
    }

    #[tokio::test]
    async fn test_sink_failure_does_not_abort_cycle() {
        let h = Harness::new(InMemoryCursorStore::with_cursor("c1"));
        let mut other = file_x(false);
        other.id = "Z".into();
        other.name = "Z".into();
        h.tree.script_page(
            "c1",
            page(
                vec![
                    Change::of(file_x(false), at("2024-01-01T12:00:00Z")),
                    Change::of(other, at("2024-01-01T12:01:00Z")),
                ],
                None,
                Some("c2"),
            ),
        );
        h.sink.fail_next(1);
        let mut poller = h.poller();
        poller.start().await.unwrap();

        let report = poller.poll_once().await.unwrap();

        assert_eq!(report.delivered.len(), 2);
        assert_eq!(report.failed_deliveries, 1);
        assert_eq!(h.sink.sent().len(), 1);
        assert!(h.sink.sent()[0].contains("Team/Reports/Z"));
        assert!(report.rotated);
    }

    #[tokio::test]
    async fn test_unactionable_and_malformed_records_are_skipped() {
        let h = Harness::new(InMemoryCursorStore::with_cursor("c1"));
        let pure_removal = Change {
            node_id: Some("gone".into()),
            removed: true,
            node: None,
            time: Some(at("2024-01-01T12:00:00Z")),
        };
        let no_time = Change {
            time: None,
            ..Change::of(file_x(false), at("2024-01-01T12:00:00Z"))
        };
        let good = Change::of(file_x(false), at("2024-01-01T12:00:00Z"));
        h.tree.script_page("c1", page(vec![pure_removal, no_time, good], None, Some("c2")));
        let mut poller = h.poller();
        poller.start().await.unwrap();

        let report = poller.poll_once().await.unwrap();

        assert_eq!(report.seen, 3);
        assert_eq!(report.skipped, 2);
        assert_eq!(report.delivered.len(), 1);
    }

    #[tokio::test]
    async fn test_removal_event_follows_trashed_flag() {
        let h = Harness::new(InMemoryCursorStore::with_cursor("c1"));
        let removed_live = Change {
            removed: true,
            ..Change::of(file_x(false), at("2024-01-01T12:00:00Z"))
        };
        let removed_trashed = Change {
            removed: true,
            ..Change::of(file_x(true), at("2024-01-01T12:01:00Z"))
        };
        h.tree.script_page("c1", page(vec![removed_live, removed_trashed], None, Some("c2")));
        let mut poller = h.poller();
        poller.start().await.unwrap();

        let report = poller.poll_once().await.unwrap();
        assert_eq!(report.delivered[0].event, EventKind::Modified);
        assert_eq!(report.delivered[1].event, EventKind::Trashed);
    }

    #[tokio::test]
    async fn test_shared_file_path_goes_through_parent_under_root() {
        let h = Harness::new(InMemoryCursorStore::with_cursor("c1"));
        let shared = Node::file("S", "shared.doc", &["O1", "F1"]);
        h.tree.script_page(
            "c1",
            page(vec![Change::of(shared, at("2024-01-01T12:00:00Z"))], None, Some("c2")),
        );
        let mut poller = h.poller();
        poller.start().await.unwrap();

        let report = poller.poll_once().await.unwrap();

        assert_eq!(report.delivered.len(), 1);
        assert_eq!(report.delivered[0].path, "Team/Reports/shared.doc");
        assert_eq!(poller.index().get("S"), Some("Team/Reports/shared.doc"));
        assert!(!poller.index().contains("O1"));
    }

    #[tokio::test]
    async fn test_unsaved_start_cursor_is_not_adopted() {
        let h = Harness::new(InMemoryCursorStore::new());
        h.tree.set_current_cursor("c1");
        h.store.fail_next_writes(1);
        let mut poller = h.poller();

        let err = poller.start().await.unwrap_err();
        assert!(matches!(err, MonitorError::Store(_)));
        assert!(!err.is_fatal());
        assert_eq!(poller.cursor(), None);
        assert_eq!(poller.state(), PollerState::Init);

        poller.start().await.unwrap();
        assert_eq!(poller.cursor(), Some("c1"));
        assert_eq!(h.store.cursor().as_deref(), Some("c1"));
    }

    #[tokio::test]
    async fn test_run_retries_start_until_cursor_is_saved() {
        let h = Harness::new(InMemoryCursorStore::new());
        h.tree.set_current_cursor("c1");
        h.tree.fail_cursor(RemoteError::Malformed("html from proxy".into()));
        h.tree.fail_cursor(RemoteError::NotFound("startPageToken".into()));
        h.store.fail_next_writes(1);
        h.tree.fail_changes(RemoteError::Auth("token revoked".into()));
        let mut poller = h.poller();

        let result = tokio::time::timeout(Duration::from_secs(5), poller.run())
            .await
            .unwrap();

        assert!(matches!(result, Err(MonitorError::Remote(RemoteError::Auth(_)))));
        assert_eq!(h.store.cursor().as_deref(), Some("c1"));
        assert_eq!(h.tree.requested_cursors(), vec!["c1"]);
    }

    #[tokio::test]
    async fn test_run_stops_on_auth_error_during_start() {
        let h = Harness::new(InMemoryCursorStore::new());
        h.tree.fail_cursor(RemoteError::Auth("expired".into()));
        let mut poller = h.poller();

        let result = poller.run().await;

        assert!(matches!(result, Err(MonitorError::Remote(RemoteError::Auth(_)))));
        assert!(h.tree.requested_cursors().is_empty());
    }

    #[tokio::test]
    async fn test_transient_error_keeps_cursor() {
        let h = Harness::new(InMemoryCursorStore::with_cursor("c1"));
        h.tree.fail_changes(RemoteError::Transient("503".into()));
        let mut poller = h.poller();
        poller.start().await.unwrap();

        let err = poller.poll_once().await.unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(poller.cursor(), Some("c1"));

        poller.poll_once().await.unwrap();
        assert_eq!(h.tree.requested_cursors(), vec!["c1", "c1"]);
    }

    #[tokio::test]
    async fn test_poll_before_start_is_rejected() {
        let h = Harness::new(InMemoryCursorStore::new());
        let mut poller = h.poller();
        assert!(matches!(poller.poll_once().await, Err(MonitorError::NotStarted)));
    }

    #[tokio::test]
    async fn test_run_survives_transient_and_stops_on_auth() {
        let h = Harness::new(InMemoryCursorStore::with_cursor("c1"));
        h.tree.fail_changes(RemoteError::Transient("503".into()));
        h.tree.fail_changes(RemoteError::Auth("token revoked".into()));
        let mut poller = h.poller();

        let result = poller.run().await;

        assert!(matches!(result, Err(MonitorError::Remote(RemoteError::Auth(_)))));
        assert_eq!(h.tree.requested_cursors().len(), 2);
    }
}
