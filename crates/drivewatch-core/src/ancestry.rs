//! Root-membership checks over the parent graph.
//!
//! A node is a descendant of the root if any of its declared parent chains
//! reaches the root. Answers are memoized per parent id for the lifetime
//! of the process; inconclusive answers (fetch failures, cycles) are not.

use crate::model::Node;
use crate::remote::{RemoteTree, Result};
use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tracing::{trace, warn};

/// Outcome of a membership check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Membership {
    /// Reaches the root
    Inside,
    /// Proven not to reach the root
    Outside,
    /// Could not be decided (fetch failure or cycle)
    Unknown,
}

/// A node whose parents are being explored.
struct Frame {
    id: String,
    parents: Vec<String>,
    next: usize,
    inconclusive: bool,
    /// Whether the outcome is memoized under `id`
    record: bool,
}

/// Memoized membership of ids in the subtree under `root_id`.
#[derive(Debug, Clone)]
pub struct AncestryCache {
    root_id: String,
    known: HashMap<String, bool>,
    /// Wait after a failed parent fetch
    backoff: Duration,
}

impl AncestryCache {
    pub fn new(root_id: &str, backoff: Duration) -> Self {
        Self {
            root_id: root_id.to_string(),
            known: HashMap::new(),
            backoff,
        }
    }

    /// Cached answer for `id`, if settled.
    pub fn cached(&self, id: &str) -> Option<bool> {
        self.known.get(id).copied()
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Whether `node` lives under the root. Fails closed: anything that
    /// cannot be decided counts as outside. Only authentication errors
    /// are returned.
    pub async fn is_descendant<R: RemoteTree + ?Sized>(&mut self, remote: &R, node: &Node) -> Result<bool> {
        if node.parents.is_empty() {
            return Ok(false);
        }
        let start = Frame {
            id: node.id.clone(),
            parents: node.parents.clone(),
            next: 0,
            inconclusive: false,
            record: false,
        };
        let membership = self.explore(remote, start).await?;
        Ok(membership == Membership::Inside)
    }

    /// Membership of the node with id `id` itself.
    pub async fn membership<R: RemoteTree + ?Sized>(&mut self, remote: &R, id: &str) -> Result<Membership> {
        if let Some(settled) = self.settled(id) {
            return Ok(settled);
        }
        match self.open(remote, id).await? {
            Ok(frame) => self.explore(remote, frame).await,
            Err(settled) => Ok(settled),
        }
    }

    fn settled(&self, id: &str) -> Option<Membership> {
        if id == self.root_id {
            return Some(Membership::Inside);
        }
        self.known.get(id).map(|&inside| {
            if inside {
                Membership::Inside
            } else {
                Membership::Outside
            }
        })
    }

    /// Fetch `id` and turn it into a frame, or settle it right away.
    async fn open<R: RemoteTree + ?Sized>(
        &mut self,
        remote: &R,
        id: &str,
    ) -> Result<std::result::Result<Frame, Membership>> {
        match remote.get_node(id).await {
            Ok(parent) if parent.id == self.root_id => {
                self.known.insert(id.to_string(), true);
                Ok(Err(Membership::Inside))
            }
            Ok(parent) if parent.parents.is_empty() => {
                self.known.insert(id.to_string(), false);
                Ok(Err(Membership::Outside))
            }
            Ok(parent) => Ok(Ok(Frame {
                id: id.to_string(),
                parents: parent.parents,
                next: 0,
                inconclusive: false,
                record: true,
            })),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => {
                warn!("Error checking ancestry of {}: {}", id, e);
                tokio::time::sleep(self.backoff).await;
                Ok(Err(Membership::Unknown))
            }
        }
    }

    /// Depth-first search over declared parents with an explicit stack.
    async fn explore<R: RemoteTree + ?Sized>(&mut self, remote: &R, start: Frame) -> Result<Membership> {
        let mut on_path: HashSet<String> = HashSet::from([start.id.clone()]);
        let mut stack = vec![start];
        let mut carry: Option<Membership> = None;

        while let Some(mut frame) = stack.pop() {
            match carry.take() {
                Some(Membership::Inside) => {
                    self.finish(&frame, Membership::Inside);
                    on_path.remove(&frame.id);
                    carry = Some(Membership::Inside);
                    continue;
                }
                Some(Membership::Unknown) => frame.inconclusive = true,
                Some(Membership::Outside) | None => {}
            }

            let Some(pid) = frame.parents.get(frame.next).cloned() else {
                let outcome = if frame.inconclusive {
                    Membership::Unknown
                } else {
                    Membership::Outside
                };
                self.finish(&frame, outcome);
                on_path.remove(&frame.id);
                carry = Some(outcome);
                continue;
            };
            frame.next += 1;

            if let Some(settled) = self.settled(&pid) {
                trace!("Ancestry of {} already known: {:?}", pid, settled);
                carry = Some(settled);
                stack.push(frame);
                continue;
            }
            if on_path.contains(&pid) {
                warn!("Parent cycle through {} while checking ancestry", pid);
                carry = Some(Membership::Unknown);
                stack.push(frame);
                continue;
            }

            let opened = self.open(remote, &pid).await?;
            stack.push(frame);
            match opened {
                Ok(parent) => {
                    on_path.insert(parent.id.clone());
                    stack.push(parent);
                }
                Err(settled) => carry = Some(settled),
            }
        }

        Ok(carry.unwrap_or(Membership::Unknown))
    }

    /// Memoize a settled frame; inconclusive outcomes are left open.
    fn finish(&mut self, frame: &Frame, outcome: Membership) {
        if !frame.record {
            return;
        }
        match outcome {
            Membership::Inside => {
                self.known.insert(frame.id.clone(), true);
            }
            Membership::Outside => {
                self.known.insert(frame.id.clone(), false);
            }
            Membership::Unknown => {}
        }
    }
}
