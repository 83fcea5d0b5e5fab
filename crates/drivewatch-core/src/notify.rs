//! Notification sink abstraction.

use async_trait::async_trait;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NotifyError {
    /// The endpoint answered with a non-success status
    #[error("Notification rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("Notification transport error: {0}")]
    Transport(String),
}

/// Delivers one formatted text block to an operator channel.
///
/// Delivery is best-effort: callers log failures and move on.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<(), NotifyError>;
}

#[async_trait]
impl<T: Notifier + ?Sized> Notifier for std::sync::Arc<T> {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        (**self).send(text).await
    }
}

/// Notifier that records every message, for tests.
#[derive(Default)]
pub struct RecordingNotifier {
    sent: RwLock<Vec<String>>,
    failing: RwLock<usize>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject the next `count` messages (they are not recorded).
    pub fn fail_next(&self, count: usize) {
        *self.failing.write().unwrap() = count;
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.read().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn send(&self, text: &str) -> Result<(), NotifyError> {
        let mut failing = self.failing.write().unwrap();
        if *failing > 0 {
            *failing -= 1;
            return Err(NotifyError::Rejected {
                status: 500,
                body: "simulated failure".to_string(),
            });
        }
        drop(failing);

        self.sent.write().unwrap().push(text.to_string());
        Ok(())
    }
}
