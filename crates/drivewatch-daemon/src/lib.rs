//! drivewatch-daemon library: Google Drive, Slack and file-backed
//! implementations of the drivewatch-core traits.
//!
//! This is a thin library layer over the daemon components,
//! allowing integration tests to access internal types.

pub mod auth;
pub mod config;
pub mod drive;
pub mod slack;
pub mod state;

// Re-export key types for convenience
pub use auth::{AuthorizedUser, TokenManager};
pub use config::{Args, Config, ConfigError, Environment};
pub use drive::DriveClient;
pub use slack::SlackNotifier;
pub use state::JsonFileStore;
