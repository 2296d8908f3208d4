//! Live host telemetry over WebSocket: a reconnecting feed client that decodes
//! snapshots and keeps rolling per-domain chart history.

pub mod endpoint;
pub mod error;
pub mod feed;
pub mod history;
pub mod logging;
pub mod profiles;
pub mod scheduler;
pub mod summary;
pub mod types;
pub mod ws;

pub use error::{FeedError, Result};
pub use feed::{ConnectionState, FeedClient, FeedConfig, FeedHandle, FeedUpdate};
pub use history::{History, HistoryPoint, RollingBuffer};
pub use types::Snapshot;
