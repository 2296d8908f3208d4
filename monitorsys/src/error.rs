//! Error type for the feed client.

use thiserror::Error;
use tokio_tungstenite::tungstenite;

pub type Result<T> = std::result::Result<T, FeedError>;

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("malformed snapshot: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("websocket: {0}")]
    WebSocket(#[from] tungstenite::Error),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("tls: {0}")]
    Tls(#[from] rustls::Error),

    #[error("no certificates found in {path}")]
    NoCertificates { path: String },

    #[error("unsupported scheme '{scheme}' (expected ws, wss, http or https)")]
    UnsupportedScheme { scheme: String },

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("feed task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
