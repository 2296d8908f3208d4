//! Endpoint derivation: the telemetry socket lives at `/ws` on the serving host,
//! with `wss` mirroring an `https` origin.

use url::Url;

use crate::error::{FeedError, Result};

pub const WS_PATH: &str = "/ws";

/// `http://host:port` -> `ws://host:port/ws`, `https://..` -> `wss://../ws`.
pub fn endpoint_from_origin(origin: &str) -> Result<Url> {
    let parsed = Url::parse(origin)?;
    let scheme = match parsed.scheme() {
        "http" => "ws",
        "https" => "wss",
        other => {
            return Err(FeedError::UnsupportedScheme {
                scheme: other.to_string(),
            })
        }
    };
    let host = parsed.host_str().ok_or(url::ParseError::EmptyHost)?;
    let authority = match parsed.port() {
        Some(p) => format!("{host}:{p}"),
        None => host.to_string(),
    };
    Ok(Url::parse(&format!("{scheme}://{authority}{WS_PATH}"))?)
}

/// Accept either a ws(s) URL as-is or an http(s) page origin.
pub fn resolve_endpoint(target: &str) -> Result<Url> {
    let parsed = Url::parse(target)?;
    match parsed.scheme() {
        "ws" | "wss" => Ok(parsed),
        _ => endpoint_from_origin(target),
    }
}
