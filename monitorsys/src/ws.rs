//! WebSocket transport: the `Transport`/`Connection` seam plus the tungstenite implementation.

use std::{fs::File, io::BufReader, path::Path, sync::Arc};

use futures::future::BoxFuture;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async_tls_with_config, tungstenite::Message, Connector, MaybeTlsStream, WebSocketStream,
};
use url::Url;

use crate::error::{FeedError, Result};

pub type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Inbound data frames. Control frames never surface here.
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Text(String),
    Binary(Vec<u8>),
}

/// One live connection. `next_frame` yields None once the peer has closed.
pub trait Connection: Send {
    fn next_frame(&mut self) -> BoxFuture<'_, Option<Result<Frame>>>;
    fn close(&mut self) -> BoxFuture<'_, ()>;
}

pub trait Transport: Send + Sync {
    fn connect(&self, url: &Url) -> BoxFuture<'static, Result<Box<dyn Connection>>>;
}

/// rustls-backed transport. Trusts the bundled webpki roots unless a CA file is given.
#[derive(Clone)]
pub struct WsTransport {
    roots: Arc<rustls::RootCertStore>,
}

impl WsTransport {
    pub fn new() -> Self {
        let mut roots = rustls::RootCertStore::empty();
        roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        Self {
            roots: Arc::new(roots),
        }
    }

    /// Trust only the CA certificates in the given PEM file for wss:// endpoints.
    pub fn with_tls_ca(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut reader = BufReader::new(File::open(path)?);
        let mut roots = rustls::RootCertStore::empty();
        for cert in rustls_pemfile::certs(&mut reader) {
            roots.add(cert?)?;
        }
        if roots.is_empty() {
            return Err(FeedError::NoCertificates {
                path: path.display().to_string(),
            });
        }
        Ok(Self {
            roots: Arc::new(roots),
        })
    }

    fn client_config(&self) -> Result<Arc<rustls::ClientConfig>> {
        // explicit provider: several may be compiled in through dependencies
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let cfg = rustls::ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(Arc::clone(&self.roots))
            .with_no_client_auth();
        Ok(Arc::new(cfg))
    }
}

impl Default for WsTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for WsTransport {
    fn connect(&self, url: &Url) -> BoxFuture<'static, Result<Box<dyn Connection>>> {
        let url = url.to_string();
        let tls = self.client_config();
        Box::pin(async move {
            // plain ws:// ignores the connector
            let connector = Connector::Rustls(tls?);
            let (ws, _) = connect_async_tls_with_config(url, None, false, Some(connector)).await?;
            Ok(Box::new(WsConnection { ws }) as Box<dyn Connection>)
        })
    }
}

pub struct WsConnection {
    ws: WsStream,
}

impl Connection for WsConnection {
    fn next_frame(&mut self) -> BoxFuture<'_, Option<Result<Frame>>> {
        Box::pin(async move {
            loop {
                match self.ws.next().await? {
                    Ok(Message::Text(text)) => return Some(Ok(Frame::Text(text))),
                    Ok(Message::Binary(bytes)) => return Some(Ok(Frame::Binary(bytes))),
                    Ok(Message::Close(_)) => return None,
                    // ping/pong are answered by tungstenite
                    Ok(_) => {}
                    Err(e) => return Some(Err(e.into())),
                }
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            let _ = self.ws.close(None).await;
        })
    }
}
