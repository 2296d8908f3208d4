//! Feed client: owns the single live connection, the reconnect loop, the latest
//! snapshot and the five history buffers, and publishes changes to observers.
//!
//! The client is driven by one task (see [`FeedClient::start`]). Every event is
//! applied sequentially on that task, so state needs no locking:
//!
//! `Disconnected -> Connecting -> Connected -> Disconnected -> (delay) -> Connecting -> ...`
//!
//! `Stopped` is terminal and reachable from any state through [`FeedHandle::stop`].

use std::{sync::Arc, time::Duration};

use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::endpoint::resolve_endpoint;
use crate::error::{FeedError, Result};
use crate::history::{time_label, History, MAX_HISTORY_POINTS};
use crate::scheduler::{Scheduler, TokioScheduler};
use crate::types::Snapshot;
use crate::ws::{Connection, Frame, Transport, WsTransport};

pub const RECONNECT_DELAY: Duration = Duration::from_secs(2);

// Upper bound on the close handshake during teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
pub struct FeedConfig {
    pub url: Url,
    pub reconnect_delay: Duration,
    pub history_capacity: usize,
}

impl FeedConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            reconnect_delay: RECONNECT_DELAY,
            history_capacity: MAX_HISTORY_POINTS,
        }
    }

    /// Build from a ws(s) URL or an http(s) page origin.
    pub fn from_target(target: &str) -> Result<Self> {
        Ok(Self::new(resolve_endpoint(target)?))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Stopped,
}

/// Read-only view handed to observers.
#[derive(Debug)]
pub enum FeedUpdate<'a> {
    /// Sent only when the connected flag flips.
    Connection { connected: bool },
    /// Sent after every successfully decoded frame.
    Snapshot {
        snapshot: &'a Snapshot,
        history: &'a History,
    },
}

type Observer = Box<dyn FnMut(&FeedUpdate<'_>) + Send>;

enum PumpExit {
    Stopped,
    Closed,
    Failed(FeedError),
}

pub struct FeedClient {
    config: FeedConfig,
    transport: Arc<dyn Transport>,
    scheduler: Arc<dyn Scheduler>,
    state: ConnectionState,
    snapshot: Option<Snapshot>,
    history: History,
    observers: Vec<Observer>,
}

impl FeedClient {
    pub fn new(config: FeedConfig) -> Self {
        Self::with_parts(config, Arc::new(WsTransport::new()), Arc::new(TokioScheduler))
    }

    pub fn with_parts(
        config: FeedConfig,
        transport: Arc<dyn Transport>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Self {
        let history = History::new(config.history_capacity);
        Self {
            config,
            transport,
            scheduler,
            state: ConnectionState::Disconnected,
            snapshot: None,
            history,
            observers: Vec::new(),
        }
    }

    /// Register a callback. Observers must be registered before `start`.
    pub fn subscribe(&mut self, observer: impl FnMut(&FeedUpdate<'_>) + Send + 'static) {
        self.observers.push(Box::new(observer));
    }

    pub fn config(&self) -> &FeedConfig {
        &self.config
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Latest decoded snapshot; None before the first message.
    pub fn snapshot(&self) -> Option<&Snapshot> {
        self.snapshot.as_ref()
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn handle_open(&mut self) {
        info!(url = %self.config.url, "connected");
        self.set_state(ConnectionState::Connected);
    }

    pub fn handle_close(&mut self) {
        self.set_state(ConnectionState::Disconnected);
    }

    pub fn handle_error(&self, err: &FeedError) {
        error!(url = %self.config.url, "websocket error: {err}");
    }

    /// Decode one text frame, record its history points and notify observers.
    /// On error nothing changes and the caller drops the frame.
    pub fn ingest(&mut self, text: &str) -> Result<()> {
        let snapshot = Snapshot::from_json(text)?;
        let label = time_label(snapshot.timestamp);
        self.history.record(&snapshot, &label);
        debug!(
            time = %label,
            cores = snapshot.cpu.cores.len(),
            gpu = snapshot.gpu.is_some(),
            "snapshot"
        );
        self.snapshot = Some(snapshot);

        if let Some(snapshot) = self.snapshot.as_ref() {
            let update = FeedUpdate::Snapshot {
                snapshot,
                history: &self.history,
            };
            for observer in self.observers.iter_mut() {
                observer(&update);
            }
        }
        Ok(())
    }

    fn set_state(&mut self, next: ConnectionState) {
        let was = self.is_connected();
        self.state = next;
        let now = self.is_connected();
        if was != now {
            let update = FeedUpdate::Connection { connected: now };
            for observer in self.observers.iter_mut() {
                observer(&update);
            }
        }
    }

    /// Spawn the driver task on the current tokio runtime.
    pub fn start(self) -> FeedHandle {
        let (stop_tx, stop_rx) = oneshot::channel();
        let task = tokio::spawn(self.run(stop_rx));
        FeedHandle {
            stop: stop_tx,
            task,
        }
    }

    async fn run(mut self, mut stop: oneshot::Receiver<()>) -> Self {
        let transport = Arc::clone(&self.transport);
        let scheduler = Arc::clone(&self.scheduler);

        loop {
            self.state = ConnectionState::Connecting;
            debug!(url = %self.config.url, "connecting");
            let attempt = transport.connect(&self.config.url);
            let outcome = tokio::select! {
                biased;
                _ = &mut stop => break,
                res = attempt => res,
            };

            match outcome {
                Ok(mut conn) => {
                    self.handle_open();
                    match self.pump(conn.as_mut(), &mut stop).await {
                        PumpExit::Stopped => {
                            close_quietly(conn.as_mut()).await;
                            break;
                        }
                        // finish the close handshake the peer started
                        PumpExit::Closed => close_quietly(conn.as_mut()).await,
                        PumpExit::Failed(e) => {
                            self.handle_error(&e);
                            close_quietly(conn.as_mut()).await;
                        }
                    }
                }
                // a failed handshake takes the error path, then the close path
                Err(e) => self.handle_error(&e),
            }

            self.handle_close();
            let delay = self.config.reconnect_delay;
            warn!(
                url = %self.config.url,
                delay_ms = delay.as_millis() as u64,
                "disconnected, reconnecting"
            );
            let timer = scheduler.sleep(delay);
            tokio::select! {
                biased;
                _ = &mut stop => break,
                _ = timer => {}
            }
        }

        self.state = ConnectionState::Stopped;
        info!(url = %self.config.url, "feed stopped");
        self
    }

    async fn pump(
        &mut self,
        conn: &mut dyn Connection,
        stop: &mut oneshot::Receiver<()>,
    ) -> PumpExit {
        loop {
            tokio::select! {
                biased;
                _ = &mut *stop => return PumpExit::Stopped,
                frame = conn.next_frame() => match frame {
                    Some(Ok(Frame::Text(text))) => {
                        if let Err(e) = self.ingest(&text) {
                            warn!("dropping frame: {e}");
                        }
                    }
                    Some(Ok(Frame::Binary(bytes))) => {
                        debug!(len = bytes.len(), "ignoring binary frame");
                    }
                    Some(Err(e)) => return PumpExit::Failed(e),
                    None => return PumpExit::Closed,
                },
            }
        }
    }
}

async fn close_quietly(conn: &mut dyn Connection) {
    if tokio::time::timeout(CLOSE_TIMEOUT, conn.close()).await.is_err() {
        debug!("close handshake timed out");
    }
}

/// Running feed. Dropping the handle signals the task the same way `stop` does:
/// the connection is closed and no further updates are sent, but nothing waits for it.
pub struct FeedHandle {
    stop: oneshot::Sender<()>,
    task: JoinHandle<FeedClient>,
}

impl FeedHandle {
    /// Close the live connection or cancel the pending reconnect, then wait for the
    /// task to finish. No observer runs after this returns.
    pub async fn stop(self) -> Result<FeedClient> {
        let _ = self.stop.send(());
        Ok(self.task.await?)
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    const FRAME: &str = r#"{"timestamp": 1700000000,
        "cpu": {"cores": [10, 20], "average": 15, "frequency": 2400000},
        "ram": {"total": 16e9, "used": 8e9, "available": 8e9, "percent": 50},
        "network": {"interfaces": {"eth0": {"bytes_sent": 1, "bytes_recv": 2, "speed_up": 0, "speed_down": 0}}},
        "disk": {"read_bytes": 0, "write_bytes": 0, "read_speed": 0, "write_speed": 0},
        "gpu": null}"#;

    fn client() -> FeedClient {
        let cfg = FeedConfig::from_target("http://localhost:8000").unwrap();
        FeedClient::new(cfg)
    }

    #[test]
    fn defaults() {
        let c = client();
        assert_eq!(c.config().url.as_str(), "ws://localhost:8000/ws");
        assert_eq!(c.config().reconnect_delay, Duration::from_secs(2));
        assert_eq!(c.state(), ConnectionState::Disconnected);
        assert!(c.snapshot().is_none());
        assert_eq!(c.history().cpu.capacity(), 60);
    }

    #[test]
    fn connection_updates_only_on_change() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let mut c = client();
        let sink = Arc::clone(&seen);
        c.subscribe(move |u| {
            if let FeedUpdate::Connection { connected } = u {
                sink.lock().unwrap().push(*connected);
            }
        });
        c.handle_close();
        c.handle_open();
        c.handle_open();
        c.handle_close();
        c.handle_close();
        assert_eq!(*seen.lock().unwrap(), vec![true, false]);
    }

    #[test]
    fn malformed_frame_changes_nothing() {
        let mut c = client();
        c.handle_open();
        c.ingest(FRAME).unwrap();
        let before = c.snapshot().cloned();
        let err = c.ingest("{not json").unwrap_err();
        assert!(matches!(err, FeedError::Decode(_)));
        assert_eq!(c.snapshot().cloned(), before);
        assert_eq!(c.history().cpu.len(), 1);
        assert_eq!(c.history().gpu.len(), 0);
        assert!(c.is_connected());
    }

    #[test]
    fn ingest_publishes_snapshot_and_history() {
        let lens = Arc::new(Mutex::new(Vec::new()));
        let mut c = client();
        let sink = Arc::clone(&lens);
        c.subscribe(move |u| {
            if let FeedUpdate::Snapshot { snapshot, history } = u {
                sink.lock()
                    .unwrap()
                    .push((snapshot.cpu.average, history.cpu.len()));
            }
        });
        c.ingest(FRAME).unwrap();
        c.ingest(FRAME).unwrap();
        assert_eq!(*lens.lock().unwrap(), vec![(15.0, 1), (15.0, 2)]);
    }
}
