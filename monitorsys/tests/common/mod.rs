//! Scripted transport and manual scheduler for driving the feed deterministically.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::future::BoxFuture;
use monitorsys::feed::{FeedClient, FeedConfig, FeedUpdate};
use monitorsys::scheduler::Scheduler;
use monitorsys::ws::{Connection, Frame, Transport};
use monitorsys::FeedError;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use url::Url;

pub const SNAPSHOT: &str = r#"{"timestamp": 1700000000,
    "cpu": {"cores": [10, 20], "average": 15, "frequency": 2400000},
    "ram": {"total": 16e9, "used": 8e9, "available": 8e9, "percent": 50},
    "network": {"interfaces": {"eth0": {"bytes_sent": 100, "bytes_recv": 200, "speed_up": 1048576, "speed_down": 2097152}}},
    "disk": {"read_bytes": 0, "write_bytes": 0, "read_speed": 1048576, "write_speed": 524288},
    "gpu": null}"#;

pub fn snapshot_with_gpu() -> String {
    SNAPSHOT.replace(
        "\"gpu\": null",
        r#""gpu": {"name": "RTX", "utilization": 40, "memory_total": 8192,
            "memory_used": 2048, "memory_percent": 25, "temperature": 60}"#,
    )
}

/// Test-side control over one scripted connection.
pub struct ConnControl {
    tx: Option<mpsc::UnboundedSender<Result<Frame, FeedError>>>,
    closed: Arc<AtomicBool>,
}

impl ConnControl {
    pub fn send_text(&self, text: &str) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Ok(Frame::Text(text.to_string())));
        }
    }

    pub fn send_binary(&self, bytes: &[u8]) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Ok(Frame::Binary(bytes.to_vec())));
        }
    }

    pub fn fail(&self) {
        if let Some(tx) = &self.tx {
            let _ = tx.send(Err(FeedError::Io(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "reset by peer",
            ))));
        }
    }

    /// Peer-initiated close.
    pub fn hang_up(&mut self) {
        self.tx.take();
    }

    /// True once the client closed this connection.
    pub fn closed_by_client(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

struct ScriptedConnection {
    rx: mpsc::UnboundedReceiver<Result<Frame, FeedError>>,
    closed: Arc<AtomicBool>,
}

impl Connection for ScriptedConnection {
    fn next_frame(&mut self) -> BoxFuture<'_, Option<Result<Frame, FeedError>>> {
        Box::pin(self.rx.recv())
    }

    fn close(&mut self) -> BoxFuture<'_, ()> {
        self.closed.store(true, Ordering::SeqCst);
        self.rx.close();
        Box::pin(async {})
    }
}

/// Hands out queued connections in order; refuses when the queue is empty.
#[derive(Default)]
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<ScriptedConnection>>,
    attempts: Mutex<Vec<Instant>>,
}

impl ScriptedTransport {
    pub fn accept_next(&self) -> ConnControl {
        let (tx, rx) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));
        self.queue.lock().unwrap().push_back(ScriptedConnection {
            rx,
            closed: Arc::clone(&closed),
        });
        ConnControl {
            tx: Some(tx),
            closed,
        }
    }

    pub fn attempts(&self) -> Vec<Instant> {
        self.attempts.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn connect(&self, _url: &Url) -> BoxFuture<'static, Result<Box<dyn Connection>, FeedError>> {
        self.attempts.lock().unwrap().push(Instant::now());
        let next = self.queue.lock().unwrap().pop_front();
        Box::pin(async move {
            match next {
                Some(conn) => Ok(Box::new(conn) as Box<dyn Connection>),
                None => Err(FeedError::Io(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "connection refused",
                ))),
            }
        })
    }
}

/// Timers that only fire when the test says so.
#[derive(Default)]
pub struct ManualScheduler {
    delays: Mutex<Vec<Duration>>,
    pending: Mutex<Vec<oneshot::Sender<()>>>,
}

impl ManualScheduler {
    pub fn delays(&self) -> Vec<Duration> {
        self.delays.lock().unwrap().clone()
    }

    pub fn fire(&self) {
        for tx in self.pending.lock().unwrap().drain(..) {
            let _ = tx.send(());
        }
    }

    /// True when every requested timer was dropped before firing.
    pub fn all_cancelled(&self) -> bool {
        self.pending.lock().unwrap().iter().all(|tx| tx.is_closed())
    }
}

impl Scheduler for ManualScheduler {
    fn sleep(&self, delay: Duration) -> BoxFuture<'static, ()> {
        let (tx, rx) = oneshot::channel();
        self.delays.lock().unwrap().push(delay);
        self.pending.lock().unwrap().push(tx);
        Box::pin(async move {
            let _ = rx.await;
        })
    }
}

/// Owned copy of an observer notification.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Connection(bool),
    Snapshot { cpu: usize, gpu: usize, average: f64 },
}

pub fn client_with(
    transport: Arc<ScriptedTransport>,
    scheduler: Arc<dyn Scheduler>,
) -> (FeedClient, mpsc::UnboundedReceiver<Event>) {
    let config = FeedConfig::from_target("http://127.0.0.1:8000").unwrap();
    let mut client = FeedClient::with_parts(config, transport, scheduler);
    let (tx, rx) = mpsc::unbounded_channel();
    client.subscribe(move |update| {
        let event = match update {
            FeedUpdate::Connection { connected } => Event::Connection(*connected),
            FeedUpdate::Snapshot { snapshot, history } => Event::Snapshot {
                cpu: history.cpu.len(),
                gpu: history.gpu.len(),
                average: snapshot.cpu.average,
            },
        };
        let _ = tx.send(event);
    });
    (client, rx)
}

pub async fn next_event(rx: &mut mpsc::UnboundedReceiver<Event>) -> Event {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for feed event")
        .expect("feed dropped its observer")
}

/// Yield to the feed task until `cond` holds.
pub async fn settle(mut cond: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if cond() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never held");
}
