//! Rolling history buffers for charts: one capped FIFO per metric domain.

use std::collections::VecDeque;

use chrono::{DateTime, Local, TimeZone};
use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;

use crate::types::Snapshot;

pub const MAX_HISTORY_POINTS: usize = 60;

const BYTES_PER_GIB: f64 = 1024.0 * 1024.0 * 1024.0;
const BYTES_PER_MIB: f64 = 1024.0 * 1024.0;

pub fn push_capped<T>(dq: &mut VecDeque<T>, v: T, cap: usize) {
    if cap == 0 {
        return;
    }
    while dq.len() >= cap {
        dq.pop_front();
    }
    dq.push_back(v);
}

/// Clock label shared by every point derived from one snapshot (local time, second resolution).
pub fn time_label(timestamp: f64) -> String {
    time_label_in(timestamp, &Local)
}

pub fn time_label_in<Tz>(timestamp: f64, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    if !timestamp.is_finite() {
        return timestamp.to_string();
    }
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9) as u32;
    match DateTime::from_timestamp(secs as i64, nanos.min(999_999_999)) {
        Some(utc) => utc.with_timezone(tz).format("%H:%M:%S").to_string(),
        None => timestamp.to_string(),
    }
}

/// A time-labelled record with named numeric series.
pub trait HistoryPoint {
    fn time(&self) -> &str;
    fn series(&self) -> Vec<(String, f64)>;

    fn value(&self, name: &str) -> Option<f64> {
        self.series()
            .into_iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v)
    }
}

// Points serialize flat: {"time": .., "<series>": ..}
fn serialize_flat<P, S>(point: &P, serializer: S) -> Result<S::Ok, S::Error>
where
    P: HistoryPoint,
    S: Serializer,
{
    let series = point.series();
    let mut map = serializer.serialize_map(Some(series.len() + 1))?;
    map.serialize_entry("time", point.time())?;
    for (k, v) in &series {
        map.serialize_entry(k, v)?;
    }
    map.end()
}

macro_rules! flat_serialize {
    ($($ty:ty),*) => {
        $(impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                serialize_flat(self, serializer)
            }
        })*
    };
}

#[derive(Debug, Clone, PartialEq)]
pub struct CpuPoint {
    pub time: String,
    pub cores: Vec<f64>,
    pub average: f64,
}

impl CpuPoint {
    pub fn derive(s: &Snapshot, time: &str) -> Self {
        Self {
            time: time.to_string(),
            cores: s.cpu.cores.clone(),
            average: s.cpu.average,
        }
    }
}

impl HistoryPoint for CpuPoint {
    fn time(&self) -> &str {
        &self.time
    }
    fn series(&self) -> Vec<(String, f64)> {
        let mut out: Vec<(String, f64)> = self
            .cores
            .iter()
            .enumerate()
            .map(|(i, v)| (format!("core{i}"), *v))
            .collect();
        out.push(("average".into(), self.average));
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RamPoint {
    pub time: String,
    // GiB
    pub used: f64,
    pub available: f64,
    pub percent: f64,
}

impl RamPoint {
    pub fn derive(s: &Snapshot, time: &str) -> Self {
        Self {
            time: time.to_string(),
            used: s.ram.used / BYTES_PER_GIB,
            available: s.ram.available / BYTES_PER_GIB,
            percent: s.ram.percent,
        }
    }
}

impl HistoryPoint for RamPoint {
    fn time(&self) -> &str {
        &self.time
    }
    fn series(&self) -> Vec<(String, f64)> {
        vec![
            ("used".into(), self.used),
            ("available".into(), self.available),
            ("percent".into(), self.percent),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct NetworkPoint {
    pub time: String,
    // MiB/s, loopback excluded
    pub upload: f64,
    pub download: f64,
}

impl NetworkPoint {
    pub fn derive(s: &Snapshot, time: &str) -> Self {
        let (up, down) = s.network.aggregate_rates();
        Self {
            time: time.to_string(),
            upload: up / BYTES_PER_MIB,
            download: down / BYTES_PER_MIB,
        }
    }
}

impl HistoryPoint for NetworkPoint {
    fn time(&self) -> &str {
        &self.time
    }
    fn series(&self) -> Vec<(String, f64)> {
        vec![
            ("upload".into(), self.upload),
            ("download".into(), self.download),
        ]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DiskPoint {
    pub time: String,
    // MiB/s
    pub read: f64,
    pub write: f64,
}

impl DiskPoint {
    pub fn derive(s: &Snapshot, time: &str) -> Self {
        Self {
            time: time.to_string(),
            read: s.disk.read_speed / BYTES_PER_MIB,
            write: s.disk.write_speed / BYTES_PER_MIB,
        }
    }
}

impl HistoryPoint for DiskPoint {
    fn time(&self) -> &str {
        &self.time
    }
    fn series(&self) -> Vec<(String, f64)> {
        vec![("read".into(), self.read), ("write".into(), self.write)]
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpuPoint {
    pub time: String,
    pub utilization: f64,
    pub vram: f64,
    pub temperature: f64,
}

impl GpuPoint {
    /// None when the snapshot carries no GPU record.
    pub fn derive(s: &Snapshot, time: &str) -> Option<Self> {
        s.gpu.as_ref().map(|g| Self {
            time: time.to_string(),
            utilization: g.utilization,
            vram: g.memory_percent,
            temperature: g.temperature,
        })
    }
}

impl HistoryPoint for GpuPoint {
    fn time(&self) -> &str {
        &self.time
    }
    fn series(&self) -> Vec<(String, f64)> {
        vec![
            ("utilization".into(), self.utilization),
            ("vram".into(), self.vram),
            ("temperature".into(), self.temperature),
        ]
    }
}

flat_serialize!(CpuPoint, RamPoint, NetworkPoint, DiskPoint, GpuPoint);

/// Fixed-capacity FIFO; the oldest point is evicted once the cap is reached.
#[derive(Debug, Clone)]
pub struct RollingBuffer<T> {
    points: VecDeque<T>,
    cap: usize,
}

impl<T> RollingBuffer<T> {
    pub fn new(cap: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(cap),
            cap,
        }
    }

    pub fn push(&mut self, point: T) {
        push_capped(&mut self.points, point, self.cap);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    pub fn latest(&self) -> Option<&T> {
        self.points.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.points.iter()
    }
}

impl<T: Serialize> Serialize for RollingBuffer<T> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.points.iter())
    }
}

/// The five per-domain buffers. Lives for the whole session; reconnects never reset it.
#[derive(Debug, Clone, Serialize)]
pub struct History {
    pub cpu: RollingBuffer<CpuPoint>,
    pub ram: RollingBuffer<RamPoint>,
    pub network: RollingBuffer<NetworkPoint>,
    pub disk: RollingBuffer<DiskPoint>,
    pub gpu: RollingBuffer<GpuPoint>,
}

impl History {
    pub fn new(cap: usize) -> Self {
        Self {
            cpu: RollingBuffer::new(cap),
            ram: RollingBuffer::new(cap),
            network: RollingBuffer::new(cap),
            disk: RollingBuffer::new(cap),
            gpu: RollingBuffer::new(cap),
        }
    }

    pub fn record(&mut self, s: &Snapshot, time: &str) {
        self.cpu.push(CpuPoint::derive(s, time));
        self.ram.push(RamPoint::derive(s, time));
        self.network.push(NetworkPoint::derive(s, time));
        self.disk.push(DiskPoint::derive(s, time));
        if let Some(p) = GpuPoint::derive(s, time) {
            self.gpu.push(p);
        }
    }
}

impl Default for History {
    fn default() -> Self {
        Self::new(MAX_HISTORY_POINTS)
    }
}
