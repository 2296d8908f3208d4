//! Types that mirror the telemetry producer's JSON schema.
//! One `Snapshot` per text frame; every number on the wire is decoded as f64.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Interface name excluded from aggregate network rates.
pub const LOOPBACK: &str = "lo";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    // per-core utilization in core index order, 0..=100
    pub cores: Vec<f64>,
    pub average: f64,
    pub frequency: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RamMetrics {
    pub total: f64,
    pub used: f64,
    pub available: f64,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterfaceMetrics {
    // cumulative counters
    pub bytes_sent: f64,
    pub bytes_recv: f64,
    // bytes/sec since the previous sample
    pub speed_up: f64,
    pub speed_down: f64,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NetworkMetrics {
    #[serde(default)]
    pub interfaces: BTreeMap<String, InterfaceMetrics>,
}

impl NetworkMetrics {
    /// Sum of (upload, download) rates in bytes/sec across every interface except loopback.
    pub fn aggregate_rates(&self) -> (f64, f64) {
        self.interfaces
            .iter()
            .filter(|(name, _)| name.as_str() != LOOPBACK)
            .fold((0.0, 0.0), |(up, down), (_, iface)| {
                (up + iface.speed_up, down + iface.speed_down)
            })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskMetrics {
    pub read_bytes: f64,
    pub write_bytes: f64,
    pub read_speed: f64,
    pub write_speed: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GpuMetrics {
    pub name: String,
    pub utilization: f64,
    // MB
    pub memory_total: f64,
    pub memory_used: f64,
    pub memory_percent: f64,
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub timestamp: f64,
    pub cpu: CpuMetrics,
    pub ram: RamMetrics,
    pub network: NetworkMetrics,
    pub disk: DiskMetrics,
    #[serde(default)]
    pub gpu: Option<GpuMetrics>,
}

impl Snapshot {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}
