//! One-line readouts of the latest snapshot, the same figures the dashboard cards show.

use std::fmt;

use crate::types::Snapshot;

const KIB: f64 = 1024.0;
const MIB: f64 = 1024.0 * 1024.0;
const GIB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Bytes/sec as "x.xx MB/s" from 1 MiB/s upward, "x.xx KB/s" below.
pub fn format_rate(bytes_per_sec: f64) -> String {
    if bytes_per_sec >= MIB {
        format!("{:.2} MB/s", bytes_per_sec / MIB)
    } else {
        format!("{:.2} KB/s", bytes_per_sec / KIB)
    }
}

/// Disk throughput already in MiB/s; switches to GB/s at 1000.
pub fn format_disk_rate(mib_per_sec: f64) -> String {
    if mib_per_sec >= 1000.0 {
        format!("{:.2} GB/s", mib_per_sec / 1000.0)
    } else {
        format!("{mib_per_sec:.2} MB/s")
    }
}

/// GPU memory in MB.
pub fn format_vram(mb: f64) -> String {
    if mb >= 1024.0 {
        format!("{:.1} GB", mb / 1024.0)
    } else {
        format!("{mb:.0} MB")
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct GpuSummary {
    pub name: String,
    pub utilization: String,
    pub detail: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Summary {
    pub cpu: String,
    pub cpu_detail: String,
    pub ram: String,
    pub ram_detail: String,
    pub network: String,
    pub disk: String,
    pub gpu: Option<GpuSummary>,
}

impl Summary {
    pub fn from_snapshot(s: &Snapshot) -> Self {
        let (up, down) = s.network.aggregate_rates();
        Self {
            cpu: format!("{:.1}%", s.cpu.average),
            cpu_detail: format!(
                "{} Cores @ {:.2} GHz",
                s.cpu.cores.len(),
                s.cpu.frequency / 1000.0
            ),
            ram: format!("{:.1}%", s.ram.percent),
            ram_detail: format!(
                "{:.1} GB / {:.1} GB",
                s.ram.used / GIB,
                s.ram.total / GIB
            ),
            network: format!("Up: {} | Down: {}", format_rate(up), format_rate(down)),
            disk: format!(
                "Read: {} | Write: {}",
                format_disk_rate(s.disk.read_speed / MIB),
                format_disk_rate(s.disk.write_speed / MIB)
            ),
            gpu: s.gpu.as_ref().map(|g| GpuSummary {
                name: g.name.clone(),
                utilization: format!("{}%", g.utilization),
                detail: format!(
                    "VRAM: {} / {} | {}C",
                    format_vram(g.memory_used),
                    format_vram(g.memory_total),
                    g.temperature
                ),
            }),
        }
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "cpu {} ({}) | ram {} ({}) | net {} | disk {}",
            self.cpu, self.cpu_detail, self.ram, self.ram_detail, self.network, self.disk
        )?;
        if let Some(g) = &self.gpu {
            write!(f, " | gpu {} {} ({})", g.name, g.utilization, g.detail)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(gpu: &str) -> Snapshot {
        let text = format!(
            r#"{{"timestamp": 1700000000,
            "cpu": {{"cores": [10, 20, 30, 40], "average": 25, "frequency": 2400}},
            "ram": {{"total": 17179869184, "used": 4294967296, "available": 12884901888, "percent": 25}},
            "network": {{"interfaces": {{
                "eth0": {{"bytes_sent": 0, "bytes_recv": 0, "speed_up": 2048, "speed_down": 3145728}},
                "lo": {{"bytes_sent": 0, "bytes_recv": 0, "speed_up": 1e9, "speed_down": 1e9}}}}}},
            "disk": {{"read_bytes": 0, "write_bytes": 0, "read_speed": 1048576000, "write_speed": 524288}},
            "gpu": {gpu}}}"#
        );
        Snapshot::from_json(&text).unwrap()
    }

    #[test]
    fn rate_thresholds() {
        assert_eq!(format_rate(512.0), "0.50 KB/s");
        assert_eq!(format_rate(1_048_576.0), "1.00 MB/s");
        assert_eq!(format_disk_rate(999.0), "999.00 MB/s");
        assert_eq!(format_disk_rate(1500.0), "1.50 GB/s");
        assert_eq!(format_vram(512.0), "512 MB");
        assert_eq!(format_vram(8192.0), "8.0 GB");
    }

    #[test]
    fn card_readouts() {
        let s = Summary::from_snapshot(&sample("null"));
        assert_eq!(s.cpu, "25.0%");
        assert_eq!(s.cpu_detail, "4 Cores @ 2.40 GHz");
        assert_eq!(s.ram_detail, "4.0 GB / 16.0 GB");
        assert_eq!(s.network, "Up: 2.00 KB/s | Down: 3.00 MB/s");
        assert_eq!(s.disk, "Read: 1.00 GB/s | Write: 0.50 MB/s");
        assert!(s.gpu.is_none());
        assert!(!s.to_string().contains("gpu"));
    }

    #[test]
    fn gpu_readout() {
        let s = Summary::from_snapshot(&sample(
            r#"{"name": "RTX 4070", "utilization": 37, "memory_total": 12288,
                "memory_used": 900, "memory_percent": 7.3, "temperature": 55}"#,
        ));
        let g = s.gpu.clone().unwrap();
        assert_eq!(g.utilization, "37%");
        assert_eq!(g.detail, "VRAM: 900 MB / 12.0 GB | 55C");
        assert!(s.to_string().ends_with("gpu RTX 4070 37% (VRAM: 900 MB / 12.0 GB | 55C)"));
    }
}
