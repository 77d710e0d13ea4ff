use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::dataset::HOST_MARKER;
use crate::errors::FleetError;

/// Opaque identifier of one accelerator, as it appears in the dataset (`GPU_0`, ...).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        DeviceId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(value: &str) -> Self {
        DeviceId::new(value)
    }
}

/// The configured, fixed-size set of devices. Order is the emission order.
#[derive(Debug, Clone, PartialEq)]
pub struct Fleet {
    devices: Vec<DeviceId>,
}

impl Fleet {
    pub fn new(devices: Vec<DeviceId>) -> Result<Self, FleetError> {
        if devices.is_empty() {
            return Err(FleetError::Empty);
        }
        for (i, id) in devices.iter().enumerate() {
            if id.as_str().eq_ignore_ascii_case(HOST_MARKER) {
                return Err(FleetError::Reserved(id.to_string()));
            }
            if devices[..i].contains(id) {
                return Err(FleetError::Duplicate(id.clone()));
            }
        }
        Ok(Fleet { devices })
    }

    /// `GPU_0 .. GPU_{n-1}`, the naming used by the recorded datasets.
    pub fn numbered(size: usize) -> Result<Self, FleetError> {
        Fleet::new((0..size).map(|i| DeviceId::new(format!("GPU_{i}"))).collect())
    }

    /// Parses a comma separated list such as `GPU_0,GPU_1`.
    pub fn parse_list(list: &str) -> Result<Self, FleetError> {
        Fleet::new(
            list.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(DeviceId::from)
                .collect(),
        )
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn contains(&self, id: &DeviceId) -> bool {
        self.devices.contains(id)
    }

    pub fn position(&self, id: &DeviceId) -> Option<usize> {
        self.devices.iter().position(|d| d == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &DeviceId> {
        self.devices.iter()
    }
}

impl fmt::Display for Fleet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let ids: Vec<&str> = self.devices.iter().map(DeviceId::as_str).collect();
        write!(f, "[{}]", ids.join(", "))
    }
}

/// Point in recorded time. Ordered, so a `BTreeMap` keyed by it yields
/// strictly increasing, deduplicated timestamps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(NaiveDateTime);

impl Timestamp {
    const FORMATS: [&'static str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];

    pub fn new(inner: NaiveDateTime) -> Self {
        Timestamp(inner)
    }

    /// Accepts RFC 3339 (normalised to UTC) and the common naive layouts.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
            return Some(Timestamp(dt.naive_utc()));
        }
        Self::FORMATS
            .iter()
            .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
            .map(Timestamp)
    }

    pub fn as_naive(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d %H:%M:%S%.f"))
    }
}

/// Per-device telemetry fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMetric {
    Utilization,
    MemoryUtilization,
    PowerDraw,
    Temperature,
    FanSpeed,
    ClockSpeed,
}

impl DeviceMetric {
    pub const ALL: [DeviceMetric; 6] = [
        DeviceMetric::Utilization,
        DeviceMetric::MemoryUtilization,
        DeviceMetric::PowerDraw,
        DeviceMetric::Temperature,
        DeviceMetric::FanSpeed,
        DeviceMetric::ClockSpeed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceMetric::Utilization => "utilization",
            DeviceMetric::MemoryUtilization => "memory_utilization",
            DeviceMetric::PowerDraw => "power_draw",
            DeviceMetric::Temperature => "temperature",
            DeviceMetric::FanSpeed => "fan_speed",
            DeviceMetric::ClockSpeed => "clock_speed",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            DeviceMetric::Utilization | DeviceMetric::MemoryUtilization => "%",
            DeviceMetric::PowerDraw => "W",
            DeviceMetric::Temperature => "°C",
            DeviceMetric::FanSpeed => "%",
            DeviceMetric::ClockSpeed => "MHz",
        }
    }
}

impl fmt::Display for DeviceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Host-level telemetry fields, one set per snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HostMetric {
    CpuUtilization,
    MemoryUsage,
    PowerDraw,
    Temperature,
    DiskUsage,
    NetworkBandwidth,
}

impl HostMetric {
    pub const ALL: [HostMetric; 6] = [
        HostMetric::CpuUtilization,
        HostMetric::MemoryUsage,
        HostMetric::PowerDraw,
        HostMetric::Temperature,
        HostMetric::DiskUsage,
        HostMetric::NetworkBandwidth,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            HostMetric::CpuUtilization => "cpu_utilization",
            HostMetric::MemoryUsage => "memory_usage",
            HostMetric::PowerDraw => "power_draw",
            HostMetric::Temperature => "temperature",
            HostMetric::DiskUsage => "disk_usage",
            HostMetric::NetworkBandwidth => "network_bandwidth",
        }
    }

    pub fn unit(&self) -> &'static str {
        match self {
            HostMetric::CpuUtilization | HostMetric::MemoryUsage | HostMetric::DiskUsage => "%",
            HostMetric::PowerDraw => "W",
            HostMetric::Temperature => "°C",
            HostMetric::NetworkBandwidth => "Mbps",
        }
    }
}

impl fmt::Display for HostMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: DeviceId,
    pub utilization: f64,
    pub memory_utilization: f64,
    pub power_draw: f64,
    pub temperature: f64,
    pub fan_speed: f64,
    pub clock_speed: f64,
}

impl DeviceRecord {
    pub fn get(&self, metric: DeviceMetric) -> f64 {
        match metric {
            DeviceMetric::Utilization => self.utilization,
            DeviceMetric::MemoryUtilization => self.memory_utilization,
            DeviceMetric::PowerDraw => self.power_draw,
            DeviceMetric::Temperature => self.temperature,
            DeviceMetric::FanSpeed => self.fan_speed,
            DeviceMetric::ClockSpeed => self.clock_speed,
        }
    }

    pub fn set(&mut self, metric: DeviceMetric, value: f64) {
        let slot = match metric {
            DeviceMetric::Utilization => &mut self.utilization,
            DeviceMetric::MemoryUtilization => &mut self.memory_utilization,
            DeviceMetric::PowerDraw => &mut self.power_draw,
            DeviceMetric::Temperature => &mut self.temperature,
            DeviceMetric::FanSpeed => &mut self.fan_speed,
            DeviceMetric::ClockSpeed => &mut self.clock_speed,
        };
        *slot = value;
    }

    pub fn metrics(&self) -> impl Iterator<Item = (DeviceMetric, f64)> + '_ {
        DeviceMetric::ALL.into_iter().map(move |m| (m, self.get(m)))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostRecord {
    pub cpu_utilization: f64,
    pub memory_usage: f64,
    pub power_draw: f64,
    pub temperature: f64,
    pub disk_usage: f64,
    pub network_bandwidth: f64,
}

impl HostRecord {
    pub fn get(&self, metric: HostMetric) -> f64 {
        match metric {
            HostMetric::CpuUtilization => self.cpu_utilization,
            HostMetric::MemoryUsage => self.memory_usage,
            HostMetric::PowerDraw => self.power_draw,
            HostMetric::Temperature => self.temperature,
            HostMetric::DiskUsage => self.disk_usage,
            HostMetric::NetworkBandwidth => self.network_bandwidth,
        }
    }

    pub fn metrics(&self) -> impl Iterator<Item = (HostMetric, f64)> + '_ {
        HostMetric::ALL.into_iter().map(move |m| (m, self.get(m)))
    }
}

/// All telemetry for one timestamp: one record per fleet device, in fleet
/// order, plus the host record.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: Timestamp,
    pub devices: Vec<DeviceRecord>,
    pub host: HostRecord,
}

impl Snapshot {
    pub fn device(&self, id: &DeviceId) -> Option<&DeviceRecord> {
        self.devices.iter().find(|d| &d.device_id == id)
    }

    /// Sum of one metric over every device.
    pub fn total(&self, metric: DeviceMetric) -> f64 {
        self.devices.iter().map(|d| d.get(metric)).sum()
    }

    pub fn values(&self, metric: DeviceMetric) -> Vec<f64> {
        self.devices.iter().map(|d| d.get(metric)).collect()
    }
}
