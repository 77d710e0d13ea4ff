use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::errors::{MalformedDatasetError, Result};
use crate::model::{DeviceId, DeviceRecord, HostRecord, Timestamp};

/// Device id used by rows that carry only host telemetry.
pub const HOST_MARKER: &str = "host";

/// One CSV row as recorded. Column names follow the recorded datasets.
///
/// Device rows may also carry the host columns (every device row of a
/// timestamp repeats them); host rows leave the device columns empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRow {
    /// Line in the source file (1-based, header included). Filled by the parser.
    #[serde(skip)]
    pub line: u64,
    pub timestamp: String,
    pub gpu_id: String,

    #[serde(default)]
    pub gpu_utilization: Option<f64>,
    #[serde(default)]
    pub memory_utilization: Option<f64>,
    #[serde(default)]
    pub gpu_power_draw: Option<f64>,
    #[serde(default)]
    pub gpu_temperature: Option<f64>,
    #[serde(default)]
    pub gpu_fan_speed: Option<f64>,
    #[serde(default)]
    pub gpu_clock_speed: Option<f64>,

    #[serde(default)]
    pub cpu_utilization: Option<f64>,
    #[serde(default)]
    pub memory_usage: Option<f64>,
    #[serde(default)]
    pub server_power_draw: Option<f64>,
    #[serde(default)]
    pub server_temperature: Option<f64>,
    #[serde(default)]
    pub disk_usage: Option<f64>,
    #[serde(default)]
    pub network_bandwidth: Option<f64>,
}

impl TelemetryRow {
    pub fn is_host_row(&self) -> bool {
        self.gpu_id.trim().eq_ignore_ascii_case(HOST_MARKER)
    }

    pub fn device_id(&self) -> DeviceId {
        DeviceId::new(self.gpu_id.trim())
    }

    pub fn parse_timestamp(&self) -> Result<Timestamp> {
        Timestamp::parse(&self.timestamp).ok_or_else(|| MalformedDatasetError::InvalidTimestamp {
            line: self.line,
            value: self.timestamp.clone(),
        })
    }

    pub fn device_record(&self) -> Result<DeviceRecord> {
        Ok(DeviceRecord {
            device_id: self.device_id(),
            utilization: self.require(self.gpu_utilization, "gpu_utilization")?,
            memory_utilization: self.require(self.memory_utilization, "memory_utilization")?,
            power_draw: self.require(self.gpu_power_draw, "gpu_power_draw")?,
            temperature: self.require(self.gpu_temperature, "gpu_temperature")?,
            fan_speed: self.require(self.gpu_fan_speed, "gpu_fan_speed")?,
            clock_speed: self.require(self.gpu_clock_speed, "gpu_clock_speed")?,
        })
    }

    /// True when every host column is filled in.
    pub fn has_host_fields(&self) -> bool {
        [
            self.cpu_utilization,
            self.memory_usage,
            self.server_power_draw,
            self.server_temperature,
            self.disk_usage,
            self.network_bandwidth,
        ]
        .iter()
        .all(Option::is_some)
    }

    pub fn host_record(&self) -> Result<HostRecord> {
        Ok(HostRecord {
            cpu_utilization: self.require(self.cpu_utilization, "cpu_utilization")?,
            memory_usage: self.require(self.memory_usage, "memory_usage")?,
            power_draw: self.require(self.server_power_draw, "server_power_draw")?,
            temperature: self.require(self.server_temperature, "server_temperature")?,
            disk_usage: self.require(self.disk_usage, "disk_usage")?,
            network_bandwidth: self.require(self.network_bandwidth, "network_bandwidth")?,
        })
    }

    fn require(&self, value: Option<f64>, field: &'static str) -> Result<f64> {
        value.ok_or(MalformedDatasetError::MissingField {
            line: self.line,
            field,
        })
    }
}

/// Load a recorded dataset from a CSV file.
pub fn load_dataset(path: &Path) -> Result<Vec<TelemetryRow>> {
    let file = File::open(path)?;
    parse_dataset(file)
}

/// Parse CSV (with header row) from any reader, preserving file order.
pub fn parse_dataset<R: Read>(reader: R) -> Result<Vec<TelemetryRow>> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = csv_reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let mut row: TelemetryRow = record.deserialize(Some(&headers))?;
        row.line = record.position().map(|p| p.line()).unwrap_or_default();
        rows.push(row);
    }
    Ok(rows)
}
