use anyhow::bail;
use fleetgauge_core::{DeviceId, DeviceMetric, Fleet, HostMetric, Snapshot};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

use crate::metric_sink::SeriesFrame;

/// How exported series are named.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum NamingStyle {
    /// One gauge per device and metric, e.g. `gpu_0_utilization`
    #[default]
    Flat,
    /// One gauge per metric with `device` and `variant` labels
    Labelled,
}

impl fmt::Display for NamingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NamingStyle::Flat => f.write_str("flat"),
            NamingStyle::Labelled => f.write_str("labelled"),
        }
    }
}

impl FromStr for NamingStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "flat" => Ok(NamingStyle::Flat),
            "labelled" | "labeled" => Ok(NamingStyle::Labelled),
            other => Err(format!(
                "unknown series naming {other:?} (expected flat or labelled)"
            )),
        }
    }
}

/// Whether the published values are the recorded ones or the balanced ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SeriesVariant {
    Raw,
    Balanced,
}

impl SeriesVariant {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            SeriesVariant::Raw => "raw",
            SeriesVariant::Balanced => "balanced",
        }
    }
}

/// Fully resolved series identity: metric name plus label pairs.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub(crate) struct SeriesKey {
    pub(crate) name: String,
    pub(crate) labels: Vec<(&'static str, String)>,
}

impl SeriesKey {
    fn plain(name: String) -> Self {
        SeriesKey {
            name,
            labels: Vec::new(),
        }
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        if !self.labels.is_empty() {
            let pairs: Vec<String> = self
                .labels
                .iter()
                .map(|(k, v)| format!("{k}=\"{v}\""))
                .collect();
            write!(f, "{{{}}}", pairs.join(","))?;
        }
        Ok(())
    }
}

/// Mapping from (entity, metric) to series, resolved once for a fleet.
#[derive(Debug, Clone)]
pub(crate) struct SeriesNaming {
    style: NamingStyle,
    variant: SeriesVariant,
    // fleet order, one key per DeviceMetric::ALL entry
    devices: Vec<(DeviceId, [SeriesKey; 6])>,
    host: [SeriesKey; 6],
}

impl SeriesNaming {
    /// Fails when two series resolve to the same key, e.g. device ids that
    /// only differ in punctuation (`GPU-0`, `GPU_0`) under flat naming, or a
    /// device id that shadows a host series (`cpu`, `server`).
    pub(crate) fn new(
        style: NamingStyle,
        variant: SeriesVariant,
        fleet: &Fleet,
    ) -> anyhow::Result<Self> {
        let devices: Vec<(DeviceId, [SeriesKey; 6])> = fleet
            .iter()
            .map(|id| {
                let keys = DeviceMetric::ALL.map(|m| device_key(style, variant, id, m));
                (id.clone(), keys)
            })
            .collect();
        let host = HostMetric::ALL.map(|m| host_key(style, variant, m));

        let mut owners: HashMap<&SeriesKey, String> = HashMap::new();
        let entries = devices
            .iter()
            .flat_map(|(id, keys)| keys.iter().map(move |k| (k, format!("device {id}"))))
            .chain(host.iter().map(|k| (k, "host".to_string())));
        for (key, owner) in entries {
            if let Some(previous) = owners.insert(key, owner.clone()) {
                bail!("{previous} and {owner} both map to series {key} under {style} naming");
            }
        }

        Ok(SeriesNaming {
            style,
            variant,
            devices,
            host,
        })
    }

    pub(crate) fn style(&self) -> NamingStyle {
        self.style
    }

    pub(crate) fn variant(&self) -> SeriesVariant {
        self.variant
    }

    pub(crate) fn device(&self, id: &DeviceId, metric: DeviceMetric) -> Option<&SeriesKey> {
        let (_, keys) = self.devices.iter().find(|(d, _)| d == id)?;
        Some(&keys[device_slot(metric)])
    }

    pub(crate) fn host(&self, metric: HostMetric) -> &SeriesKey {
        &self.host[host_slot(metric)]
    }

    /// Every series of one snapshot, devices in fleet order then the host.
    pub(crate) fn frame(&self, snapshot: &Snapshot) -> SeriesFrame {
        let mut values = Vec::with_capacity(self.devices.len() * 6 + 6);

        for (record, (_, keys)) in snapshot.devices.iter().zip(&self.devices) {
            for ((_, value), key) in record.metrics().zip(keys) {
                values.push((key.clone(), value));
            }
        }
        for ((_, value), key) in snapshot.host.metrics().zip(&self.host) {
            values.push((key.clone(), value));
        }

        SeriesFrame {
            timestamp: snapshot.timestamp,
            values,
        }
    }

    /// Help text per series name. Labelled series share one name per metric.
    pub(crate) fn descriptions(&self) -> BTreeMap<String, String> {
        let suffix = match self.variant {
            SeriesVariant::Raw => "",
            SeriesVariant::Balanced => " after load balancing",
        };
        let mut out = BTreeMap::new();

        for (id, keys) in &self.devices {
            for (metric, key) in DeviceMetric::ALL.iter().zip(keys) {
                let subject = match self.style {
                    NamingStyle::Flat => id.to_string(),
                    NamingStyle::Labelled => "Device".to_string(),
                };
                out.entry(key.name.clone()).or_insert_with(|| {
                    format!(
                        "{subject} {}{suffix} ({})",
                        metric.as_str().replace('_', " "),
                        metric.unit()
                    )
                });
            }
        }
        for (metric, key) in HostMetric::ALL.iter().zip(&self.host) {
            out.entry(key.name.clone()).or_insert_with(|| {
                format!(
                    "Host {}{suffix} ({})",
                    metric.as_str().replace('_', " "),
                    metric.unit()
                )
            });
        }
        out
    }
}

// Slots follow DeviceMetric::ALL and HostMetric::ALL.

fn device_slot(metric: DeviceMetric) -> usize {
    match metric {
        DeviceMetric::Utilization => 0,
        DeviceMetric::MemoryUtilization => 1,
        DeviceMetric::PowerDraw => 2,
        DeviceMetric::Temperature => 3,
        DeviceMetric::FanSpeed => 4,
        DeviceMetric::ClockSpeed => 5,
    }
}

fn host_slot(metric: HostMetric) -> usize {
    match metric {
        HostMetric::CpuUtilization => 0,
        HostMetric::MemoryUsage => 1,
        HostMetric::PowerDraw => 2,
        HostMetric::Temperature => 3,
        HostMetric::DiskUsage => 4,
        HostMetric::NetworkBandwidth => 5,
    }
}

fn device_key(
    style: NamingStyle,
    variant: SeriesVariant,
    id: &DeviceId,
    metric: DeviceMetric,
) -> SeriesKey {
    match style {
        NamingStyle::Flat => {
            let suffix = match (variant, metric) {
                (SeriesVariant::Raw, m) => m.as_str(),
                (SeriesVariant::Balanced, DeviceMetric::Utilization) => "utilization_optimized",
                (SeriesVariant::Balanced, DeviceMetric::MemoryUtilization) => {
                    "memory_util_optimized"
                }
                (SeriesVariant::Balanced, DeviceMetric::PowerDraw) => "power_optimized",
                (SeriesVariant::Balanced, DeviceMetric::Temperature) => "temp_optimized",
                (SeriesVariant::Balanced, DeviceMetric::FanSpeed) => "fan_optimized",
                (SeriesVariant::Balanced, DeviceMetric::ClockSpeed) => "clock_optimized",
            };
            SeriesKey::plain(format!("{}_{suffix}", metric_ident(id.as_str())))
        }
        NamingStyle::Labelled => SeriesKey {
            name: format!("fleetgauge_device_{}", metric.as_str()),
            labels: vec![
                ("device", id.to_string()),
                ("variant", variant.as_str().to_string()),
            ],
        },
    }
}

fn host_key(style: NamingStyle, variant: SeriesVariant, metric: HostMetric) -> SeriesKey {
    match style {
        NamingStyle::Flat => {
            let name = match (variant, metric) {
                (SeriesVariant::Raw, HostMetric::CpuUtilization) => "cpu_utilization",
                (SeriesVariant::Raw, HostMetric::MemoryUsage) => "server_memory_usage",
                (SeriesVariant::Raw, HostMetric::PowerDraw) => "server_power_draw",
                (SeriesVariant::Raw, HostMetric::Temperature) => "server_temperature",
                (SeriesVariant::Raw, HostMetric::DiskUsage) => "server_disk_usage",
                (SeriesVariant::Raw, HostMetric::NetworkBandwidth) => "server_network_bandwidth",
                (SeriesVariant::Balanced, HostMetric::CpuUtilization) => "server_cpu_optimized",
                (SeriesVariant::Balanced, HostMetric::MemoryUsage) => "server_mem_optimized",
                (SeriesVariant::Balanced, HostMetric::PowerDraw) => "server_power_optimized",
                (SeriesVariant::Balanced, HostMetric::Temperature) => "server_temp_optimized",
                (SeriesVariant::Balanced, HostMetric::DiskUsage) => "server_disk_optimized",
                (SeriesVariant::Balanced, HostMetric::NetworkBandwidth) => "server_net_optimized",
            };
            SeriesKey::plain(name.to_string())
        }
        NamingStyle::Labelled => SeriesKey {
            name: format!("fleetgauge_host_{}", metric.as_str()),
            labels: vec![("variant", variant.as_str().to_string())],
        },
    }
}

/// Lowercases a device id and maps anything outside `[a-z0-9_]` to `_` so
/// it can prefix a Prometheus metric name.
fn metric_ident(raw: &str) -> String {
    let ident: String = raw
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();
    if ident.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{ident}")
    } else {
        ident
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fleetgauge_core::{DeviceRecord, HostRecord, Timestamp};

    fn names(keys: &[SeriesKey]) -> Vec<&str> {
        keys.iter().map(|k| k.name.as_str()).collect()
    }

    fn fleet() -> Fleet {
        Fleet::numbered(2).unwrap()
    }

    #[test]
    fn test_flat_raw_names() {
        let naming = SeriesNaming::new(NamingStyle::Flat, SeriesVariant::Raw, &fleet()).unwrap();
        let gpu0: Vec<SeriesKey> = DeviceMetric::ALL
            .iter()
            .filter_map(|m| naming.device(&DeviceId::from("GPU_0"), *m).cloned())
            .collect();
        let host: Vec<SeriesKey> = HostMetric::ALL.iter().map(|m| naming.host(*m).clone()).collect();

        assert_eq!(
            names(&gpu0),
            vec![
                "gpu_0_utilization",
                "gpu_0_memory_utilization",
                "gpu_0_power_draw",
                "gpu_0_temperature",
                "gpu_0_fan_speed",
                "gpu_0_clock_speed",
            ]
        );
        assert_eq!(
            names(&host),
            vec![
                "cpu_utilization",
                "server_memory_usage",
                "server_power_draw",
                "server_temperature",
                "server_disk_usage",
                "server_network_bandwidth",
            ]
        );
        assert!(gpu0.iter().all(|k| k.labels.is_empty()));
    }

    #[test]
    fn test_flat_balanced_names() {
        let naming =
            SeriesNaming::new(NamingStyle::Flat, SeriesVariant::Balanced, &fleet()).unwrap();
        let gpu1: Vec<SeriesKey> = DeviceMetric::ALL
            .iter()
            .filter_map(|m| naming.device(&DeviceId::from("GPU_1"), *m).cloned())
            .collect();

        assert_eq!(
            names(&gpu1),
            vec![
                "gpu_1_utilization_optimized",
                "gpu_1_memory_util_optimized",
                "gpu_1_power_optimized",
                "gpu_1_temp_optimized",
                "gpu_1_fan_optimized",
                "gpu_1_clock_optimized",
            ]
        );
        assert_eq!(naming.host(HostMetric::CpuUtilization).name, "server_cpu_optimized");
        assert_eq!(naming.host(HostMetric::NetworkBandwidth).name, "server_net_optimized");
    }

    #[test]
    fn test_labelled_keys() {
        let naming =
            SeriesNaming::new(NamingStyle::Labelled, SeriesVariant::Balanced, &fleet()).unwrap();
        let key = naming
            .device(&DeviceId::from("GPU_1"), DeviceMetric::Temperature)
            .unwrap();

        assert_eq!(key.name, "fleetgauge_device_temperature");
        assert_eq!(
            key.to_string(),
            r#"fleetgauge_device_temperature{device="GPU_1",variant="balanced"}"#
        );
        assert_eq!(
            naming.host(HostMetric::DiskUsage).to_string(),
            r#"fleetgauge_host_disk_usage{variant="balanced"}"#
        );
        assert!(naming
            .device(&DeviceId::from("GPU_9"), DeviceMetric::Temperature)
            .is_none());
    }

    #[test]
    fn test_device_ids_are_sanitized() {
        let fleet = Fleet::new(vec![DeviceId::from("Node-A.gpu0"), DeviceId::from("3")]).unwrap();
        let naming = SeriesNaming::new(NamingStyle::Flat, SeriesVariant::Raw, &fleet).unwrap();

        assert_eq!(
            naming
                .device(&DeviceId::from("Node-A.gpu0"), DeviceMetric::FanSpeed)
                .unwrap()
                .name,
            "node_a_gpu0_fan_speed"
        );
        assert_eq!(
            naming
                .device(&DeviceId::from("3"), DeviceMetric::Utilization)
                .unwrap()
                .name,
            "_3_utilization"
        );
    }

    #[test]
    fn test_frame_covers_every_series_in_order() {
        let naming = SeriesNaming::new(NamingStyle::Flat, SeriesVariant::Raw, &fleet()).unwrap();
        let device = |id: &str, utilization: f64| DeviceRecord {
            device_id: DeviceId::from(id),
            utilization,
            memory_utilization: 1.0,
            power_draw: 2.0,
            temperature: 3.0,
            fan_speed: 4.0,
            clock_speed: 5.0,
        };
        let snapshot = Snapshot {
            timestamp: Timestamp::parse("2024-01-01 00:00:00").unwrap(),
            devices: vec![device("GPU_0", 10.0), device("GPU_1", 20.0)],
            host: HostRecord {
                cpu_utilization: 30.0,
                memory_usage: 31.0,
                power_draw: 32.0,
                temperature: 33.0,
                disk_usage: 34.0,
                network_bandwidth: 35.0,
            },
        };

        let frame = naming.frame(&snapshot);

        assert_eq!(frame.timestamp, snapshot.timestamp);
        assert_eq!(frame.values.len(), 18);
        assert_eq!(frame.values[0].0.name, "gpu_0_utilization");
        assert_eq!(frame.values[0].1, 10.0);
        assert_eq!(frame.values[6].0.name, "gpu_1_utilization");
        assert_eq!(frame.values[6].1, 20.0);
        assert_eq!(frame.values[12].0.name, "cpu_utilization");
        assert_eq!(frame.values[17].1, 35.0);
    }

    #[test]
    fn test_descriptions() {
        let labelled =
            SeriesNaming::new(NamingStyle::Labelled, SeriesVariant::Raw, &fleet()).unwrap();
        let flat = SeriesNaming::new(NamingStyle::Flat, SeriesVariant::Balanced, &fleet()).unwrap();

        assert_eq!(labelled.descriptions().len(), 12);
        assert_eq!(flat.descriptions().len(), 18);
        assert_eq!(
            flat.descriptions()["gpu_0_temp_optimized"],
            "GPU_0 temperature after load balancing (°C)"
        );
    }

    #[test]
    fn test_slots_follow_metric_order() {
        for (i, metric) in DeviceMetric::ALL.iter().enumerate() {
            assert_eq!(device_slot(*metric), i);
        }
        for (i, metric) in HostMetric::ALL.iter().enumerate() {
            assert_eq!(host_slot(*metric), i);
        }
    }

    /// **Test:** Flat name collisions
    ///
    /// **Expectation:** Device ids that sanitize to the same prefix, or that
    /// shadow a host series, are rejected. Labelled naming keeps the raw id
    /// in a label, so the same fleet is accepted there.
    #[test]
    fn test_colliding_flat_names_are_rejected() {
        let punctuated =
            Fleet::new(vec![DeviceId::from("GPU-0"), DeviceId::from("GPU_0")]).unwrap();
        let err = SeriesNaming::new(NamingStyle::Flat, SeriesVariant::Raw, &punctuated)
            .unwrap_err()
            .to_string();
        assert!(err.contains("GPU-0") && err.contains("GPU_0"), "{err}");
        assert!(SeriesNaming::new(NamingStyle::Labelled, SeriesVariant::Raw, &punctuated).is_ok());

        let cpu = Fleet::new(vec![DeviceId::from("cpu")]).unwrap();
        let err = SeriesNaming::new(NamingStyle::Flat, SeriesVariant::Raw, &cpu)
            .unwrap_err()
            .to_string();
        assert!(err.contains("cpu_utilization"), "{err}");

        // server_power_draw raw, server_power_optimized balanced
        let server = Fleet::new(vec![DeviceId::from("server")]).unwrap();
        for variant in [SeriesVariant::Raw, SeriesVariant::Balanced] {
            assert!(SeriesNaming::new(NamingStyle::Flat, variant, &server).is_err());
        }
        assert!(SeriesNaming::new(NamingStyle::Labelled, SeriesVariant::Raw, &server).is_ok());
    }

    #[test]
    fn test_naming_style_parsing() {
        assert_eq!("Labeled".parse::<NamingStyle>().unwrap(), NamingStyle::Labelled);
        assert_eq!("flat".parse::<NamingStyle>().unwrap(), NamingStyle::Flat);
        assert!("nested".parse::<NamingStyle>().is_err());
    }
}
