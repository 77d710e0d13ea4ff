use std::collections::BTreeMap;
use std::path::Path;
use tracing::{debug, info};

use crate::dataset::{load_dataset, TelemetryRow};
use crate::errors::{MalformedDatasetError, Result};
use crate::model::{DeviceRecord, Fleet, HostRecord, Snapshot, Timestamp};

/// Immutable, time-indexed view over a recorded dataset.
///
/// Every timestamp group is validated when the store is built, so a replay
/// over the store can never hit a missing device or host record.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    fleet: Fleet,
    timestamps: Vec<Timestamp>,
    snapshots: Vec<Snapshot>,
}

/// Rows of one timestamp while the store is being assembled.
struct PendingGroup {
    devices: Vec<Option<DeviceRecord>>,
    host_rows: Vec<HostRecord>,
    // host columns repeated on device rows; first one in file order wins
    embedded_host: Option<HostRecord>,
}

impl PendingGroup {
    fn new(fleet_size: usize) -> Self {
        PendingGroup {
            devices: vec![None; fleet_size],
            host_rows: Vec::new(),
            embedded_host: None,
        }
    }
}

impl SnapshotStore {
    /// Read the CSV at `path` and build the store for `fleet`.
    pub fn from_path(path: &Path, fleet: Fleet) -> Result<Self> {
        let rows = load_dataset(path)?;
        info!(
            path = %path.display(),
            rows = rows.len(),
            "loaded recorded dataset"
        );
        Self::build(rows, fleet)
    }

    /// Group rows by timestamp and validate every group.
    ///
    /// Each group must hold exactly one record per fleet device and exactly
    /// one host record, either as a dedicated `host` row or as host columns
    /// carried on the device rows. Rows for devices outside the fleet are
    /// ignored.
    pub fn build(rows: Vec<TelemetryRow>, fleet: Fleet) -> Result<Self> {
        let mut groups: BTreeMap<Timestamp, PendingGroup> = BTreeMap::new();
        let mut ignored = 0usize;

        for row in &rows {
            let timestamp = row.parse_timestamp()?;

            if row.is_host_row() {
                let host = row.host_record()?;
                groups
                    .entry(timestamp)
                    .or_insert_with(|| PendingGroup::new(fleet.len()))
                    .host_rows
                    .push(host);
                continue;
            }

            let device_id = row.device_id();
            let Some(position) = fleet.position(&device_id) else {
                ignored += 1;
                continue;
            };

            let record = row.device_record()?;
            let group = groups
                .entry(timestamp)
                .or_insert_with(|| PendingGroup::new(fleet.len()));

            if group.devices[position].is_some() {
                return Err(MalformedDatasetError::DuplicateDevice {
                    timestamp,
                    device: device_id,
                });
            }
            group.devices[position] = Some(record);

            if group.embedded_host.is_none() && row.has_host_fields() {
                group.embedded_host = Some(row.host_record()?);
            }
        }

        if ignored > 0 {
            debug!(
                ignored_rows = ignored,
                fleet = %fleet,
                "ignored dataset rows for devices outside the configured fleet"
            );
        }

        if groups.is_empty() {
            return Err(MalformedDatasetError::Empty);
        }

        let mut timestamps = Vec::with_capacity(groups.len());
        let mut snapshots = Vec::with_capacity(groups.len());

        for (timestamp, group) in groups {
            let mut devices = Vec::with_capacity(fleet.len());
            for (slot, device_id) in group.devices.into_iter().zip(fleet.iter()) {
                match slot {
                    Some(record) => devices.push(record),
                    None => {
                        return Err(MalformedDatasetError::MissingDevice {
                            timestamp,
                            device: device_id.clone(),
                        })
                    }
                }
            }

            let mut host_rows = group.host_rows;
            let host = match host_rows.len() {
                0 => group
                    .embedded_host
                    .ok_or(MalformedDatasetError::MissingHost { timestamp })?,
                1 => host_rows.remove(0),
                _ => return Err(MalformedDatasetError::DuplicateHost { timestamp }),
            };

            timestamps.push(timestamp);
            snapshots.push(Snapshot {
                timestamp,
                devices,
                host,
            });
        }

        debug!(
            timestamps = timestamps.len(),
            fleet = %fleet,
            "snapshot store built"
        );

        Ok(SnapshotStore {
            fleet,
            timestamps,
            snapshots,
        })
    }

    /// Strictly increasing, deduplicated timestamps.
    pub fn ordered_timestamps(&self) -> &[Timestamp] {
        &self.timestamps
    }

    pub fn at(&self, timestamp: &Timestamp) -> Option<&Snapshot> {
        self.timestamps
            .binary_search(timestamp)
            .ok()
            .map(|i| &self.snapshots[i])
    }

    /// Snapshot by position in `ordered_timestamps`.
    pub fn snapshot(&self, index: usize) -> Option<&Snapshot> {
        self.snapshots.get(index)
    }

    /// Snapshot at `index` wrapped around the store length, the replay order.
    pub fn cyclic(&self, index: usize) -> &Snapshot {
        &self.snapshots[index % self.snapshots.len()]
    }

    pub fn fleet(&self) -> &Fleet {
        &self.fleet
    }

    pub fn len(&self) -> usize {
        self.snapshots.len()
    }

    /// A built store is never empty.
    pub fn is_empty(&self) -> bool {
        self.snapshots.is_empty()
    }
}
