//! # Fleetgauge Core
//!
//! Shared types for replaying recorded accelerator telemetry.
//!
//! ## Core Responsibilities
//!
//! - **Data Model**: per-device and per-host records grouped into timestamped snapshots
//! - **Dataset Ingestion**: parsing the recorded CSV dataset into raw rows
//! - **Snapshot Store**: grouping, validating and ordering rows into an immutable,
//!   time-indexed store that the replay loop can never fail to read from

pub mod dataset;
pub mod errors;
pub mod model;
pub mod snapshot_store;

pub use dataset::{load_dataset, parse_dataset, TelemetryRow, HOST_MARKER};
pub use errors::{FleetError, MalformedDatasetError};
pub use model::{
    DeviceId, DeviceMetric, DeviceRecord, Fleet, HostMetric, HostRecord, Snapshot, Timestamp,
};
pub use snapshot_store::SnapshotStore;
