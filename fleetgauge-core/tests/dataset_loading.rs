//! Integration tests for loading recorded CSV datasets into a SnapshotStore.

use std::io::Write;

use fleetgauge_core::{
    parse_dataset, DeviceId, DeviceMetric, Fleet, MalformedDatasetError, SnapshotStore,
};

const HEADER: &str = "timestamp,gpu_id,gpu_utilization,memory_utilization,gpu_power_draw,\
gpu_temperature,gpu_fan_speed,gpu_clock_speed,cpu_utilization,memory_usage,server_power_draw,\
server_temperature,disk_usage,network_bandwidth";

fn write_dataset(lines: &[&str]) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("create temp dataset");
    writeln!(file, "{HEADER}").unwrap();
    for line in lines {
        writeln!(file, "{line}").unwrap();
    }
    file.flush().unwrap();
    file
}

#[test]
fn test_load_embedded_layout_from_file() {
    let file = write_dataset(&[
        "2024-05-01 10:00:00,GPU_0,80,50,140,65,60,1500,30,40,500,42,61,950",
        "2024-05-01 10:00:00,GPU_1,40,30,100,55,45,1400,30,40,500,42,61,950",
        "2024-05-01 10:00:05,GPU_0,82,51,141,66,61,1510,31,41,505,43,61,940",
        "2024-05-01 10:00:05,GPU_1,42,31,101,56,46,1410,31,41,505,43,61,940",
    ]);

    let store = SnapshotStore::from_path(file.path(), Fleet::numbered(2).unwrap()).unwrap();

    assert_eq!(store.len(), 2);
    let first = store.snapshot(0).unwrap();
    assert_eq!(first.values(DeviceMetric::Utilization), vec![80.0, 40.0]);
    assert_eq!(first.host.network_bandwidth, 950.0);

    let gpu1 = first.device(&DeviceId::from("GPU_1")).unwrap();
    assert_eq!(gpu1.clock_speed, 1400.0);
}

#[test]
fn test_load_separate_host_layout() {
    let file = write_dataset(&[
        "2024-05-01T10:00:00Z,GPU_0,80,50,140,65,60,1500,,,,,,",
        "2024-05-01T10:00:00Z,host,,,,,,,30,40,500,42,61,950",
    ]);

    let store = SnapshotStore::from_path(file.path(), Fleet::numbered(1).unwrap()).unwrap();
    let snapshot = store.snapshot(0).unwrap();

    assert_eq!(snapshot.host.cpu_utilization, 30.0);
    assert_eq!(snapshot.devices[0].power_draw, 140.0);
}

#[test]
fn test_missing_column_reports_line() {
    let file = write_dataset(&[
        "2024-05-01 10:00:00,GPU_0,80,50,140,65,60,1500,30,40,500,42,61,950",
        "2024-05-01 10:00:05,GPU_0,80,,140,65,60,1500,30,40,500,42,61,950",
    ]);

    let err = SnapshotStore::from_path(file.path(), Fleet::numbered(1).unwrap()).unwrap_err();
    match err {
        MalformedDatasetError::MissingField { line, field } => {
            assert_eq!(line, 3);
            assert_eq!(field, "memory_utilization");
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_non_numeric_value_is_csv_error() {
    let data = format!("{HEADER}\n2024-05-01 10:00:00,GPU_0,eighty,50,140,65,60,1500,30,40,500,42,61,950\n");

    let err = parse_dataset(data.as_bytes()).unwrap_err();
    assert!(matches!(err, MalformedDatasetError::Csv(_)));
}

#[test]
fn test_missing_file_is_io_error() {
    let err = SnapshotStore::from_path(
        std::path::Path::new("/nonexistent/fleetgauge/metrics.csv"),
        Fleet::numbered(1).unwrap(),
    )
    .unwrap_err();
    assert!(matches!(err, MalformedDatasetError::Io(_)));
}

#[test]
fn test_incomplete_group_fails_eagerly() {
    let file = write_dataset(&[
        "2024-05-01 10:00:00,GPU_0,80,50,140,65,60,1500,30,40,500,42,61,950",
        "2024-05-01 10:00:00,GPU_1,40,30,100,55,45,1400,30,40,500,42,61,950",
        "2024-05-01 10:00:05,GPU_0,82,51,141,66,61,1510,31,41,505,43,61,940",
    ]);

    let err = SnapshotStore::from_path(file.path(), Fleet::numbered(2).unwrap()).unwrap_err();
    assert!(matches!(err, MalformedDatasetError::MissingDevice { .. }));
}
