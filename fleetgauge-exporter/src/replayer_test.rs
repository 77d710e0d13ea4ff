use std::sync::Arc;
use std::time::Duration;

use fleetgauge_core::{parse_dataset, DeviceId, Fleet, SnapshotStore, Timestamp};
use fleetgauge_load_balancer::{BalancePolicy, BalanceProfile, BalancerConfig, LoadBalancer};
use tokio_util::sync::CancellationToken;

use crate::metric_sink::{MemorySink, MetricSink};
use crate::replayer::{ReplayState, Replayer};
use crate::series_naming::{NamingStyle, SeriesKey, SeriesNaming, SeriesVariant};

const HEADER: &str = "timestamp,gpu_id,gpu_utilization,memory_utilization,gpu_power_draw,\
gpu_temperature,gpu_fan_speed,gpu_clock_speed,cpu_utilization,memory_usage,server_power_draw,\
server_temperature,disk_usage,network_bandwidth";

/// Three timestamps, two devices. GPU_0 is overloaded under the standard
/// profile in every snapshot, GPU_1 never is.
fn store() -> Arc<SnapshotStore> {
    let csv = [
        HEADER,
        "2024-05-01 10:00:00,GPU_0,90,80,160,80,95,1500,30,40,500,42,61,950",
        "2024-05-01 10:00:00,GPU_1,40,30,100,55,45,1400,30,40,500,42,61,950",
        "2024-05-01 10:00:05,GPU_0,91,80,160,80,95,1500,31,40,500,42,61,950",
        "2024-05-01 10:00:05,GPU_1,41,30,100,55,45,1400,31,40,500,42,61,950",
        "2024-05-01 10:00:10,GPU_0,92,80,160,80,95,1500,32,40,500,42,61,950",
        "2024-05-01 10:00:10,GPU_1,42,30,100,55,45,1400,32,40,500,42,61,950",
    ]
    .join("\n");
    let rows = parse_dataset(csv.as_bytes()).unwrap();
    Arc::new(SnapshotStore::build(rows, Fleet::numbered(2).unwrap()).unwrap())
}

fn replayer(
    store: Arc<SnapshotStore>,
    balanced: bool,
    interval: Duration,
) -> (Replayer, Arc<MemorySink>) {
    let (balancer, variant) = if balanced {
        let config =
            BalancerConfig::from_profile(BalanceProfile::Standard, BalancePolicy::ClampRedistribute);
        (Some(LoadBalancer::new(config)), SeriesVariant::Balanced)
    } else {
        (None, SeriesVariant::Raw)
    };
    let naming = SeriesNaming::new(NamingStyle::Flat, variant, store.fleet()).unwrap();
    let sink = Arc::new(MemorySink::new());
    let replayer = Replayer::new(
        store,
        balancer,
        naming,
        sink.clone() as Arc<dyn MetricSink>,
        interval,
    );
    (replayer, sink)
}

fn flat(name: &str) -> SeriesKey {
    SeriesKey {
        name: name.to_string(),
        labels: Vec::new(),
    }
}

/// **Test:** Cyclic replay
///
/// **Expectation:** Over 2T ticks every snapshot is published exactly twice,
/// in timestamp order, and the index wraps back to 0.
#[test]
fn test_tick_cycles_through_store() {
    let store = store();
    let expected: Vec<Timestamp> = store.ordered_timestamps().to_vec();
    let (mut replayer, sink) = replayer(store, false, Duration::from_secs(5));

    let mut seen = Vec::new();
    for _ in 0..6 {
        let report = replayer.tick();
        assert_eq!(sink.timestamp(), Some(report.timestamp));
        seen.push((report.index, report.timestamp));
    }

    let indexes: Vec<usize> = seen.iter().map(|(i, _)| *i).collect();
    assert_eq!(indexes, vec![0, 1, 2, 0, 1, 2]);
    for (i, timestamp) in &seen {
        assert_eq!(*timestamp, expected[*i]);
    }
    assert_eq!(replayer.index(), 0);
    assert_eq!(sink.frames_published(), 6);
}

#[test]
fn test_raw_replay_publishes_recorded_values() {
    let (mut replayer, sink) = replayer(store(), false, Duration::from_secs(5));

    let report = replayer.tick();
    assert!(report.balance.is_none());
    assert_eq!(sink.get(&flat("gpu_0_utilization")), Some(90.0));
    assert_eq!(sink.get(&flat("gpu_1_utilization")), Some(40.0));
    assert_eq!(sink.get(&flat("cpu_utilization")), Some(30.0));

    replayer.tick();
    assert_eq!(sink.get(&flat("gpu_0_utilization")), Some(91.0));
    assert_eq!(sink.get(&flat("cpu_utilization")), Some(31.0));
    assert_eq!(sink.get(&flat("gpu_0_utilization_optimized")), None);
}

/// **Test:** Balanced replay
///
/// **Expectation:** GPU_0's surplus above the standard thresholds lands on
/// GPU_1 (capped at the threshold), clock speed and host values pass
/// through, and the tick report names the overloaded device.
#[test]
fn test_balanced_replay_publishes_redistributed_values() {
    let (mut replayer, sink) = replayer(store(), true, Duration::from_secs(5));

    let report = replayer.tick();
    let balance = report.balance.expect("balancing is enabled");
    assert_eq!(balance.overloaded, vec![DeviceId::from("GPU_0")]);
    assert_eq!(balance.underloaded, vec![DeviceId::from("GPU_1")]);

    let expect = |name: &str, value: f64| {
        let got = sink.get(&flat(name)).unwrap_or(f64::NAN);
        assert!((got - value).abs() < 1e-9, "{name}: expected {value}, got {got}");
    };
    expect("gpu_0_utilization_optimized", 65.0);
    expect("gpu_1_utilization_optimized", 65.0);
    expect("gpu_0_memory_util_optimized", 70.0);
    expect("gpu_1_memory_util_optimized", 40.0);
    expect("gpu_0_power_optimized", 150.0);
    expect("gpu_1_power_optimized", 110.0);
    expect("gpu_0_temp_optimized", 70.0);
    expect("gpu_1_temp_optimized", 65.0);
    expect("gpu_0_fan_optimized", 90.0);
    expect("gpu_1_fan_optimized", 50.0);
    expect("gpu_0_clock_optimized", 1500.0);
    expect("server_cpu_optimized", 30.0);
    expect("server_net_optimized", 950.0);

    // 25 utilization surplus fit exactly, nothing was lost
    assert!(balance.is_lossless());
    assert_eq!(sink.snapshot().1.len(), 18);
}

#[tokio::test]
async fn test_run_with_cancelled_token_does_not_tick() {
    let (replayer, sink) = replayer(store(), false, Duration::from_secs(5));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let stopped = replayer.run(cancel).await;

    assert_eq!(stopped.state(), ReplayState::Stopped);
    assert_eq!(stopped.index(), 0);
    assert_eq!(sink.frames_published(), 0);
}

/// **Test:** Interval pacing and prompt shutdown
///
/// **Expectation:** With a 5 s interval, 12 s of (paused) time yields ticks
/// at 0, 5 and 10 s. Cancelling while the loop sleeps stops it without
/// waiting for the rest of the interval.
#[tokio::test(start_paused = true)]
async fn test_run_ticks_per_interval_and_stops_on_cancel() {
    let (replayer, sink) = replayer(store(), false, Duration::from_secs(5));
    assert_eq!(replayer.state(), ReplayState::Running);

    let cancel = CancellationToken::new();
    let handle = tokio::spawn(replayer.run(cancel.clone()));

    tokio::time::sleep(Duration::from_secs(12)).await;
    assert_eq!(sink.frames_published(), 3);

    let cancelled_at = tokio::time::Instant::now();
    cancel.cancel();
    let stopped = handle.await.unwrap();

    assert!(cancelled_at.elapsed() < Duration::from_secs(5));
    assert_eq!(stopped.state(), ReplayState::Stopped);
    assert_eq!(stopped.index(), 0);
    assert_eq!(sink.frames_published(), 3);
}
