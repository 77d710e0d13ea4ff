use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::info;

pub(crate) struct Metric {
    pub name: &'static str,
    description: &'static str,
}

pub(crate) const COUNTERS: [Metric; 2] = [REPLAY_TICKS_TOTAL, BALANCER_SURPLUS_DISCARDED_TOTAL];
pub(crate) const GAUGES: [Metric; 2] = [REPLAY_INDEX, BALANCER_OVERLOADED_DEVICES];
pub(crate) const HISTOGRAMS: [Metric; 1] = [REPLAY_TICK_DURATION_SECONDS];

// REPLAY Metrics --------------------------

pub(crate) const REPLAY_TICKS_TOTAL: Metric = Metric {
    name: "fleetgauge_replay_ticks_total",
    description: "Total number of snapshots replayed",
};

pub(crate) const REPLAY_INDEX: Metric = Metric {
    name: "fleetgauge_replay_index",
    description: "Position of the last replayed snapshot in the recorded dataset",
};

pub(crate) const REPLAY_TICK_DURATION_SECONDS: Metric = Metric {
    name: "fleetgauge_replay_tick_duration_seconds",
    description: "Time spent fetching, balancing and publishing one snapshot",
};

// BALANCER Metrics --------------------------

pub(crate) const BALANCER_OVERLOADED_DEVICES: Metric = Metric {
    name: "fleetgauge_balancer_overloaded_devices",
    description: "Number of devices classified overloaded in the last replayed snapshot",
};

pub(crate) const BALANCER_SURPLUS_DISCARDED_TOTAL: Metric = Metric {
    name: "fleetgauge_balancer_surplus_discarded_total",
    description: "Snapshots where surplus was lost, by metric and reason (no_underloaded, capacity, withheld)",
};

/// Installs the Prometheus recorder (when an address is given) and describes
/// the exporter's own metrics.
pub(crate) fn init_metrics(prom_addr: Option<SocketAddr>) -> Result<()> {
    info!("initializing metrics exporter");

    if let Some(addr) = prom_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .with_context(|| format!("failed to install Prometheus recorder on {addr}"))?;
    }

    for name in COUNTERS {
        register_counter(name)
    }

    for name in GAUGES {
        register_gauge(name)
    }

    for name in HISTOGRAMS {
        register_histogram(name)
    }

    Ok(())
}

/// Registers a counter with the given name.
fn register_counter(metric: Metric) {
    metrics::describe_counter!(metric.name, metric.description);
    let _counter = metrics::counter!(metric.name);
}

/// Registers a gauge with the given name.
fn register_gauge(metric: Metric) {
    metrics::describe_gauge!(metric.name, metric.description);
    let _gauge = metrics::gauge!(metric.name);
}

/// Registers a histogram with the given name.
fn register_histogram(metric: Metric) {
    metrics::describe_histogram!(metric.name, metric.description);
    let _histogram = metrics::histogram!(metric.name);
}
