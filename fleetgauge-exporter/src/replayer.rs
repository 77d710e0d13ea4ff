use fleetgauge_core::{Snapshot, SnapshotStore, Timestamp};
use fleetgauge_load_balancer::{BalanceReport, LoadBalancer};
use metrics::{counter, gauge, histogram};
use std::borrow::Cow;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::exporter_metrics::{
    BALANCER_OVERLOADED_DEVICES, BALANCER_SURPLUS_DISCARDED_TOTAL, REPLAY_INDEX,
    REPLAY_TICKS_TOTAL, REPLAY_TICK_DURATION_SECONDS,
};
use crate::metric_sink::MetricSink;
use crate::series_naming::SeriesNaming;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ReplayState {
    Running,
    Stopped,
}

/// Outcome of one replay step.
#[derive(Debug, Clone)]
pub(crate) struct TickReport {
    pub(crate) index: usize,
    pub(crate) timestamp: Timestamp,
    /// Present when balancing is enabled
    pub(crate) balance: Option<BalanceReport>,
}

/// Cyclic replay of a SnapshotStore into a MetricSink.
///
/// Each tick publishes the snapshot at the current index (balanced when a
/// balancer is configured) and advances the index modulo the store length.
pub(crate) struct Replayer {
    store: Arc<SnapshotStore>,
    balancer: Option<LoadBalancer>,
    naming: SeriesNaming,
    sink: Arc<dyn MetricSink>,
    interval: Duration,
    index: usize,
    state: ReplayState,
}

impl Replayer {
    pub(crate) fn new(
        store: Arc<SnapshotStore>,
        balancer: Option<LoadBalancer>,
        naming: SeriesNaming,
        sink: Arc<dyn MetricSink>,
        interval: Duration,
    ) -> Self {
        Replayer {
            store,
            balancer,
            naming,
            sink,
            interval,
            index: 0,
            state: ReplayState::Running,
        }
    }

    /// Index of the snapshot the next tick publishes.
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    pub(crate) fn state(&self) -> ReplayState {
        self.state
    }

    /// fetch, balance, emit, advance
    pub(crate) fn tick(&mut self) -> TickReport {
        let started = Instant::now();
        let index = self.index;
        let source = self.store.cyclic(index);

        let (published, balance): (Cow<'_, Snapshot>, Option<BalanceReport>) =
            match &self.balancer {
                Some(balancer) => {
                    let outcome = balancer.balance(source);
                    (Cow::Owned(outcome.snapshot), Some(outcome.report))
                }
                None => (Cow::Borrowed(source), None),
            };

        let frame = self.naming.frame(&published);
        self.sink.publish(&frame);

        let timestamp = source.timestamp;
        self.index = (index + 1) % self.store.len();

        counter!(REPLAY_TICKS_TOTAL.name).increment(1);
        gauge!(REPLAY_INDEX.name).set(index as f64);
        histogram!(REPLAY_TICK_DURATION_SECONDS.name).record(started.elapsed().as_secs_f64());

        match &balance {
            Some(report) => {
                record_balance(report);
                info!(
                    index,
                    timestamp = %timestamp,
                    overloaded = ?report.overloaded,
                    passes = report.passes,
                    "replayed balanced snapshot"
                );
            }
            None => info!(index, timestamp = %timestamp, "replayed snapshot"),
        }

        TickReport {
            index,
            timestamp,
            balance,
        }
    }

    /// Ticks every `interval` until `cancel` fires, then returns the stopped
    /// replayer. Cancellation during the sleep ends the loop immediately.
    pub(crate) async fn run(mut self, cancel: CancellationToken) -> Self {
        info!(
            snapshots = self.store.len(),
            interval = ?self.interval,
            "replay started"
        );

        loop {
            if cancel.is_cancelled() {
                break;
            }

            self.tick();

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        self.state = ReplayState::Stopped;
        info!(next_index = self.index, "replay stopped");
        self
    }
}

fn record_balance(report: &BalanceReport) {
    gauge!(BALANCER_OVERLOADED_DEVICES.name).set(report.overloaded.len() as f64);

    for (metric, amount) in &report.discarded {
        debug!(%metric, amount, "surplus discarded, no underloaded device");
        counter!(
            BALANCER_SURPLUS_DISCARDED_TOTAL.name,
            "metric" => metric.as_str(),
            "reason" => "no_underloaded"
        )
        .increment(1);
    }
    for (metric, amount) in &report.unplaced {
        debug!(%metric, amount, "surplus left unplaced, peers at threshold");
        counter!(
            BALANCER_SURPLUS_DISCARDED_TOTAL.name,
            "metric" => metric.as_str(),
            "reason" => "capacity"
        )
        .increment(1);
    }
    for (metric, amount) in &report.withheld {
        debug!(%metric, amount, "clamped amount withheld, fleet within capacity");
        counter!(
            BALANCER_SURPLUS_DISCARDED_TOTAL.name,
            "metric" => metric.as_str(),
            "reason" => "withheld"
        )
        .increment(1);
    }
}
