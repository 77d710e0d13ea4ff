use fleetgauge_core::{DeviceMetric, DeviceRecord};
use std::collections::BTreeMap;

use super::{BalanceReport, EPSILON};
use crate::config::BalancerConfig;
use crate::scoring::{classify, Classification};

/// Clamp-then-redistribute, repeated until it settles.
///
/// One pass works metric by metric over the balanced metrics: each overloaded
/// device above the threshold is clamped to it and the removed amount goes
/// into the metric's pool, which is then split evenly over the underloaded
/// devices, capped at the threshold. Whatever a capped device could not
/// absorb is not offered to its peers.
///
/// A pass can turn a peer into an overloaded device that still sits above a
/// threshold, so the fleet is re-classified and passes repeat until no
/// overloaded device is above any balanced threshold. Every pass clamps at
/// least one value and no pass lifts a value above its threshold, which
/// bounds the loop by `devices × balanced metrics`.
pub(super) fn clamp_redistribute(
    devices: &mut [DeviceRecord],
    config: &BalancerConfig,
    first: Classification,
    report: &mut BalanceReport,
) {
    let limit = devices.len() * config.thresholds().len() + 1;
    let mut classification = first;

    while report.passes < limit && has_clampable(devices, config, &classification) {
        clamp_pass(devices, config, &classification, report);
        report.passes += 1;
        classification = classify(devices, config);
    }
}

fn has_clampable(
    devices: &[DeviceRecord],
    config: &BalancerConfig,
    classification: &Classification,
) -> bool {
    classification.overloaded.iter().any(|&i| {
        config
            .balanced_metrics()
            .any(|(metric, threshold)| devices[i].get(metric) > threshold)
    })
}

fn clamp_pass(
    devices: &mut [DeviceRecord],
    config: &BalancerConfig,
    classification: &Classification,
    report: &mut BalanceReport,
) {
    for (metric, threshold) in config.balanced_metrics() {
        let surplus = clamp(devices, metric, threshold, &classification.overloaded);
        if surplus <= EPSILON {
            continue;
        }
        add(&mut report.surplus, metric, surplus);

        if classification.underloaded.is_empty() {
            add(&mut report.discarded, metric, surplus);
            continue;
        }

        let placed = place(devices, metric, threshold, surplus, &classification.underloaded);
        add(&mut report.unplaced, metric, surplus - placed);
    }
}

/// Fleet-excess, a single pass over the weighted metrics.
///
/// Only acts when at least one device is overloaded. The excess per metric is
/// the fleet total above `threshold × fleet size`, measured before clamping.
/// Overloaded devices are clamped, then the excess is split evenly over the
/// underloaded devices, capped at the threshold. The offer never exceeds what
/// was clamped; the clamped amount not offered is booked as withheld.
pub(super) fn fleet_excess(
    devices: &mut [DeviceRecord],
    config: &BalancerConfig,
    classification: &Classification,
    report: &mut BalanceReport,
) {
    if classification.overloaded.is_empty() {
        return;
    }
    report.passes = 1;

    let fleet_size = devices.len() as f64;
    for (metric, threshold) in config.weighted_metrics() {
        let total: f64 = devices.iter().map(|d| d.get(metric)).sum();
        let excess = total - threshold * fleet_size;

        let clamped = clamp(devices, metric, threshold, &classification.overloaded);
        if clamped <= EPSILON {
            continue;
        }
        add(&mut report.surplus, metric, clamped);

        if classification.underloaded.is_empty() {
            add(&mut report.discarded, metric, clamped);
            continue;
        }

        let offered = excess.clamp(0.0, clamped);
        add(&mut report.withheld, metric, clamped - offered);
        if offered > EPSILON {
            let placed = place(devices, metric, threshold, offered, &classification.underloaded);
            add(&mut report.unplaced, metric, offered - placed);
        }
    }
}

/// Clamps `devices` above `threshold` and returns the amount removed.
fn clamp(devices: &mut [DeviceRecord], metric: DeviceMetric, threshold: f64, at: &[usize]) -> f64 {
    let mut removed = 0.0;
    for &i in at {
        let value = devices[i].get(metric);
        if value > threshold {
            removed += value - threshold;
            devices[i].set(metric, threshold);
        }
    }
    removed
}

/// Splits `amount` evenly over `peers` and returns what landed. A peer never
/// goes above `threshold`; a peer already at or above it takes nothing.
fn place(
    devices: &mut [DeviceRecord],
    metric: DeviceMetric,
    threshold: f64,
    amount: f64,
    peers: &[usize],
) -> f64 {
    let share = amount / peers.len() as f64;
    let mut placed = 0.0;
    for &i in peers {
        let before = devices[i].get(metric);
        if before >= threshold {
            continue;
        }
        let after = (before + share).min(threshold);
        devices[i].set(metric, after);
        placed += after - before;
    }
    placed
}

fn add(book: &mut BTreeMap<DeviceMetric, f64>, metric: DeviceMetric, amount: f64) {
    if amount > EPSILON {
        *book.entry(metric).or_insert(0.0) += amount;
    }
}
