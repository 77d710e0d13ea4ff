mod redistribution;


use fleetgauge_core::{DeviceId, DeviceMetric, Snapshot};
use std::collections::BTreeMap;
use tracing::debug;

use crate::config::{BalancePolicy, BalancerConfig, MetricThresholds, MetricWeights};
use crate::errors::Result;
use crate::scoring::classify;

/// Amounts below this are treated as float noise when reporting.
pub(crate) const EPSILON: f64 = 1e-9;

/// Stateless snapshot transform. Cheap to clone and share.
#[derive(Debug, Clone)]
pub struct LoadBalancer {
    config: BalancerConfig,
}

/// What one `balance` call did, for logging and the lossy-redistribution counters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceReport {
    pub overloaded: Vec<DeviceId>,
    pub underloaded: Vec<DeviceId>,
    /// Amount pooled per metric for redistribution.
    pub surplus: BTreeMap<DeviceMetric, f64>,
    /// Pooled amount dropped because no device was underloaded.
    pub discarded: BTreeMap<DeviceMetric, f64>,
    /// Pooled amount that did not land because peers reached their threshold.
    pub unplaced: BTreeMap<DeviceMetric, f64>,
    /// Clamped amount the fleet-excess policy did not offer to peers because
    /// the fleet total stayed within `threshold × fleet size`.
    pub withheld: BTreeMap<DeviceMetric, f64>,
    /// Clamp passes applied; zero when nothing needed clamping.
    pub passes: usize,
}

impl BalanceReport {
    /// True when every clamped unit landed on a peer.
    pub fn is_lossless(&self) -> bool {
        self.discarded.is_empty() && self.unplaced.is_empty() && self.withheld.is_empty()
    }

    /// Amount of `metric` removed from the fleet total.
    pub fn lost(&self, metric: DeviceMetric) -> f64 {
        [&self.discarded, &self.unplaced, &self.withheld]
            .iter()
            .filter_map(|book| book.get(&metric))
            .sum()
    }
}

#[derive(Debug, Clone)]
pub struct BalanceOutcome {
    pub snapshot: Snapshot,
    pub report: BalanceReport,
}

impl LoadBalancer {
    pub fn new(config: BalancerConfig) -> Self {
        LoadBalancer { config }
    }

    /// Validates the tables and builds the balancer in one step.
    pub fn try_from_tables(
        thresholds: MetricThresholds,
        weights: MetricWeights,
        policy: BalancePolicy,
    ) -> Result<Self> {
        Ok(LoadBalancer::new(BalancerConfig::new(
            thresholds, weights, policy,
        )?))
    }

    pub fn config(&self) -> &BalancerConfig {
        &self.config
    }

    /// Returns the balanced copy of `snapshot`. Deterministic for a given
    /// input and device order; the host record is never modified.
    ///
    /// The report names the devices overloaded in the input snapshot.
    pub fn balance(&self, snapshot: &Snapshot) -> BalanceOutcome {
        let mut balanced = snapshot.clone();
        let classification = classify(&balanced.devices, &self.config);

        let mut report = BalanceReport {
            overloaded: ids(&balanced, &classification.overloaded),
            underloaded: ids(&balanced, &classification.underloaded),
            ..Default::default()
        };

        match self.config.policy() {
            BalancePolicy::ClampRedistribute => redistribution::clamp_redistribute(
                &mut balanced.devices,
                &self.config,
                classification,
                &mut report,
            ),
            BalancePolicy::FleetExcess => redistribution::fleet_excess(
                &mut balanced.devices,
                &self.config,
                &classification,
                &mut report,
            ),
        }

        if !report.is_lossless() {
            debug!(
                timestamp = %snapshot.timestamp,
                discarded = ?report.discarded,
                unplaced = ?report.unplaced,
                withheld = ?report.withheld,
                "surplus could not be fully redistributed"
            );
        }

        BalanceOutcome {
            snapshot: balanced,
            report,
        }
    }
}

fn ids(snapshot: &Snapshot, positions: &[usize]) -> Vec<DeviceId> {
    positions
        .iter()
        .map(|&i| snapshot.devices[i].device_id.clone())
        .collect()
}
