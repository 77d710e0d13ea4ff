use fleetgauge_core::DeviceMetric;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::{ConfigurationError, Result};

/// Maximum value per metric. A metric with a threshold is a balanced metric.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricThresholds(BTreeMap<DeviceMetric, f64>);

impl MetricThresholds {
    pub fn new(entries: impl IntoIterator<Item = (DeviceMetric, f64)>) -> Self {
        MetricThresholds(entries.into_iter().collect())
    }

    pub fn get(&self, metric: DeviceMetric) -> Option<f64> {
        self.0.get(&metric).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeviceMetric, f64)> + '_ {
        self.0.iter().map(|(m, t)| (*m, *t))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Scoring weight per metric. Need not sum to 1.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetricWeights(BTreeMap<DeviceMetric, f64>);

impl MetricWeights {
    pub fn new(entries: impl IntoIterator<Item = (DeviceMetric, f64)>) -> Self {
        MetricWeights(entries.into_iter().collect())
    }

    pub fn get(&self, metric: DeviceMetric) -> Option<f64> {
        self.0.get(&metric).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeviceMetric, f64)> + '_ {
        self.0.iter().map(|(m, w)| (*m, *w))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// How the surplus removed from overloaded devices is computed and spread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalancePolicy {
    /// Clamp each overloaded device to the thresholds and spread exactly the
    /// clamped amount over the underloaded devices (default)
    #[default]
    ClampRedistribute,

    /// Compute the fleet-wide excess over `threshold × fleet size` before
    /// clamping, then spread that excess over the underloaded devices
    FleetExcess,
}

impl fmt::Display for BalancePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalancePolicy::ClampRedistribute => f.write_str("clamp_redistribute"),
            BalancePolicy::FleetExcess => f.write_str("fleet_excess"),
        }
    }
}

impl FromStr for BalancePolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "clamp_redistribute" => Ok(BalancePolicy::ClampRedistribute),
            "fleet_excess" => Ok(BalancePolicy::FleetExcess),
            other => Err(format!(
                "unknown balance policy {other:?} (expected clamp_redistribute or fleet_excess)"
            )),
        }
    }
}

/// Threshold presets used by the recorded deployments
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BalanceProfile {
    /// utilization 65, memory 70, temperature 70 °C, power 150 W, fan 90 %
    #[default]
    Standard,
    /// utilization 55, memory 60, temperature 60 °C, power 130 W, fan 75 %
    Strict,
}

impl BalanceProfile {
    pub fn thresholds(&self) -> MetricThresholds {
        let (util, mem, temp, power, fan) = match self {
            BalanceProfile::Standard => (65.0, 70.0, 70.0, 150.0, 90.0),
            BalanceProfile::Strict => (55.0, 60.0, 60.0, 130.0, 75.0),
        };
        MetricThresholds::new([
            (DeviceMetric::Utilization, util),
            (DeviceMetric::MemoryUtilization, mem),
            (DeviceMetric::Temperature, temp),
            (DeviceMetric::PowerDraw, power),
            (DeviceMetric::FanSpeed, fan),
        ])
    }

    /// Both presets share the same priorities: temperature first, power last.
    pub fn weights(&self) -> MetricWeights {
        MetricWeights::new([
            (DeviceMetric::Temperature, 0.4),
            (DeviceMetric::Utilization, 0.3),
            (DeviceMetric::MemoryUtilization, 0.2),
            (DeviceMetric::PowerDraw, 0.1),
        ])
    }
}

impl fmt::Display for BalanceProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BalanceProfile::Standard => f.write_str("standard"),
            BalanceProfile::Strict => f.write_str("strict"),
        }
    }
}

impl FromStr for BalanceProfile {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(BalanceProfile::Standard),
            "strict" => Ok(BalanceProfile::Strict),
            other => Err(format!(
                "unknown balance profile {other:?} (expected standard or strict)"
            )),
        }
    }
}

/// Validated balancer configuration. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct BalancerConfig {
    thresholds: MetricThresholds,
    weights: MetricWeights,
    policy: BalancePolicy,
}

impl BalancerConfig {
    /// Every weighted metric needs a positive, finite threshold and weights
    /// must be finite and non-negative; otherwise scoring is undefined.
    pub fn new(
        thresholds: MetricThresholds,
        weights: MetricWeights,
        policy: BalancePolicy,
    ) -> Result<Self> {
        for (metric, value) in thresholds.iter() {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigurationError::InvalidThreshold { metric, value });
            }
        }

        for (metric, value) in weights.iter() {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigurationError::InvalidWeight { metric, value });
            }
            if thresholds.get(metric).is_none() {
                return Err(ConfigurationError::MissingThreshold { metric });
            }
        }

        Ok(BalancerConfig {
            thresholds,
            weights,
            policy,
        })
    }

    pub fn from_profile(profile: BalanceProfile, policy: BalancePolicy) -> Self {
        BalancerConfig {
            thresholds: profile.thresholds(),
            weights: profile.weights(),
            policy,
        }
    }

    pub fn thresholds(&self) -> &MetricThresholds {
        &self.thresholds
    }

    pub fn weights(&self) -> &MetricWeights {
        &self.weights
    }

    pub fn policy(&self) -> BalancePolicy {
        self.policy
    }

    /// Metrics subject to clamping and redistribution, in stable order.
    pub fn balanced_metrics(&self) -> impl Iterator<Item = (DeviceMetric, f64)> + '_ {
        self.thresholds.iter()
    }

    /// Metrics that carry a weight, paired with their threshold.
    pub fn weighted_metrics(&self) -> impl Iterator<Item = (DeviceMetric, f64)> + '_ {
        self.weights
            .iter()
            .filter_map(|(metric, _)| self.thresholds.get(metric).map(|t| (metric, t)))
    }
}
