use fleetgauge_core::DeviceRecord;

use crate::config::BalancerConfig;

/// Weighted load score of one device.
///
/// `score = Σ weight[m] × value[m] / threshold[m]` over the weighted metrics.
/// Thresholds are validated positive, so the division is always defined.
pub fn score(device: &DeviceRecord, config: &BalancerConfig) -> f64 {
    config
        .weights()
        .iter()
        .filter_map(|(metric, weight)| {
            config
                .thresholds()
                .get(metric)
                .map(|threshold| weight * device.get(metric) / threshold)
        })
        .sum()
}

/// Overloaded / underloaded split of a snapshot's devices, by position.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    pub scores: Vec<f64>,
    pub overloaded: Vec<usize>,
    pub underloaded: Vec<usize>,
}

impl Classification {
    pub fn is_overloaded(&self, position: usize) -> bool {
        self.overloaded.contains(&position)
    }
}

/// A device is overloaded when its score is strictly above 1.0; a score of
/// exactly 1.0 counts as underloaded.
pub fn classify(devices: &[DeviceRecord], config: &BalancerConfig) -> Classification {
    let scores: Vec<f64> = devices.iter().map(|d| score(d, config)).collect();

    let (overloaded, underloaded): (Vec<usize>, Vec<usize>) =
        (0..devices.len()).partition(|&i| scores[i] > 1.0);

    Classification {
        scores,
        overloaded,
        underloaded,
    }
}
