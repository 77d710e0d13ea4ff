use anyhow::{anyhow, Context, Result};
use fleetgauge_core::{DeviceId, Fleet};
use fleetgauge_load_balancer::{
    BalancePolicy, BalanceProfile, BalancerConfig, MetricThresholds, MetricWeights,
};
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::args_parse::Args;
use crate::series_naming::NamingStyle;

pub(crate) const DEFAULT_CSV_PATH: &str = "metrics.csv";
pub(crate) const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 5;
pub(crate) const DEFAULT_FLEET_SIZE: usize = 4;
pub(crate) const DEFAULT_PROM_EXPORTER: &str = "0.0.0.0:8000";

/// configuration settings as written in the config file, every key optional
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct LoadConfiguration {
    /// Recorded dataset (CSV)
    pub(crate) csv_path: Option<PathBuf>,
    /// Seconds between two replayed snapshots
    pub(crate) update_interval_seconds: Option<u64>,
    /// Device ids making up the fleet, in emission order
    pub(crate) gpus: Option<Vec<String>>,
    /// Prometheus exporter address, "off" disables the listener
    pub(crate) prom_exporter: Option<String>,
    /// Flat (legacy gauge names) or labelled series
    pub(crate) series_naming: Option<NamingStyle>,
    /// Load balancer settings
    pub(crate) load_balancer: LoadBalancerSection,
}

/// `load_balancer` section of the config file
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub(crate) struct LoadBalancerSection {
    pub(crate) enabled: Option<bool>,
    pub(crate) profile: Option<BalanceProfile>,
    pub(crate) policy: Option<BalancePolicy>,
    /// Replaces the profile thresholds when set
    pub(crate) thresholds: Option<MetricThresholds>,
    /// Replaces the profile weights when set
    pub(crate) weights: Option<MetricWeights>,
}

/// validated runtime configuration of the exporter
#[derive(Debug)]
pub(crate) struct ServiceConfiguration {
    pub(crate) csv_path: PathBuf,
    pub(crate) update_interval: Duration,
    pub(crate) fleet: Fleet,
    /// None when the HTTP listener is turned off
    pub(crate) prom_exporter: Option<SocketAddr>,
    pub(crate) series_naming: NamingStyle,
    /// Some when balancing is enabled
    pub(crate) balancer: Option<BalancerConfig>,
}

impl LoadConfiguration {
    pub(crate) fn from_file(path: &Path) -> Result<Self> {
        let content = read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Command line and environment values win over the file.
    pub(crate) fn apply_args(&mut self, args: &Args) {
        if let Some(csv_path) = &args.csv_path {
            self.csv_path = Some(csv_path.clone());
        }
        if let Some(interval) = args.update_interval {
            self.update_interval_seconds = Some(interval);
        }
        if let Some(gpus) = &args.gpus {
            self.gpus = Some(
                gpus.split(',')
                    .map(str::trim)
                    .filter(|g| !g.is_empty())
                    .map(str::to_string)
                    .collect(),
            );
        }
        if let Some(addr) = &args.prom_exporter {
            self.prom_exporter = Some(addr.clone());
        }
        if let Some(naming) = args.series_naming {
            self.series_naming = Some(naming);
        }
        if let Some(enabled) = args.balance_enabled {
            self.load_balancer.enabled = Some(enabled);
        }
        if let Some(profile) = args.balance_profile {
            self.load_balancer.profile = Some(profile);
        }
        if let Some(policy) = args.balance_policy {
            self.load_balancer.policy = Some(policy);
        }
    }
}

/// Implementing the TryFrom trait to fill defaults and validate the merged configuration
impl TryFrom<LoadConfiguration> for ServiceConfiguration {
    type Error = anyhow::Error;

    fn try_from(config: LoadConfiguration) -> Result<Self> {
        let interval_secs = config
            .update_interval_seconds
            .unwrap_or(DEFAULT_UPDATE_INTERVAL_SECS);
        if interval_secs == 0 {
            return Err(anyhow!("update interval must be at least one second"));
        }

        let fleet = match config.gpus {
            Some(gpus) => Fleet::new(gpus.into_iter().map(DeviceId::new).collect())
                .context("Invalid fleet definition")?,
            None => Fleet::numbered(DEFAULT_FLEET_SIZE).context("Invalid default fleet")?,
        };

        let prom_exporter = parse_exporter_addr(
            config
                .prom_exporter
                .as_deref()
                .unwrap_or(DEFAULT_PROM_EXPORTER),
        )?;

        // tables are validated even when balancing is off
        let section = config.load_balancer;
        let profile = section.profile.unwrap_or_default();
        let balancer_config = BalancerConfig::new(
            section.thresholds.unwrap_or_else(|| profile.thresholds()),
            section.weights.unwrap_or_else(|| profile.weights()),
            section.policy.unwrap_or_default(),
        )
        .context("Invalid load balancer configuration")?;

        Ok(ServiceConfiguration {
            csv_path: config
                .csv_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CSV_PATH)),
            update_interval: Duration::from_secs(interval_secs),
            fleet,
            prom_exporter,
            series_naming: config.series_naming.unwrap_or_default(),
            balancer: section.enabled.unwrap_or(false).then_some(balancer_config),
        })
    }
}

fn parse_exporter_addr(value: &str) -> Result<Option<SocketAddr>> {
    let value = value.trim();
    if value.is_empty() || value.eq_ignore_ascii_case("off") {
        return Ok(None);
    }
    let addr = value
        .parse()
        .with_context(|| format!("Failed to parse into Socket address: {}", value))?;
    Ok(Some(addr))
}
