use clap::Parser;
use fleetgauge_load_balancer::{BalancePolicy, BalanceProfile};
use std::path::PathBuf;

use crate::series_naming::NamingStyle;

/// Command line and environment overrides. Every field is optional so that
/// unset values fall through to the config file and then the defaults.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "fleetgauge")]
#[command(about = "Replay recorded GPU and host telemetry as Prometheus gauges")]
#[command(version)]
pub(crate) struct Args {
    /// Path to an optional YAML config file
    #[arg(long, env = "FLEETGAUGE_CONFIG")]
    pub(crate) config_file: Option<PathBuf>,

    /// Recorded dataset (CSV)
    #[arg(long, env = "CSV_PATH")]
    pub(crate) csv_path: Option<PathBuf>,

    /// Seconds between two replayed snapshots
    #[arg(long, env = "UPDATE_INTERVAL")]
    pub(crate) update_interval: Option<u64>,

    /// Comma separated device ids, e.g. GPU_0,GPU_1
    #[arg(long, env = "GPUS")]
    pub(crate) gpus: Option<String>,

    /// Publish load-balanced values instead of the recorded ones
    #[arg(long, env = "BALANCE_ENABLED")]
    pub(crate) balance_enabled: Option<bool>,

    /// Threshold preset: standard or strict
    #[arg(long, env = "BALANCE_PROFILE")]
    pub(crate) balance_profile: Option<BalanceProfile>,

    /// Redistribution policy: clamp_redistribute or fleet_excess
    #[arg(long, env = "BALANCE_POLICY")]
    pub(crate) balance_policy: Option<BalancePolicy>,

    /// Prometheus exporter address, or "off" to disable the listener
    #[arg(long, env = "PROM_EXPORTER")]
    pub(crate) prom_exporter: Option<String>,

    /// Series naming: flat or labelled
    #[arg(long, env = "SERIES_NAMING")]
    pub(crate) series_naming: Option<NamingStyle>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_overrides() {
        let args = Args::try_parse_from([
            "fleetgauge",
            "--csv-path",
            "/data/metrics.csv",
            "--update-interval",
            "2",
            "--gpus",
            "GPU_0,GPU_1",
            "--balance-enabled",
            "true",
            "--balance-policy",
            "fleet-excess",
            "--series-naming",
            "labelled",
        ])
        .unwrap();

        assert_eq!(args.csv_path, Some(PathBuf::from("/data/metrics.csv")));
        assert_eq!(args.update_interval, Some(2));
        assert_eq!(args.gpus.as_deref(), Some("GPU_0,GPU_1"));
        assert_eq!(args.balance_enabled, Some(true));
        assert_eq!(args.balance_policy, Some(BalancePolicy::FleetExcess));
        assert_eq!(args.series_naming, Some(NamingStyle::Labelled));
        assert_eq!(args.balance_profile, None);
    }

    #[test]
    fn test_unknown_profile_is_rejected() {
        let parsed = Args::try_parse_from(["fleetgauge", "--balance-profile", "lenient"]);
        assert!(parsed.is_err());
    }
}
