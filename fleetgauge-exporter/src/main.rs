mod args_parse;
mod exporter_metrics;
mod metric_sink;
mod replayer;
mod series_naming;
mod service_configuration;

#[cfg(test)]
mod replayer_test;

use std::sync::Arc;

use crate::{
    args_parse::Args,
    exporter_metrics::init_metrics,
    metric_sink::{MetricSink, PrometheusSink},
    replayer::Replayer,
    series_naming::{SeriesNaming, SeriesVariant},
    service_configuration::{LoadConfiguration, ServiceConfiguration},
};

use anyhow::{Context, Result};
use clap::Parser;
use fleetgauge_core::SnapshotStore;
use fleetgauge_load_balancer::LoadBalancer;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging, RUST_LOG overrides the default level
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // Parse command line arguments
    let args = Args::parse();

    // Defaults, then the optional config file, then command line / environment
    let mut load_config = match &args.config_file {
        Some(path) => LoadConfiguration::from_file(path)?,
        None => LoadConfiguration::default(),
    };
    load_config.apply_args(&args);
    let service_config: ServiceConfiguration = load_config.try_into()?;

    info!(
        dataset = %service_config.csv_path.display(),
        fleet = %service_config.fleet,
        interval = ?service_config.update_interval,
        balancing = service_config.balancer.is_some(),
        policy = ?service_config.balancer.as_ref().map(|b| b.policy()),
        prom_exporter = ?service_config.prom_exporter,
        naming = %service_config.series_naming,
        "fleetgauge starting"
    );

    init_metrics(service_config.prom_exporter)?;

    let store = SnapshotStore::from_path(&service_config.csv_path, service_config.fleet)
        .with_context(|| {
            format!(
                "Failed to load dataset {}",
                service_config.csv_path.display()
            )
        })?;
    info!(
        snapshots = store.len(),
        first = ?store.ordered_timestamps().first(),
        last = ?store.ordered_timestamps().last(),
        "dataset ready"
    );

    let balancer = service_config.balancer.map(LoadBalancer::new);
    let variant = match balancer {
        Some(_) => SeriesVariant::Balanced,
        None => SeriesVariant::Raw,
    };
    let naming = SeriesNaming::new(service_config.series_naming, variant, store.fleet())
        .context("Failed to resolve series names")?;
    info!(
        style = %naming.style(),
        variant = naming.variant().as_str(),
        "series naming resolved"
    );

    let sink = PrometheusSink::new();
    sink.describe(&naming);
    let sink: Arc<dyn MetricSink> = Arc::new(sink);

    let replayer = Replayer::new(
        Arc::new(store),
        balancer,
        naming,
        sink,
        service_config.update_interval,
    );

    let cancel = CancellationToken::new();
    let replay_task = tokio::spawn(replayer.run(cancel.clone()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for the shutdown signal")?;
    info!("shutdown signal received, stopping replay");
    cancel.cancel();

    let replayer = replay_task.await.context("Replay task failed")?;
    info!(state = ?replayer.state(), "fleetgauge stopped");

    Ok(())
}
