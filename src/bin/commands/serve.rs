use birdglass::{GlassConfig, NeighboursStore};
use clap::Args;
use std::sync::Arc;
use tracing::info;

/// Arguments for the Serve command
#[derive(Args)]
pub struct ServeArgs {
    /// Override the refresh interval from the configuration (in seconds)
    #[clap(long)]
    pub refresh_interval: Option<u64>,
}

pub fn run(config: &GlassConfig, args: ServeArgs) {
    let mut config = config.clone();
    if let Some(secs) = args.refresh_interval {
        config.refresh_interval_secs = secs.max(1);
    }

    if config.sources.is_empty() {
        eprintln!("ERROR: no route servers configured");
        return;
    }

    let store = match NeighboursStore::from_config(&config) {
        Ok(store) => Arc::new(store),
        Err(e) => {
            eprintln!("ERROR: {e}");
            return;
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("ERROR: unable to start runtime: {e}");
            return;
        }
    };

    let refresh = match store.start_refresh() {
        Ok(task) => task,
        Err(e) => {
            eprintln!("ERROR: unable to start neighbours refresh: {e}");
            return;
        }
    };
    let housekeeping = match store.start_housekeeping(config.housekeeping_interval()) {
        Ok(task) => task,
        Err(e) => {
            eprintln!("ERROR: unable to start cache housekeeping: {e}");
            refresh.shutdown();
            return;
        }
    };

    info!(
        "serving {} route servers, refreshing every {}",
        store.source_ids().len(),
        birdglass::format_duration(store.refresh_interval())
    );

    if let Err(e) = runtime.block_on(tokio::signal::ctrl_c()) {
        eprintln!("ERROR: unable to listen for shutdown signal: {e}");
    }

    info!("shutting down");
    refresh.shutdown();
    housekeeping.shutdown();
    store.stats().log();
}
