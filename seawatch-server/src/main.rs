use std::io::Write;
use std::time::Duration;

use clap::Parser;
use log::{info, warn};
use miette::{miette, IntoDiagnostic, Result};
use seawatch_server::config::{init_settings, load_settings};
use seawatch_server::monitor::run_monitor;
use seawatch_server::{Cli, MonitorHandle, MonitorService, VesselStore, VERSION};
use tokio::sync::broadcast::error::RecvError;
use tokio_graceful_shutdown::{SubsystemBuilder, SubsystemHandle, Toplevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    info!("seawatch-server {}", VERSION);

    if args.init_config {
        let path = init_settings(args.config.as_deref()).map_err(|e| miette!("{:#}", e))?;
        println!("{}", path.display());
        return Ok(());
    }

    let settings = load_settings(args.config.as_deref()).map_err(|e| miette!("{:#}", e))?;

    let store = VesselStore::new();
    if let Some(path) = &args.vessels {
        let loaded = store
            .load_json_lines(path)
            .map_err(|e| miette!("{:#}", e))?;
        info!("Loaded {} vessel snapshots from {}", loaded, path.display());
    }

    let (service, handle) = MonitorService::new(&settings, store);
    let service = service.with_vessel_timeout(args.vessel_timeout.map(Duration::from_secs));
    let output = args.output;

    Toplevel::new(move |s| async move {
        if output {
            let rx_handle = handle.clone();
            s.start(SubsystemBuilder::new("Output", |subsys| {
                write_updates(subsys, rx_handle)
            }));
        }
        s.start(SubsystemBuilder::new("Monitor", |subsys| {
            run_monitor(subsys, service, handle)
        }));
    })
    .catch_signals()
    .handle_shutdown_requests(Duration::from_secs(5))
    .await
    .into_diagnostic()
}

/// Print every update as one JSON line on stdout
async fn write_updates(
    subsys: SubsystemHandle,
    handle: MonitorHandle,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let mut rx = handle.subscribe();
    let stdout = std::io::stdout();

    loop {
        tokio::select! {
            _ = subsys.on_shutdown_requested() => break,
            update = rx.recv() => match update {
                Ok(update) => {
                    let line = serde_json::to_string(&update)?;
                    let mut out = stdout.lock();
                    writeln!(out, "{}", line)?;
                    out.flush()?;
                }
                Err(RecvError::Lagged(n)) => warn!("Output: skipped {} updates", n),
                Err(RecvError::Closed) => break,
            }
        }
    }
    Ok(())
}
