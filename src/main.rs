use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use polynodes_osc::api;
use polynodes_osc::dispatcher::Dispatcher;
use polynodes_osc::registry::Registry;
use polynodes_osc::{paths, settings, telemetry};

/// HTTP front end for the PolyNodes OSC dispatcher.
#[derive(Parser)]
#[command(name = "polynodes-server", version)]
struct Args {
    /// Listen address (overrides settings.json)
    #[arg(long)]
    listen: Option<std::net::SocketAddr>,

    /// PolyNodes host (overrides settings.json)
    #[arg(long)]
    host: Option<String>,

    /// PolyNodes OSC port (overrides settings.json)
    #[arg(long)]
    port: Option<u16>,

    /// Config directory (default: platform config dir)
    #[arg(long)]
    config_dir: Option<PathBuf>,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    telemetry::init(args.verbose.max(1));

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: Args) -> Result<(), String> {
    let config_dir = args.config_dir.unwrap_or_else(paths::default_config_dir);
    let mut settings = settings::load_or_default(&config_dir);
    if let Some(host) = args.host {
        settings.host = host;
    }
    if let Some(port) = args.port {
        settings.port = port;
    }
    let listen = args.listen.unwrap_or(settings.api_address);

    let registry = Registry::builtin().map_err(|e| format!("Invalid command table: {e}"))?;
    let registry = Arc::new(registry);
    let destination = settings.destination().await.map_err(|e| e.to_string())?;
    let dispatcher = Dispatcher::udp(registry.clone(), settings.bind_address, destination)
        .await
        .map_err(|e| e.to_string())?;

    info!(
        commands = registry.len(),
        destination = %destination,
        "PolyNodes OSC dispatcher ready"
    );

    let dispatcher = Arc::new(dispatcher);
    let (local, server) = api::start_api_server(Arc::clone(&dispatcher), listen).await?;
    println!("Listening on http://{local}");

    tokio::select! {
        _ = server => Err("API server exited".to_string()),
        signal = tokio::signal::ctrl_c() => {
            signal.map_err(|e| format!("Failed to listen for shutdown signal: {e}"))?;
            let stats = dispatcher.stats();
            info!(
                packets = stats.packets_sent,
                bytes = stats.bytes_sent,
                errors = stats.errors,
                "shutting down"
            );
            Ok(())
        }
    }
}
