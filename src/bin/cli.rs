// CLI binary: panicking on unrecoverable errors is standard for CLI tools.
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;
use tokio::net::UdpSocket;
use tracing::debug;

use polynodes_osc::dispatcher::{DispatchResult, Dispatcher, Outcome};
use polynodes_osc::osc::{OscMessage, MAX_DATAGRAM};
use polynodes_osc::registry::{catalog, CommandCategory, Layer, NumericValue, Registry};
use polynodes_osc::settings::{self, OscSettings};
use polynodes_osc::{paths, telemetry};

// ── CLI argument parsing ─────────────────────────────────────────

#[derive(Parser)]
#[command(name = "polynodes-cli", about = "Send validated OSC commands to PolyNodes", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// PolyNodes host (overrides settings.json)
    #[arg(long, global = true)]
    host: Option<String>,

    /// PolyNodes OSC port (overrides settings.json)
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Config directory (default: platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,

    /// Output raw JSON instead of formatted text
    #[arg(long, global = true)]
    json: bool,

    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate and send a registered command
    Invoke {
        /// Command name, e.g. seqbpm or blackhole_force
        command: String,
        /// Value to send
        #[arg(allow_hyphen_values = true)]
        value: NumericValue,
        /// Layer for layered commands (macro, meso, micro)
        #[arg(long, short)]
        layer: Option<Layer>,
    },
    /// Send to any address without validation
    Raw {
        address: String,
        /// Values, sent with their literal type (1 → int, 1.0 → float)
        #[arg(allow_hyphen_values = true)]
        values: Vec<NumericValue>,
    },
    /// List registered commands
    List {
        /// Restrict to one category slug
        #[arg(long, short)]
        category: Option<String>,
    },
    /// Describe categories, templates and commands
    Help { topic: Option<String> },
    /// Print the tool input schemas
    Schema,
    /// Show or change settings.json
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Print incoming OSC messages (useful as a stand-in for PolyNodes)
    Monitor {
        /// Address to listen on (default: the configured destination)
        #[arg(long)]
        bind: Option<SocketAddr>,
        /// Stop after this many messages
        #[arg(long)]
        count: Option<usize>,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Print the effective settings
    Show,
    /// Set one key (host, port, bind_address, api_address) and save
    Set { key: String, value: String },
    /// Print the settings file path
    Path,
}

// ── Output formatting ────────────────────────────────────────────

fn print_json<T: Serialize>(value: &T) {
    println!("{}", serde_json::to_string_pretty(value).unwrap());
}

fn print_result(result: &DispatchResult, raw: bool) {
    if raw {
        print_json(result);
        return;
    }
    let address = result.address.as_deref().unwrap_or("?");
    match &result.outcome {
        Outcome::Sent { bytes } => {
            let args: Vec<String> = result.args.iter().map(ToString::to_string).collect();
            println!("sent {address} {} ({bytes} bytes)", args.join(" "));
        }
        Outcome::Failed { error } => eprintln!("Error: {error}"),
    }
}

/// Print the outcome, log the transport counters and exit 1 on failure.
fn finish(d: &Dispatcher, result: &DispatchResult, raw: bool) {
    print_result(result, raw);
    let stats = d.stats();
    debug!(
        packets = stats.packets_sent,
        bytes = stats.bytes_sent,
        errors = stats.errors,
        "transport stats"
    );
    if !result.is_sent() {
        process::exit(1);
    }
}

fn print_settings(settings: &OscSettings, raw: bool) {
    if raw {
        print_json(settings);
    } else {
        println!("host          {}", settings.host);
        println!("port          {}", settings.port);
        println!("bind_address  {}", settings.bind_address);
        println!("api_address   {}", settings.api_address);
    }
}

// ── Settings ─────────────────────────────────────────────────────

fn effective_settings(cli: &Cli, config_dir: &Path) -> OscSettings {
    let mut settings = settings::load_or_default(config_dir);
    if let Some(host) = &cli.host {
        settings.host.clone_from(host);
    }
    if let Some(port) = cli.port {
        settings.port = port;
    }
    settings
}

fn fail(message: impl std::fmt::Display) -> ! {
    eprintln!("Error: {message}");
    process::exit(1);
}

// ── Commands ─────────────────────────────────────────────────────

async fn dispatcher(registry: Arc<Registry>, settings: &OscSettings) -> Dispatcher {
    let destination = settings.destination().await.unwrap_or_else(|e| fail(e));
    Dispatcher::udp(registry, settings.bind_address, destination)
        .await
        .unwrap_or_else(|e| fail(e))
}

async fn monitor(bind: SocketAddr, count: Option<usize>, raw: bool) {
    let socket = UdpSocket::bind(bind)
        .await
        .unwrap_or_else(|e| fail(format!("cannot bind {bind}: {e}")));
    eprintln!("Listening for OSC on {bind}");

    let mut buf = vec![0u8; MAX_DATAGRAM];
    let mut seen = 0usize;
    while count.map_or(true, |n| seen < n) {
        let (n, from) = tokio::select! {
            received = socket.recv_from(&mut buf) => match received {
                Ok(r) => r,
                Err(e) => fail(format!("receive failed: {e}")),
            },
            _ = tokio::signal::ctrl_c() => break,
        };
        seen += 1;
        match OscMessage::decode(&buf[..n]) {
            Ok(msg) if raw => print_json(&msg),
            Ok(msg) => println!("{from}  {msg}"),
            Err(e) => {
                debug!(from = %from, bytes = n, "undecodable datagram");
                eprintln!("{from}  <{n} bytes: {e}>");
            }
        }
    }
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    telemetry::init(cli.verbose);

    let config_dir = cli.config_dir.clone().unwrap_or_else(paths::default_config_dir);
    let settings = effective_settings(&cli, &config_dir);
    let registry =
        Registry::builtin().unwrap_or_else(|e| fail(format!("invalid command table: {e}")));
    let registry = Arc::new(registry);
    let raw = cli.json;

    match cli.command {
        Commands::Invoke {
            command,
            value,
            layer,
        } => {
            let d = dispatcher(registry, &settings).await;
            let result = d.invoke(&command, layer, value).await;
            finish(&d, &result, raw);
        }
        Commands::Raw { address, values } => {
            let d = dispatcher(registry, &settings).await;
            let result = d.send_raw(&address, &values).await;
            finish(&d, &result, raw);
        }
        Commands::List { category } => {
            let category = category.map(|slug| {
                CommandCategory::from_slug(&slug)
                    .unwrap_or_else(|| fail(format!("unknown category '{slug}'")))
            });
            if raw {
                match category {
                    Some(c) => print_json(&catalog::entries(&registry, Some(c))),
                    None => print_json(&catalog::grouped_addresses(&registry)),
                }
            } else {
                for entry in catalog::entries(&registry, category) {
                    println!(
                        "{:<32} {:<8} {:<18} {}",
                        entry.address,
                        format!("{:?}", entry.value_type).to_lowercase(),
                        entry.domain.to_string(),
                        entry.description
                    );
                }
            }
        }
        Commands::Help { topic } => println!("{}", catalog::help_text(&registry, topic.as_deref())),
        Commands::Schema => print_json(&catalog::to_json_schema()),
        Commands::Config { action } => match action {
            ConfigAction::Show => print_settings(&settings, raw),
            ConfigAction::Path => println!("{}", paths::settings_path(&config_dir).display()),
            ConfigAction::Set { key, value } => {
                let mut stored = settings::load_or_default(&config_dir);
                stored.set(&key, &value).unwrap_or_else(|e| fail(e));
                settings::save_settings(&config_dir, &stored).unwrap_or_else(|e| fail(e));
                print_settings(&stored, raw);
            }
        },
        Commands::Monitor { bind, count } => {
            let bind = match bind {
                Some(addr) => addr,
                None => settings.destination().await.unwrap_or_else(|e| fail(e)),
            };
            monitor(bind, count, raw).await;
        }
    }
}
