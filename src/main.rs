//! hostmap
//!
//! ```text
//!                     ┌──────────────────────────────────────────────┐
//!                     │                   hostmap                     │
//!   host, uri,        │  ┌──────────┐   ┌──────────┐   ┌───────────┐ │
//!   headers ──────────┼─▶│ security │──▶│ routing  │──▶│Resolution │─┼──▶ forwarding layer
//!                     │  │allow/deny│   │ resolver │   └───────────┘ │
//!                     │  └────▲─────┘   └────▲─────┘                 │
//!                     │       │              │                       │
//!                     │  ┌────┴─────┐   ┌────┴─────┐   ┌───────────┐ │
//!                     │  │ list file│   │ live map │◀──│ admin API │ │
//!                     │  │ watchers │   │ services/│   │  (files)  │ │
//!                     │  └──────────┘   └──────────┘   └───────────┘ │
//!                     └──────────────────────────────────────────────┘
//! ```

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use tokio::net::TcpListener;

use hostmap::admin::{self, AdminState};
use hostmap::http::Headers;
use hostmap::lifecycle::startup::StartupError;
use hostmap::lifecycle::{signals, Runtime, Shutdown};
use hostmap::observability::{logging, metrics};

#[derive(Parser)]
#[command(name = "hostmap")]
#[command(about = "Hostname-based service resolution with live configuration reload", long_about = None)]
struct Cli {
    /// Global config file.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Watch config and serve the admin API until interrupted
    Serve,
    /// Resolve one request and print the result as JSON
    Resolve {
        #[arg(long)]
        host: String,
        #[arg(long, default_value = "/")]
        uri: String,
        #[arg(long)]
        referer: Option<String>,
    },
    /// Check an address against the whitelist and blacklist
    CheckIp { address: String },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => serve(cli.config).await?,
        Commands::Resolve { host, uri, referer } => {
            let runtime = open_runtime(&cli.config, false)?;

            let headers: Headers = referer.iter().map(|r| ("Referer", r.as_str())).collect();
            let output = match runtime.resolve(Some(&host), &uri, Some(&headers)) {
                Some(resolution) => serde_json::json!({
                    "service": resolution.service().name,
                    "stripPath": resolution.strip_path(),
                    "forwardUri": resolution.forward_uri(&uri),
                    "record": resolution.service().as_ref(),
                }),
                None => serde_json::Value::Null,
            };
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        Commands::CheckIp { address } => {
            let runtime = open_runtime(&cli.config, false)?;
            match runtime.check(&address) {
                hostmap::Decision::Allow => println!("allow"),
                hostmap::Decision::Deny(reason) => println!("deny: {}", reason),
            }
        }
    }

    Ok(())
}

/// Config first, then logging, then the directory scans, so scan errors
/// reach the configured log output.
fn open_runtime(config_path: &Path, init: bool) -> Result<Runtime, StartupError> {
    let config = Runtime::read_config(config_path, init)?;
    logging::init_logging(&config.log_level, config.log_format);
    Runtime::open(config_path, config, init)
}

async fn serve(config_path: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let runtime = open_runtime(&config_path, true)?;
    let config = &runtime.config;

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "hostmap starting");

    if let Some(addr) = &config.metrics_address {
        match addr.parse::<SocketAddr>() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(metrics_address = %addr, "Failed to parse metrics address"),
        }
    }

    runtime.start_watch()?;

    let shutdown = Shutdown::new();
    let admin_task = if config.admin.enabled {
        let listener = TcpListener::bind(&config.admin.bind_address).await?;
        let state = AdminState::new(config_path.clone(), config).with_router(runtime.router.clone());
        Some(tokio::spawn(admin::serve(listener, state, shutdown.signalled())))
    } else {
        None
    };

    signals::wait_for_shutdown_signal().await;
    shutdown.trigger();

    if let Some(task) = admin_task {
        task.await??;
    }
    runtime.stop_watch();

    tracing::info!("Shutdown complete");
    Ok(())
}
