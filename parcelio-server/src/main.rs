mod auth;
mod config;
mod error;
mod page;
mod server;

use clap::{Parser, Subcommand};
use config::Config;
use server::run_server;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[derive(Parser)]
#[command(name = "parcelio")]
#[command(about = "HTTP gateway for objects stored as chunks on an external channel")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the server
    Server {
        /// Path to configuration file
        #[arg(short, long, default_value = "parcelio.yaml")]
        config: String,

        /// Override the configured listen address
        #[arg(long)]
        bind: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "parcelio=info,parcelio_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server { config, bind } => {
            tracing::info!("Starting Parcelio server with config: {}", config);

            let mut cfg = match Config::from_file(&config) {
                Ok(c) => c,
                Err(e) => {
                    tracing::error!("Failed to load config: {}", e);
                    std::process::exit(1);
                }
            };

            if let Some(bind) = bind {
                cfg.bind_addr = bind;
            }

            tracing::info!(
                "Bind: {}, Backend: {}, Channel: {}",
                cfg.bind_addr,
                cfg.backend.kind.as_str(),
                cfg.channel
            );

            if let Err(e) = run_server(cfg).await {
                tracing::error!("Server error: {:#}", e);
                std::process::exit(1);
            }
        }
    }
}
