use std::io::Write;

use clap::{Parser, Subcommand};
use tracing::error;
use tracing_subscriber::EnvFilter;

use margin_sim::api::{ProjectionArgs, run_http_server, run_projection_command};
use margin_sim::config::{ServeArgs, ServerConfig};
use margin_sim::core::DEFAULT_MAX_PERIODS;

#[derive(Parser, Debug)]
#[command(
    name = "margin-sim",
    about = "Compounding net-margin projection behind a login form"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Serve the web form and JSON API
    Serve(ServeArgs),
    /// Run one projection and print the ledger
    Project {
        #[command(flatten)]
        projection: ProjectionArgs,
        #[arg(long, default_value_t = DEFAULT_MAX_PERIODS)]
        max_periods: u32,
        #[arg(long, help = "Print CSV instead of a text table")]
        csv: bool,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            let config = match ServerConfig::from_args(args) {
                Ok(config) => config,
                Err(e) => {
                    error!("Invalid configuration: {e}");
                    std::process::exit(2);
                }
            };
            if let Err(e) = run_http_server(config).await {
                error!("Server error: {e}");
                std::process::exit(1);
            }
        }
        Command::Project {
            projection,
            max_periods,
            csv,
        } => match run_projection_command(projection, max_periods, csv) {
            Ok(output) => {
                if let Err(e) = std::io::stdout().write_all(&output) {
                    error!("Failed to write output: {e}");
                    std::process::exit(1);
                }
            }
            Err(e) => {
                error!("{e}");
                std::process::exit(1);
            }
        },
    }
}
