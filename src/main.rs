use anyhow::Result;
use clap::{Parser, Subcommand};
use retail_authz_core::{config::Config, migration, server, telemetry};
use tracing::info;

#[derive(Parser)]
#[command(name = "retail-authz-core", version, about)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Apply database migrations and exit
    Migrate,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;
    let prometheus = telemetry::init(&config.telemetry)?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Migrate => migration::run_migrations(&config).await,
        Command::Serve => {
            info!("Starting Retail Authz Core");
            info!("HTTP server listening on {}", config.http_addr());
            server::run(config, prometheus).await
        }
    }
}
