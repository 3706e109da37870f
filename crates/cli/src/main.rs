//! Zentro CLI - migrations and catalog management.
//!
//! # Commands
//!
//! - `migrate` - apply the server's SQL migrations
//! - `seed` - insert the demo product catalog (idempotent)

#![cfg_attr(not(test), forbid(unsafe_code))]

mod commands;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "zentro-cli", about = "Zentro management tools", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Apply database migrations
    Migrate,
    /// Seed the product catalog
    Seed,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "zentro=info".into());
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let cli = Cli::parse();
    let result = match cli.command {
        Command::Migrate => commands::migrate::run().await,
        Command::Seed => commands::seed::run().await,
    };

    if let Err(err) = result {
        tracing::error!("command failed: {err}");
        std::process::exit(1);
    }
}
