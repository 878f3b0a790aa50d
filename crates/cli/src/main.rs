// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::{Parser, Subcommand};
use tracing::error;

use frontdesk_session::config::SessionConfig;

mod commands;

#[derive(Parser)]
#[command(name = "frontdesk", about = "Session credential manager for the frontdesk API")]
struct Cli {
    #[command(flatten)]
    config: SessionConfig,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Sign in and persist the session for other frontdesk processes.
    Login {
        /// Account identity (email).
        #[arg(long, env = "FRONTDESK_IDENTITY")]
        identity: String,
        /// Account secret.
        #[arg(long, env = "FRONTDESK_SECRET", hide_env_values = true)]
        secret: String,
    },
    /// Show the current session status.
    Status {
        /// Print as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Print a valid access token, renewing it first if needed.
    Token,
    /// Hold a live session context until interrupted, printing lifecycle
    /// events and keeping the credential pair fresh.
    Run,
    /// End the session everywhere.
    Logout,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let result = match cli.command {
        Command::Login { identity, secret } => {
            commands::login(cli.config, &identity, &secret).await
        }
        Command::Status { json } => commands::status(cli.config, json).await,
        Command::Token => commands::token(cli.config).await,
        Command::Run => commands::run(cli.config).await,
        Command::Logout => commands::logout(cli.config).await,
    };

    if let Err(e) = result {
        error!("fatal: {e:#}");
        std::process::exit(1);
    }
}
