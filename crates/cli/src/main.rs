//! Plateshield CLI - operator tools for the storefront service.
//!
//! # Usage
//!
//! ```bash
//! # Look up a registration (bypasses the per-client rate limit)
//! ps-cli lookup AB12CDE
//!
//! # Drop a cached vehicle record
//! ps-cli cache purge AB12CDE
//!
//! # Issue a photo token by hand and email the customer
//! ps-cli token issue --order-id 1001 --order-name "#1001" \
//!     --email driver@example.com --registration AB12CDE --make Tesla --send-email
//!
//! # Inspect or revoke a token
//! ps-cli token show <TOKEN>
//! ps-cli token revoke <TOKEN>
//!
//! # Sign a webhook body for replaying against a local server
//! ps-cli webhook sign order.json
//! ```
//!
//! The commands read the same environment as the storefront server.

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "ps-cli")]
#[command(author, version, about = "Plateshield operator tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Look up a registration, using the cache when possible
    Lookup {
        /// Vehicle registration mark
        registration: String,
    },
    /// Manage the vehicle cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Manage photo upload tokens
    Token {
        #[command(subcommand)]
        action: TokenAction,
    },
    /// Webhook helpers
    Webhook {
        #[command(subcommand)]
        action: WebhookAction,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Remove a cached vehicle record
    Purge {
        /// Vehicle registration mark
        registration: String,
    },
}

#[derive(Subcommand)]
enum TokenAction {
    /// Issue a photo token for an order
    Issue(commands::token::IssueArgs),
    /// Show the order a token was issued for
    Show {
        /// Photo upload token
        token: String,
    },
    /// Revoke a token before it is used
    Revoke {
        /// Photo upload token
        token: String,
    },
}

#[derive(Subcommand)]
enum WebhookAction {
    /// Print the HMAC signature header value for a request body
    Sign {
        /// File containing the exact request body
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "plateshield_cli=info,plateshield_storefront=warn".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Lookup { registration } => commands::vehicle::lookup(&registration).await?,
        Commands::Cache { action } => match action {
            CacheAction::Purge { registration } => {
                commands::vehicle::purge(&registration).await?;
            }
        },
        Commands::Token { action } => match action {
            TokenAction::Issue(args) => commands::token::issue(args).await?,
            TokenAction::Show { token } => commands::token::show(&token).await?,
            TokenAction::Revoke { token } => commands::token::revoke(&token).await?,
        },
        Commands::Webhook { action } => match action {
            WebhookAction::Sign { file } => commands::webhook::sign(&file)?,
        },
    }
    Ok(())
}
