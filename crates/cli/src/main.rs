//! Wildflower CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run gift-card database migrations
//! wf-cli migrate
//!
//! # Issue a demo card and print its redemption link
//! wf-cli seed --amount-cents 20000 --purchaser-email dana@example.com
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `seed` - Issue a demo gift card for local testing

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "wf-cli")]
#[command(author, version, about = "Wildflower CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run gift-card database migrations
    Migrate,
    /// Issue a demo gift card and print its code and redemption link
    Seed {
        /// Face value in cents
        #[arg(long, default_value_t = 20_000)]
        amount_cents: i64,

        /// Purchaser email
        #[arg(long, default_value = "dana@example.com")]
        purchaser_email: String,

        /// Recipient email to bind the card to
        #[arg(long)]
        recipient_email: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Seed {
            amount_cents,
            purchaser_email,
            recipient_email,
        } => {
            commands::seed::run(amount_cents, &purchaser_email, recipient_email.as_deref())
                .await?;
        }
    }
    Ok(())
}
