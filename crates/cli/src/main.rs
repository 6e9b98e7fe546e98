//! Ao Dai Boutique CLI - shipping and carrier tools.
//!
//! # Usage
//!
//! ```bash
//! # Quote live shipping rates for a destination
//! aodai shipping rates --zip 10001 --city "New York" --state NY
//!
//! # Print the static fallback rate table
//! aodai shipping fallback
//!
//! # Validate an address with the carrier
//! aodai shipping validate-address --street "1 Main St" --city Austin --state TX --zip 78701
//!
//! # Check carrier credentials
//! aodai shipping check-credentials
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use aodai_core::{Address, Destination};
use clap::{Parser, Subcommand};
use rust_decimal::Decimal;

mod commands;

#[derive(Parser)]
#[command(name = "aodai")]
#[command(author, version, about = "Ao Dai Boutique CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Shipping rates and carrier tools
    Shipping {
        #[command(subcommand)]
        action: ShippingAction,
    },
}

#[derive(Subcommand)]
enum ShippingAction {
    /// Quote rates for a destination
    Rates {
        /// Destination ZIP code (5 digits, optionally ZIP+4)
        #[arg(short, long)]
        zip: String,

        /// Destination city
        #[arg(short, long)]
        city: String,

        /// Destination state (two-letter code)
        #[arg(short, long)]
        state: String,

        /// Total parcel weight in pounds
        #[arg(short, long)]
        weight: Option<Decimal>,

        /// JSON array of package items (weight, length, width, height, quantity)
        #[arg(long)]
        items: Option<String>,
    },
    /// Print the static fallback rate table
    Fallback,
    /// Validate an address with the carrier
    ValidateAddress {
        /// Street line
        #[arg(long)]
        street: String,

        /// Apartment, suite, or unit
        #[arg(long)]
        secondary: Option<String>,

        #[arg(long)]
        city: String,

        #[arg(long)]
        state: String,

        /// ZIP code (5 digits, optionally ZIP+4)
        #[arg(long)]
        zip: String,
    },
    /// Confirm the carrier accepts the configured credentials
    CheckCredentials,
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
        Commands::Shipping { action } => match action {
            ShippingAction::Rates {
                zip,
                city,
                state,
                weight,
                items,
            } => {
                let items = commands::shipping::parse_items(items.as_deref(), weight)?;
                let destination = Destination {
                    zip_code: zip,
                    city,
                    state,
                    street_address: None,
                };
                commands::shipping::rates(destination, items).await?;
            }
            ShippingAction::Fallback => commands::shipping::fallback()?,
            ShippingAction::ValidateAddress {
                street,
                secondary,
                city,
                state,
                zip,
            } => {
                let address = Address {
                    street_address: street,
                    secondary_address: secondary,
                    city,
                    state,
                    zip_code: zip,
                    zip_plus4: None,
                };
                commands::shipping::validate_address(address).await?;
            }
            ShippingAction::CheckCredentials => commands::shipping::check_credentials().await?,
        },
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_rates_command() {
        let cli = Cli::try_parse_from([
            "aodai", "shipping", "rates", "--zip", "10001", "--city", "New York", "--state", "NY",
            "--weight", "2.5",
        ])
        .ok();
        let Some(Cli {
            command:
                Commands::Shipping {
                    action: ShippingAction::Rates { zip, weight, .. },
                },
        }) = cli
        else {
            panic!("expected shipping rates command");
        };
        assert_eq!(zip, "10001");
        assert_eq!(weight, Some(Decimal::new(25, 1)));
    }
}
