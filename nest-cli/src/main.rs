//! Command-line front end for the Nest API client.
//!
//! Usage:
//! ```bash
//! # Print the URL users authorize this client on
//! OAUTH2_CLIENT_ID=... nest auth-url my-state
//!
//! # Exchange the PIN shown after authorization for an access token
//! OAUTH2_CLIENT_ID=... OAUTH2_CLIENT_SECRET=... nest exchange PIN1234
//!
//! # Read and write resources
//! nest read --token c.abc /devices/thermostats
//! nest write --token c.abc /devices/thermostats/t1 '{"target_temperature_c": 21}'
//!
//! # Revoke an access token
//! nest revoke c.abc
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand};
use nest_api::OAuth2Client;
use nest_api::RestApiClient;
use nest_api::config::ApiConfig;
use serde::Serialize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Parser)]
#[command(name = "nest", about = "Nest API client", version)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the OAuth2 authorization URL
    AuthUrl { state: String },
    /// Exchange an authorization code for an access token
    Exchange { code: String },
    /// Revoke an access token
    Revoke { token: String },
    /// Read the resource at a path
    Read {
        #[arg(long, env = "NEST_ACCESS_TOKEN")]
        token: String,
        path: String,
    },
    /// Write a JSON document to the resource at a path
    Write {
        #[arg(long, env = "NEST_ACCESS_TOKEN")]
        token: String,
        path: String,
        #[arg(value_parser = parse_json)]
        data: serde_json::Value,
    },
}

fn parse_json(value: &str) -> Result<serde_json::Value, String> {
    serde_json::from_str(value).map_err(|err| format!("invalid JSON: {err}"))
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    let output = serde_json::to_string_pretty(value).context("Failed to serialize result")?;
    println!("{output}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nest_api=info,nest=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = ApiConfig::parse()?;
    tracing::debug!(?config, "Loaded config");

    match cli.command {
        Command::AuthUrl { state } => {
            let url = OAuth2Client::from_env()?
                .with_config(&config)
                .generate_authorization_url(&state)?;
            println!("{url}");
        }
        Command::Exchange { code } => {
            let result = OAuth2Client::from_env()?
                .with_config(&config)
                .exchange_code_for_token(&code)
                .await?;
            print_json(&result)?;
        }
        Command::Revoke { token } => {
            let result = OAuth2Client::from_env()?
                .with_config(&config)
                .revoke_token(&token)
                .await?;
            print_json(&result)?;
        }
        Command::Read { token, path } => {
            let client = RestApiClient::builder(token).with_config(&config).build()?;
            print_json(&client.read(&path).await?)?;
        }
        Command::Write { token, path, data } => {
            let client = RestApiClient::builder(token).with_config(&config).build()?;
            print_json(&client.write(&path, &data).await?)?;
        }
    }

    Ok(())
}
