//! `pwreset` - issue a new directory password for an email address.
//!
//! Reads the directory configuration from `PWRESET_*` environment variables (a `.env` file is
//! honoured), performs one reset and prints the response as JSON on stdout. Logs go to stderr.

use std::io::Read;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use validator::Validate;

use pwreset_core::config::DirectoryConfig;
use pwreset_core::types::ResetRequest;
use pwreset_ldap::PasswordResetService;

/// Self-service password reset against an LDAP / Active Directory server.
#[derive(Debug, Parser)]
#[command(name = "pwreset", version, about)]
struct Cli {
    /// Email address of the account. When omitted, a JSON request such as
    /// `{"email":"john@example.com"}` is read from stdin.
    email: Option<String>,

    /// Enable debug logging (overrides RUST_LOG)
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::from(2)
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<ExitCode> {
    let request = match cli.email {
        Some(email) => ResetRequest::new(email),
        None => read_request()?,
    };
    request
        .validate()
        .context("the email address is not valid")?;

    let config = DirectoryConfig::from_env().context("failed to load directory configuration")?;
    tracing::debug!("Configuration loaded");
    let service = PasswordResetService::new(Arc::new(config))?;

    let response = service.handle(&request).await;
    println!("{}", serde_json::to_string(&response)?);

    Ok(if response.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn read_request() -> anyhow::Result<ResetRequest> {
    let mut body = String::new();
    std::io::stdin()
        .read_to_string(&mut body)
        .context("failed to read the request from stdin")?;
    serde_json::from_str(&body).context("stdin is not a valid reset request")
}

/// Initialize tracing subscriber
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        "debug".to_string()
    } else {
        std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string())
    };

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::new(filter))
        .init();
}
