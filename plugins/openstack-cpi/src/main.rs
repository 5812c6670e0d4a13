//! OpenStack CPI
//!
//! Reads one CPI request from stdin, runs it against OpenStack and writes the
//! response envelope to stdout. Logs go to stderr so stdout carries nothing
//! but the response.
//!
//! Configuration is a JSON file passed with `--configFile` or through the
//! `OPENSTACK_CPI_CONFIG` environment variable. Log verbosity follows
//! `RUST_LOG` (default `info`).

mod cpi;
mod dispatcher;
mod error;
mod methods;
mod rpc;

use anyhow::Context;
use clap::Parser;
use cpi_core::CpiConfig;
use error::MethodError;
use rpc::{Request, Response};
use std::io::{Read, Write};
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "openstack-cpi", version, about = "BOSH CPI for OpenStack")]
struct Cli {
    /// Path to the CPI configuration file
    #[arg(long = "configFile", visible_alias = "config-file", env = "OPENSTACK_CPI_CONFIG")]
    config_file: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut input = String::new();
    std::io::stdin()
        .read_to_string(&mut input)
        .context("failed to read request from stdin")?;

    let response = respond(&cli, &input).await;

    let mut stdout = std::io::stdout().lock();
    serde_json::to_writer(&mut stdout, &response).context("failed to write response")?;
    writeln!(stdout).context("failed to write response")?;
    Ok(())
}

async fn respond(cli: &Cli, input: &str) -> Response {
    let request: Request = match serde_json::from_str(input) {
        Ok(request) => request,
        Err(e) => {
            error!("Failed to parse request: {}", e);
            return MethodError::InvalidArguments(format!("malformed request: {}", e)).to_response();
        }
    };

    let config = match CpiConfig::from_file(&cli.config_file) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load config {}: {}", cli.config_file.display(), e);
            return MethodError::from(e).to_response();
        }
    };

    info!("Handling '{}'", request.method);
    dispatcher::handle(&request, &config).await
}
