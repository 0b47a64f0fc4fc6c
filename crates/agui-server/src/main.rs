mod bootstrap_helpers;
mod provider_client;

use anyhow::Result;
use clap::Parser;

use agui_cli::Cli;
use agui_gateway::run_agui_server;

use crate::bootstrap_helpers::init_tracing;
use crate::provider_client::build_server_config;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = build_server_config(&cli)?;
    run_agui_server(config).await
}
