mod cli;
mod commands;
mod output;

use anyhow::Result;
use clap::Parser;
use cli::{Cli, Command};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, ephemeral, store_path, auto_connect_cap, admin_password } => {
            commands::serve(config, ephemeral, store_path, auto_connect_cap, admin_password).await
        }
        Command::Label { command } => commands::label(command, cli.remote, cli.user, cli.password).await,
        Command::Application { command } => commands::application(command, cli.remote, cli.user, cli.password).await,
        Command::Node { command } => commands::node(command, cli.remote, cli.user, cli.password).await,
        Command::Status => commands::status(cli.remote, cli.user, cli.password).await,
    }
}
