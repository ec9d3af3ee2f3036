use clap::{Parser, Subcommand};
use eyre::Result;

mod config;
mod serve;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the enclosure control service
    Serve {
        #[arg(short, long, default_value = "config.yaml")]
        config: String,

        /// Override the configured listen port
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Parse and print the effective configuration
    Config {
        #[arg(short, long, default_value = "config.yaml")]
        config: String,
    },
}

pub fn run() -> Result<()> {
    execute_command(Cli::parse().command)
}

#[tokio::main]
pub async fn execute_command(command: Command) -> Result<()> {
    match command {
        Command::Serve { config, port } => self::serve::launch(&config, port).await,
        Command::Config { config } => self::config::read_and_print(&config).await,
    }
}
