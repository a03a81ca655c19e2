pub mod client;
pub mod commands;
pub mod utils;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::config::config;

#[derive(Parser)]
#[command(name = "table-actions")]
#[command(about = "Table Actions CLI - manage versioned action handlers and run them locally")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[arg(
        long,
        global = true,
        env = "ACTIONS_SERVER_URL",
        help = "Handler store base URL (default http://localhost:<configured port>)"
    )]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "Handler store administration")]
    Handlers {
        #[command(subcommand)]
        cmd: commands::handlers::HandlersCommands,
    },

    #[command(about = "Pull handler definitions into a local runtime and show what was registered")]
    Sync(commands::sync::SyncArgs),

    #[command(about = "Execute an action against a row")]
    Run(commands::run::RunArgs),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    pub fn from_cli(cli: &Cli) -> Self {
        if cli.json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

impl Cli {
    pub fn server_url(&self) -> String {
        self.server
            .clone()
            .unwrap_or_else(|| format!("http://localhost:{}", config().server.port))
            .trim_end_matches('/')
            .to_string()
    }
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let server = cli.server_url();

    match cli.command {
        Commands::Handlers { cmd } => commands::handlers::handle(cmd, &server, output_format).await,
        Commands::Sync(args) => commands::sync::handle(args, &server, output_format).await,
        Commands::Run(args) => commands::run::handle(args, &server, output_format).await,
    }
}
