pub mod commands;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

#[derive(Parser)]
#[command(name = "geosearch")]
#[command(about = "Geosearch CLI - query the dataset registry and search directly against the databases")]
#[command(version)]
pub struct Cli {
    #[arg(long, global = true, help = "Output in human-readable text format")]
    pub text: bool,

    #[arg(long, global = true, help = "Output in JSON format")]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(about = "List searchable lookup keys")]
    Datasets(commands::datasets::DatasetsArgs),

    #[command(about = "Search around a point and print the FeatureCollection")]
    Search(commands::search::SearchArgs),

    #[command(about = "Reload catalog datasets and report the result")]
    Refresh,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
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

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let output_format = OutputFormat::from_cli(&cli);
    let config = crate::config::config();

    match cli.command {
        Commands::Datasets(args) => commands::datasets::handle(args, config, output_format).await,
        Commands::Search(args) => commands::search::handle(args, config).await,
        Commands::Refresh => commands::refresh::handle(config, output_format).await,
    }
}
