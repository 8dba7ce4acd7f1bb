use clap::Args;
use serde_json::json;

use crate::bootstrap;
use crate::cli::OutputFormat;
use crate::config::AppConfig;

#[derive(Args)]
pub struct DatasetsArgs {
    #[arg(long, help = "Comma-separated scopes to list as (default: anonymous)")]
    pub scopes: Option<String>,
}

pub async fn handle(args: DatasetsArgs, config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let services = bootstrap::services(config);
    services.registry.ensure_fresh().await?;

    let granted = super::parse_scopes(args.scopes.as_deref());
    let names = services.registry.dataset_names(granted.as_ref());

    match output_format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&json!({ "datasets": names }))?),
        OutputFormat::Text => {
            for name in names {
                println!("{}", name);
            }
        }
    }
    services.connections.close_all().await;
    Ok(())
}
