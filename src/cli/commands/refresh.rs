use serde_json::json;

use crate::bootstrap;
use crate::cli::OutputFormat;
use crate::config::AppConfig;

pub async fn handle(config: &AppConfig, output_format: OutputFormat) -> anyhow::Result<()> {
    let services = bootstrap::services(config);
    let builtin = services.registry.snapshot().len();
    services.registry.force_refresh().await?;
    let total = services.registry.snapshot().len();

    match output_format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({ "builtin": builtin, "catalog": total.saturating_sub(builtin), "total": total }))?
        ),
        OutputFormat::Text => println!("Loaded {} datasets ({} built-in, {} from catalog)", total, builtin, total.saturating_sub(builtin)),
    }
    services.connections.close_all().await;
    Ok(())
}
