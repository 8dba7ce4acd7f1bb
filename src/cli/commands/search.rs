use anyhow::bail;
use clap::Args;
use futures::StreamExt;
use std::io::Write;

use crate::auth::AuthorizationContext;
use crate::bootstrap;
use crate::config::AppConfig;
use crate::search::{feature_collection_body, SearchRequest};
use crate::types::QueryPoint;

#[derive(Args)]
pub struct SearchArgs {
    #[arg(long, help = "Projected x coordinate (RD)", requires = "y")]
    pub x: Option<f64>,
    #[arg(long, help = "Projected y coordinate (RD)", requires = "x")]
    pub y: Option<f64>,
    #[arg(long, help = "Latitude (WGS84)", requires = "lon", conflicts_with = "x")]
    pub lat: Option<f64>,
    #[arg(long, help = "Longitude (WGS84)", requires = "lat", conflicts_with = "y")]
    pub lon: Option<f64>,
    #[arg(long, help = "Search radius in meters")]
    pub radius: Option<f64>,
    #[arg(long, help = "Maximum results per point dataset")]
    pub limit: Option<i64>,
    #[arg(long, value_delimiter = ',', help = "Comma-separated lookup keys")]
    pub datasets: Vec<String>,
    #[arg(long, value_delimiter = ',', help = "Comma-separated extra fields")]
    pub fields: Vec<String>,
    #[arg(long, help = "Monument type filter, e.g. is_pand_bouwwerk")]
    pub monumenttype: Option<String>,
    #[arg(long, help = "Comma-separated scopes to search as (default: anonymous)")]
    pub scopes: Option<String>,
}

impl SearchArgs {
    fn point(&self) -> Option<QueryPoint> {
        match (self.x, self.y, self.lat, self.lon) {
            (Some(x), Some(y), _, _) => Some(QueryPoint::Projected { x, y }),
            (_, _, Some(lat), Some(lon)) => Some(QueryPoint::Geographic { lat, lon }),
            _ => None,
        }
    }

    fn request(&self) -> anyhow::Result<SearchRequest> {
        let Some(point) = self.point() else {
            bail!("No coordinates found");
        };
        let mut request = SearchRequest::new(point);
        request.radius = self.radius;
        request.limit = self.limit;
        request.datasets = self.datasets.clone();
        request.extra_fields = self.fields.clone();
        request.monumenttype = self.monumenttype.clone();
        Ok(request)
    }

    fn auth(&self) -> AuthorizationContext {
        match super::parse_scopes(self.scopes.as_deref()) {
            Some(scopes) => AuthorizationContext::authenticated(None, None, scopes),
            None => AuthorizationContext::anonymous(),
        }
    }
}

pub async fn handle(args: SearchArgs, config: &AppConfig) -> anyhow::Result<()> {
    let request = args.request()?;
    let services = bootstrap::services(config);
    services.registry.ensure_fresh().await?;

    let features = services.engine.search(request, args.auth())?;
    let mut body = Box::pin(feature_collection_body(features));
    let mut stdout = std::io::stdout().lock();
    while let Some(chunk) = body.next().await {
        stdout.write_all(&chunk?)?;
    }
    writeln!(stdout)?;
    services.connections.close_all().await;
    Ok(())
}
