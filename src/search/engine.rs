//! Fan-out: one search request, many descriptors, one merged stream.

use futures::stream::{self, BoxStream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

use super::source::FeatureSource;
use crate::auth::AuthorizationContext;
use crate::config::SearchConfig;
use crate::error::ApiError;
use crate::query::{ExtraFilter, QueryDescriptor, SpatialQuery};
use crate::registry::DatasetRegistry;
use crate::types::{Feature, QueryPoint};

/// Features in arrival order across all queried descriptors.
pub type FeatureStream = BoxStream<'static, Feature>;

/// Dataset the `monumenttype` parameter applies to.
const MONUMENTEN: &str = "monumenten";

/// A parsed search request, independent of how it arrived.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchRequest {
    pub point: QueryPoint,
    pub radius: Option<f64>,
    pub limit: Option<i64>,
    /// Lookup keys; empty means the configured defaults.
    pub datasets: Vec<String>,
    pub extra_fields: Vec<String>,
    pub monumenttype: Option<String>,
}

impl SearchRequest {
    pub fn new(point: QueryPoint) -> Self {
        Self {
            point,
            radius: None,
            limit: None,
            datasets: Vec::new(),
            extra_fields: Vec::new(),
            monumenttype: None,
        }
    }
}

pub struct SearchEngine {
    registry: Arc<DatasetRegistry>,
    source: Arc<dyn FeatureSource>,
    workers: usize,
    timeout: Duration,
    default_datasets: Vec<String>,
}

impl SearchEngine {
    pub fn new(registry: Arc<DatasetRegistry>, source: Arc<dyn FeatureSource>, workers: usize, timeout: Duration) -> Self {
        Self { registry, source, workers: workers.max(1), timeout, default_datasets: Vec::new() }
    }

    pub fn from_config(registry: Arc<DatasetRegistry>, source: Arc<dyn FeatureSource>, config: &SearchConfig) -> Self {
        Self::new(registry, source, config.workers, Duration::from_millis(config.timeout_ms))
            .with_default_datasets(config.default_datasets.clone())
    }

    pub fn with_default_datasets(mut self, datasets: Vec<String>) -> Self {
        self.default_datasets = datasets;
        self
    }

    pub fn registry(&self) -> &Arc<DatasetRegistry> {
        &self.registry
    }

    /// Descriptors `auth` may query for `names`. Unknown names are an input error;
    /// names the caller may not see are dropped silently.
    pub fn resolve(&self, names: &[String], auth: &AuthorizationContext) -> Result<Vec<Arc<QueryDescriptor>>, ApiError> {
        let names = if names.is_empty() { &self.default_datasets[..] } else { names };
        let snapshot = self.registry.snapshot();
        let unknown = snapshot.unknown(names);
        if !unknown.is_empty() {
            return Err(ApiError::bad_request(format!("Unknown dataset: {}", unknown.join(","))));
        }
        Ok(snapshot.resolve(names, auth.granted()))
    }

    /// Query every matching descriptor concurrently. Failed or slow descriptors
    /// are logged and contribute nothing.
    pub fn search(&self, request: SearchRequest, auth: AuthorizationContext) -> Result<FeatureStream, ApiError> {
        if !request.point.is_finite() {
            return Err(ApiError::bad_request("No coordinates found"));
        }
        if let Some(radius) = request.radius {
            if !radius.is_finite() || radius < 0.0 {
                return Err(ApiError::bad_request(format!("Invalid radius: {}", radius)));
            }
        }
        if let Some(limit) = request.limit {
            if limit < 1 {
                return Err(ApiError::bad_request(format!("Invalid limit: {}", limit)));
            }
        }

        let descriptors = self.resolve(&request.datasets, &auth)?;
        let jobs = plan(&request, descriptors)?;
        debug!("Searching {} datasets with {} workers", jobs.len(), self.workers);

        let source = Arc::clone(&self.source);
        let timeout = self.timeout;
        let auth = Arc::new(auth);

        Ok(stream::iter(jobs)
            .map(move |(descriptor, query)| {
                let source = Arc::clone(&source);
                let auth = Arc::clone(&auth);
                async move {
                    let ident = descriptor.table_ident();
                    match tokio::time::timeout(timeout, source.fetch(&descriptor, &query, &auth)).await {
                        Ok(Ok(features)) => {
                            debug!("{} returned {} features", ident, features.len());
                            features
                        }
                        Ok(Err(e)) => {
                            error!("Query for {} failed: {}", ident, e);
                            Vec::new()
                        }
                        Err(_) => {
                            error!("Query for {} timed out after {:?}", ident, timeout);
                            Vec::new()
                        }
                    }
                }
            })
            .buffer_unordered(self.workers)
            .flat_map(stream::iter)
            .boxed())
    }
}

/// Pair each descriptor with its own query. Extra fields go only to descriptors
/// that allow them; a field no descriptor allows is rejected.
fn plan(
    request: &SearchRequest,
    descriptors: Vec<Arc<QueryDescriptor>>,
) -> Result<Vec<(Arc<QueryDescriptor>, SpatialQuery)>, ApiError> {
    let fields: Vec<String> = request
        .extra_fields
        .iter()
        .map(|f| f.trim().to_string())
        .filter(|f| !f.is_empty())
        .collect();
    if descriptors.is_empty() {
        return Ok(Vec::new());
    }
    if let Some(field) = fields.iter().find(|f| !descriptors.iter().any(|d| allows(d, f))) {
        return Err(ApiError::bad_request(format!("Unknown field: {}", field)));
    }

    let monument_filter = request.monumenttype.as_deref().and_then(|value| {
        let filter = ExtraFilter::monument_type(value);
        if filter.is_none() {
            warn!("Ignoring invalid monumenttype {:?}", value);
        }
        filter
    });

    let base = SpatialQuery::new(request.point)
        .with_radius(request.radius)
        .with_limit(request.limit);

    Ok(descriptors
        .into_iter()
        .map(|descriptor| {
            let mut query = base.clone();
            query.extra_fields = fields.iter().filter(|f| allows(&descriptor, f)).cloned().collect();
            if descriptor.dataset_name == MONUMENTEN {
                query.extra_filter = monument_filter.clone();
            }
            (descriptor, query)
        })
        .collect())
}

fn allows(descriptor: &QueryDescriptor, field: &str) -> bool {
    descriptor.extra_fields.contains(&crate::query::ident::to_snake_case(field))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::DatabaseError;
    use crate::query::Operator;
    use crate::search::DatasourceError;

    fn descriptor(dataset: &str, table: &str) -> Arc<QueryDescriptor> {
        Arc::new(QueryDescriptor::new(dataset, table, ("public", table), "geometrie", Operator::Within, "DSN_TEST"))
    }

    fn request() -> SearchRequest {
        SearchRequest::new(QueryPoint::Projected { x: 123_282.6, y: 487_674.8 })
    }

    #[test]
    fn extra_fields_are_routed_per_descriptor() {
        let with_field = Arc::new(
            QueryDescriptor::new("fake", "fake_public", ("public", "fake_public"), "geometry", Operator::Within, "DSN_TEST")
                .with_extra_fields(["naam_code"]),
        );
        let mut request = request();
        request.extra_fields = vec!["naamCode".into(), " ".into()];

        let jobs = plan(&request, vec![with_field, descriptor("nap", "peilmerk")]).unwrap();
        assert_eq!(jobs[0].1.extra_fields, vec!["naamCode"]);
        assert!(jobs[1].1.extra_fields.is_empty());
    }

    #[test]
    fn field_allowed_nowhere_is_rejected() {
        let mut request = request();
        request.extra_fields = vec!["password".into()];
        let err = plan(&request, vec![descriptor("nap", "peilmerk")]).unwrap_err();
        assert_eq!(err.status_code(), 400);
    }

    #[test]
    fn monument_filter_only_applies_to_monumenten() {
        let mut request = request();
        request.monumenttype = Some("isnot_pand".into());
        let jobs = plan(&request, vec![descriptor("monumenten", "monument"), descriptor("nap", "peilmerk")]).unwrap();
        assert!(jobs[0].1.extra_filter.is_some());
        assert!(jobs[1].1.extra_filter.is_none());

        request.monumenttype = Some("is_kasteel".into());
        let jobs = plan(&request, vec![descriptor("monumenten", "monument")]).unwrap();
        assert!(jobs[0].1.extra_filter.is_none());
    }

    /// Refuses every descriptor that needs an end-user role.
    struct RoleDenyingSource;

    #[async_trait::async_trait]
    impl FeatureSource for RoleDenyingSource {
        async fn fetch(
            &self,
            descriptor: &QueryDescriptor,
            _query: &SpatialQuery,
            _auth: &AuthorizationContext,
        ) -> Result<Vec<Feature>, DatasourceError> {
            if descriptor.requires_role_switch {
                return Err(DatabaseError::PermissionDenied("User x@example.com is not available in database".into()).into());
            }
            Ok(vec![Feature::new(serde_json::Map::new())])
        }
    }

    #[tokio::test]
    async fn role_denial_only_drops_that_dataset() {
        let registry = Arc::new(DatasetRegistry::new(Vec::new(), "https://api.data.amsterdam.nl/", Duration::from_secs(300)));
        registry.register_static(
            QueryDescriptor::new("fake", "fake_secret", ("public", "fake_secret"), "geometry", Operator::Within, "DSN_TEST")
                .with_role_switch(true),
        );
        registry.register_static(
            QueryDescriptor::new("fake", "fake_public", ("public", "fake_public"), "geometry", Operator::Within, "DSN_TEST"),
        );
        registry.ensure_fresh().await.unwrap();

        let engine = SearchEngine::new(registry, Arc::new(RoleDenyingSource), 2, Duration::from_secs(1));
        let mut request = request();
        request.datasets = vec!["fake".into()];
        let features: Vec<Feature> = engine.search(request, AuthorizationContext::anonymous()).unwrap().collect().await;
        assert_eq!(features.len(), 1);
    }

    #[test]
    fn request_values_reach_every_query() {
        let mut request = request();
        request.radius = Some(100.0);
        request.limit = Some(5);
        let jobs = plan(&request, vec![descriptor("nap", "peilmerk")]).unwrap();
        assert_eq!(jobs[0].1.radius, Some(100.0));
        assert_eq!(jobs[0].1.limit, Some(5));
        assert_eq!(jobs[0].1.point, request.point);
    }
}
