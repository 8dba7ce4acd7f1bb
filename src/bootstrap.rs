//! Wiring shared by the server and the CLI.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::auth::{KeySet, TokenVerifier};
use crate::config::AppConfig;
use crate::database::{ConnectionManager, RolePolicy};
use crate::handlers::{AppState, HealthCheck};
use crate::registry::catalog::{DATASERVICES_CONNECTION, VSD_CONNECTION};
use crate::registry::{builtin_descriptors, CatalogSource, DatasetRegistry, PgCatalog};
use crate::search::{PgFeatureSource, SearchEngine};

pub struct Services {
    pub connections: Arc<ConnectionManager>,
    pub registry: Arc<DatasetRegistry>,
    pub engine: Arc<SearchEngine>,
}

/// Connection cache, registry (with every built-in dataset whose database is
/// configured) and search engine, all backed by PostgreSQL.
pub fn services(config: &AppConfig) -> Services {
    let connections = Arc::new(ConnectionManager::from_config(&config.database));
    let dsn = |key: &str| config.database.dsn(key).map(str::to_string);

    let catalog: Arc<dyn CatalogSource> = Arc::new(PgCatalog::new(
        connections.clone(),
        dsn(VSD_CONNECTION),
        dsn(DATASERVICES_CONNECTION),
    ));
    let registry = Arc::new(
        DatasetRegistry::new(
            vec![catalog],
            config.registry.api_base_url.as_str(),
            Duration::from_secs(config.registry.refresh_delay_secs),
        )
        .with_default_radius(config.search.default_radius),
    );

    for descriptor in builtin_descriptors(&config.registry.api_base_url) {
        if config.database.dsn(&descriptor.connection_key).is_some() {
            registry.register_static(descriptor);
        } else {
            debug!("Skipping {}: {} not configured", descriptor.table_ident(), descriptor.connection_key);
        }
    }
    info!("Registered {} built-in datasets", registry.snapshot().len());

    let source = PgFeatureSource::new(
        connections.clone(),
        config.database.dsns.clone(),
        RolePolicy::from_config(&config.database),
    );
    let engine = Arc::new(SearchEngine::from_config(registry.clone(), Arc::new(source), &config.search));

    Services { connections, registry, engine }
}

/// Everything the HTTP layer needs, including the verified key set.
pub async fn app_state(config: &AppConfig) -> anyhow::Result<AppState> {
    let services = services(config);
    let keys = KeySet::from_sources(config.security.jwks.as_deref(), config.security.jwks_url.as_deref()).await?;
    let verifier = TokenVerifier::new(keys, &config.security.allowed_algorithms);
    info!("Loaded {} signing keys", verifier.key_count());

    Ok(AppState {
        engine: services.engine,
        verifier: Arc::new(verifier),
        health: Arc::new(HealthCheck::new(services.connections, config.database.dsns.clone())),
        enable_cors: config.server.enable_cors,
    })
}
