//! Executing one descriptor's query against its database.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

use crate::auth::AuthorizationContext;
use crate::database::row::row_properties;
use crate::database::{
    retry_on_transient_error, ConnectionManager, DatabaseConnection, DatabaseError, EndUserSession, Retryable,
    RetryPolicy, RolePolicy,
};
use crate::query::{bind_param, build, output_properties, QueryDescriptor, QueryError, SpatialQuery, SqlResult};
use crate::types::Feature;

/// Why one descriptor contributed no features.
#[derive(Debug, Error)]
pub enum DatasourceError {
    #[error("No database configured for {0}")]
    NotConfigured(String),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl Retryable for DatasourceError {
    fn is_transient(&self) -> bool {
        match self {
            DatasourceError::Database(e) => e.is_transient(),
            _ => false,
        }
    }
}

/// Runs a descriptor's query and returns its rows as features.
#[async_trait]
pub trait FeatureSource: Send + Sync {
    async fn fetch(
        &self,
        descriptor: &QueryDescriptor,
        query: &SpatialQuery,
        auth: &AuthorizationContext,
    ) -> Result<Vec<Feature>, DatasourceError>;
}

/// PostgreSQL-backed [`FeatureSource`].
pub struct PgFeatureSource {
    connections: Arc<ConnectionManager>,
    dsns: BTreeMap<String, String>,
    roles: RolePolicy,
    retry: RetryPolicy,
}

impl PgFeatureSource {
    pub fn new(connections: Arc<ConnectionManager>, dsns: BTreeMap<String, String>, roles: RolePolicy) -> Self {
        Self { connections, dsns, roles, retry: RetryPolicy::default() }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    async fn run(
        &self,
        conn: &DatabaseConnection,
        descriptor: &QueryDescriptor,
        sql: &SqlResult,
        properties: &[String],
        auth: &AuthorizationContext,
    ) -> Result<Vec<Feature>, DatabaseError> {
        let mut session = EndUserSession::begin(conn).await?;
        if self.roles.applies_to(descriptor.requires_role_switch) {
            session.activate(auth, &self.roles).await?;
        }

        let query = sql
            .params
            .iter()
            .fold(sqlx::query(&sql.query), |query, param| bind_param(query, param));
        let rows = query.fetch_all(session.connection()?).await?;
        session.release().await?;

        Ok(rows.iter().map(|row| Feature::new(row_properties(row, properties))).collect())
    }
}

#[async_trait]
impl FeatureSource for PgFeatureSource {
    async fn fetch(
        &self,
        descriptor: &QueryDescriptor,
        query: &SpatialQuery,
        auth: &AuthorizationContext,
    ) -> Result<Vec<Feature>, DatasourceError> {
        let dsn = self
            .dsns
            .get(&descriptor.connection_key)
            .ok_or_else(|| DatasourceError::NotConfigured(descriptor.connection_key.clone()))?;
        let sql = build(descriptor, query)?;
        let properties = output_properties(descriptor, query)?;
        let handle = self.connections.get(dsn);
        let ident = descriptor.table_ident();

        debug!("Querying {} with {} params", ident, sql.params.len());
        let (conn, sql, properties) = (handle.as_ref(), &sql, properties.as_slice());
        let features = retry_on_transient_error(&self.retry, &ident, || async move {
            conn.observe(self.run(conn, descriptor, sql, properties, auth).await)
        })
        .await?;
        Ok(features)
    }
}
