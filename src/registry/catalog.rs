//! Catalog ingestion: metadata rows in, query descriptors out.

use async_trait::async_trait;
use serde_json::Value;
use sqlx::Row;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::warn;

use super::schema::TableSchema;
use super::RegistryError;
use crate::database::ConnectionManager;
use crate::query::ident::to_snake_case;
use crate::query::{Operator, QueryDescriptor};

pub const VSD_CONNECTION: &str = "DSN_VARIOUS_SMALL_DATASETS";
pub const DATASERVICES_CONNECTION: &str = "DSN_DATASERVICES_DATASETS";

const VSD_SQL: &str = "
    SELECT
        name,
        name_field,
        schema,
        table_name,
        geometry_type,
        geometry_field,
        pk_field AS id_field,
        'vsd' AS dataset_name
    FROM cat_dataset
    WHERE enable_geosearch = true";

const DATASERVICES_SQL: &str = "
    SELECT
        dt.name,
        dt.display_field AS name_field,
        dt.db_table AS table_name,
        dt.geometry_field_type AS geometry_type,
        dt.geometry_field,
        'id' AS id_field,
        d.name AS dataset_name,
        d.auth AS dataset_authorization,
        dt.auth AS datasettable_authorization,
        d.schema_data::text AS schema_data
    FROM datasets_datasettable dt
    LEFT JOIN datasets_dataset d
      ON dt.dataset_id = d.id
    WHERE d.enable_api = true AND dt.enable_geosearch = true";

/// Which metadata store a row came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CatalogKind {
    /// `cat_dataset` in the various-small-datasets database.
    VariousSmallDatasets,
    /// `datasets_dataset` / `datasets_datasettable` in the dataservices database.
    Dataservices,
}

impl CatalogKind {
    pub fn connection_key(self) -> &'static str {
        match self {
            CatalogKind::VariousSmallDatasets => VSD_CONNECTION,
            CatalogKind::Dataservices => DATASERVICES_CONNECTION,
        }
    }
}

/// One dataset table as described by catalog metadata. Every attribute may be missing.
#[derive(Debug, Clone, PartialEq)]
pub struct CatalogRow {
    pub kind: CatalogKind,
    pub name: Option<String>,
    pub name_field: Option<String>,
    pub schema: Option<String>,
    pub table_name: Option<String>,
    pub geometry_type: Option<String>,
    pub geometry_field: Option<String>,
    pub id_field: Option<String>,
    pub dataset_name: Option<String>,
    pub dataset_authorization: Option<String>,
    pub table_authorization: Option<String>,
    pub schema_data: Option<Value>,
}

impl CatalogRow {
    pub fn new(kind: CatalogKind) -> Self {
        Self {
            kind,
            name: None,
            name_field: None,
            schema: None,
            table_name: None,
            geometry_type: None,
            geometry_field: None,
            id_field: None,
            dataset_name: None,
            dataset_authorization: None,
            table_authorization: None,
            schema_data: None,
        }
    }
}

/// Somewhere catalog rows come from.
#[async_trait]
pub trait CatalogSource: Send + Sync {
    async fn fetch_rows(&self) -> Result<Vec<CatalogRow>, RegistryError>;
}

/// Reads both PostgreSQL metadata stores. A store without a configured DSN is skipped.
pub struct PgCatalog {
    connections: Arc<ConnectionManager>,
    vsd_dsn: Option<String>,
    dataservices_dsn: Option<String>,
}

impl PgCatalog {
    pub fn new(connections: Arc<ConnectionManager>, vsd_dsn: Option<String>, dataservices_dsn: Option<String>) -> Self {
        Self { connections, vsd_dsn, dataservices_dsn }
    }

    async fn fetch(&self, dsn: &str, sql: &str, kind: CatalogKind) -> Result<Vec<CatalogRow>, RegistryError> {
        let conn = self.connections.get(dsn);
        let pool = conn.pool().await.map_err(|e| RegistryError::Catalog(e.to_string()))?;
        let rows = sqlx::query(sql).fetch_all(&pool).await.map_err(|e| {
            conn.mark_failed();
            RegistryError::Catalog(e.to_string())
        })?;

        Ok(rows
            .iter()
            .map(|row| {
                let text = |column: &str| row.try_get::<Option<String>, _>(column).ok().flatten();
                CatalogRow {
                    kind,
                    name: text("name"),
                    name_field: text("name_field"),
                    schema: text("schema"),
                    table_name: text("table_name"),
                    geometry_type: text("geometry_type"),
                    geometry_field: text("geometry_field"),
                    id_field: text("id_field"),
                    dataset_name: text("dataset_name"),
                    dataset_authorization: text("dataset_authorization"),
                    table_authorization: text("datasettable_authorization"),
                    schema_data: text("schema_data").and_then(|s| serde_json::from_str(&s).ok()),
                }
            })
            .collect())
    }
}

#[async_trait]
impl CatalogSource for PgCatalog {
    async fn fetch_rows(&self) -> Result<Vec<CatalogRow>, RegistryError> {
        let mut rows = Vec::new();
        if let Some(dsn) = &self.vsd_dsn {
            rows.extend(self.fetch(dsn, VSD_SQL, CatalogKind::VariousSmallDatasets).await?);
        }
        if let Some(dsn) = &self.dataservices_dsn {
            rows.extend(self.fetch(dsn, DATASERVICES_SQL, CatalogKind::Dataservices).await?);
        }
        Ok(rows)
    }
}

/// Split comma-separated scope strings into one set.
pub fn parse_scopes<'a>(values: impl IntoIterator<Item = Option<&'a str>>) -> BTreeSet<String> {
    values
        .into_iter()
        .flatten()
        .flat_map(|v| v.split(','))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Build a descriptor from a catalog row, or `None` (with a warning) if the row is incomplete.
pub fn descriptor_from_row(row: &CatalogRow, api_base_url: &str) -> Option<QueryDescriptor> {
    let required = [&row.name, &row.name_field, &row.dataset_name, &row.geometry_field, &row.id_field, &row.table_name];
    let present = |v: &&Option<String>| v.as_deref().is_some_and(|s| !s.trim().is_empty());
    if !required.iter().all(present) {
        warn!(
            "Incorrect dataset: {}/{}",
            row.dataset_name.as_deref().unwrap_or("?"),
            row.name.as_deref().unwrap_or("?")
        );
        return None;
    }
    let field = |v: &Option<String>| v.clone().unwrap_or_default();

    let transform: fn(&str) -> String = match row.kind {
        CatalogKind::Dataservices => to_snake_case,
        CatalogKind::VariousSmallDatasets => |s: &str| s.to_string(),
    };

    let raw_name = field(&row.name);
    let dataset_name = transform(&field(&row.dataset_name));
    let name = transform(&raw_name);
    let schema = row.schema.clone().filter(|s| !s.is_empty()).unwrap_or_else(|| "public".to_string());
    let table_schema = row
        .schema_data
        .as_ref()
        .map(|blob| TableSchema::from_blob(blob, &raw_name))
        .unwrap_or_default();

    let operator = row
        .geometry_type
        .as_deref()
        .map(Operator::from_geometry_type)
        .unwrap_or(Operator::Within);

    let id_field = match table_schema.base_identifier() {
        Some(base) => transform(base),
        None => transform(&field(&row.id_field)),
    };
    let display_field = transform(&field(&row.name_field));
    let geometry_field = transform(&field(&row.geometry_field));

    let uri_base = match row.kind {
        CatalogKind::Dataservices => format!("{}v1/{}/{}/", api_base_url, dataset_name, name),
        CatalogKind::VariousSmallDatasets => format!("{}{}/{}/", api_base_url, dataset_name, name),
    };

    let mut descriptor = QueryDescriptor::new(
        dataset_name.as_str(),
        name.as_str(),
        (schema.as_str(), field(&row.table_name).as_str()),
        geometry_field,
        operator,
        row.kind.connection_key(),
    )
    .with_standard_projection(&display_field, &id_field, &uri_base)
    .with_scopes(parse_scopes([row.dataset_authorization.as_deref(), row.table_authorization.as_deref()]))
    .with_extra_fields(table_schema.properties.iter().map(|p| transform(p)))
    .with_role_switch(row.kind == CatalogKind::Dataservices);

    if let Some(crs) = table_schema.crs {
        descriptor = descriptor.with_crs(crs);
    }
    if let Some((start, end)) = &table_schema.validity {
        descriptor = descriptor.with_temporal_bounds(transform(start), transform(end));
    }
    Some(descriptor)
}
