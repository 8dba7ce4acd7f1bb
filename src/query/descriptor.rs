use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::filter::ExtraFilter;
use super::ident::to_lower_camel_case;

/// Amersfoort / RD New
pub const DEFAULT_CRS: i32 = 28992;

/// Scope every caller implicitly holds.
pub const PUBLIC_SCOPE: &str = "OPENBAAR";

/// Alias under which every descriptor projects its geometry column.
pub const GEOMETRY_ALIAS: &str = "geometrie";

pub const DEFAULT_RADIUS: f64 = 30.0;

/// Properties copied from each row unless a descriptor says otherwise.
pub const DEFAULT_PROPERTIES: &[&str] = &["id", "display", "type", "uri", "opr_type", "distance"];

/// Spatial relation between the query point and a dataset's geometries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    /// The point must lie inside the polygon.
    Contains,
    /// The feature must lie within the radius of the point.
    Within,
}

impl Operator {
    pub fn from_geometry_type(geometry_type: &str) -> Self {
        match geometry_type.trim().to_ascii_uppercase().as_str() {
            "POLYGON" | "MULTIPOLYGON" => Operator::Contains,
            _ => Operator::Within,
        }
    }
}

/// One aliased entry of the SELECT list.
#[derive(Debug, Clone, PartialEq)]
pub enum ProjectionField {
    Column { column: String, alias: String },
    /// `CAST('<dataset>/<table>' AS varchar(50)) AS type`
    TypeLiteral(String),
    /// `'<base>' || id || '/' AS uri`
    Uri { base: String, id_column: String },
    /// Geometry column aliased to [`GEOMETRY_ALIAS`].
    Geometry(String),
}

impl ProjectionField {
    pub fn column(column: impl Into<String>, alias: impl Into<String>) -> Self {
        ProjectionField::Column { column: column.into(), alias: alias.into() }
    }

    pub fn alias(&self) -> &str {
        match self {
            ProjectionField::Column { alias, .. } => alias,
            ProjectionField::TypeLiteral(_) => "type",
            ProjectionField::Uri { .. } => "uri",
            ProjectionField::Geometry(_) => GEOMETRY_ALIAS,
        }
    }
}

/// Validity-start / validity-end columns of a temporal table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemporalBounds {
    pub start: String,
    pub end: String,
}

/// A queryable dataset table: where it lives, how to match against it and who may see it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryDescriptor {
    pub dataset_name: String,
    pub table_name: String,
    pub schema: String,
    pub table: String,
    pub geometry_field: String,
    pub operator: Operator,
    pub projection: Vec<ProjectionField>,
    pub output_properties: Vec<String>,
    pub extra_fields: BTreeSet<String>,
    pub crs: i32,
    pub temporal_bounds: Option<TemporalBounds>,
    pub access_scopes: BTreeSet<String>,
    pub connection_key: String,
    pub requires_role_switch: bool,
    pub default_radius: f64,
    pub extra_filter: Option<ExtraFilter>,
}

impl QueryDescriptor {
    pub fn new(
        dataset_name: impl Into<String>,
        table_name: impl Into<String>,
        schema_table: (&str, &str),
        geometry_field: impl Into<String>,
        operator: Operator,
        connection_key: impl Into<String>,
    ) -> Self {
        let geometry_field = geometry_field.into();
        Self {
            dataset_name: dataset_name.into(),
            table_name: table_name.into(),
            schema: schema_table.0.to_string(),
            table: schema_table.1.to_string(),
            projection: vec![ProjectionField::Geometry(geometry_field.clone())],
            geometry_field,
            operator,
            output_properties: DEFAULT_PROPERTIES.iter().map(|p| p.to_string()).collect(),
            extra_fields: BTreeSet::new(),
            crs: DEFAULT_CRS,
            temporal_bounds: None,
            access_scopes: BTreeSet::new(),
            connection_key: connection_key.into(),
            requires_role_switch: false,
            default_radius: DEFAULT_RADIUS,
            extra_filter: None,
        }
    }

    /// Replace the projection with the standard display/type/uri/geometry/id list.
    pub fn with_standard_projection(mut self, display_field: &str, id_field: &str, uri_base: &str) -> Self {
        self.projection = vec![
            ProjectionField::column(display_field, "display"),
            ProjectionField::TypeLiteral(self.table_ident()),
            ProjectionField::Uri { base: uri_base.to_string(), id_column: id_field.to_string() },
            ProjectionField::Geometry(self.geometry_field.clone()),
            ProjectionField::column(id_field, "id"),
        ];
        self
    }

    pub fn with_projection(mut self, projection: Vec<ProjectionField>) -> Self {
        self.projection = projection;
        self
    }

    pub fn with_output_properties(mut self, properties: &[&str]) -> Self {
        self.output_properties = properties.iter().map(|p| p.to_string()).collect();
        self
    }

    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.access_scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_extra_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.extra_fields = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_crs(mut self, crs: i32) -> Self {
        self.crs = crs;
        self
    }

    /// Filter to currently valid rows and project both bound columns.
    pub fn with_temporal_bounds(mut self, start: impl Into<String>, end: impl Into<String>) -> Self {
        let bounds = TemporalBounds { start: start.into(), end: end.into() };
        for column in [&bounds.start, &bounds.end] {
            let alias = to_lower_camel_case(column);
            self.projection.push(ProjectionField::column(column.as_str(), alias.as_str()));
            self.output_properties.push(alias);
        }
        self.temporal_bounds = Some(bounds);
        self
    }

    pub fn with_role_switch(mut self, requires_role_switch: bool) -> Self {
        self.requires_role_switch = requires_role_switch;
        self
    }

    pub fn with_default_radius(mut self, radius: f64) -> Self {
        self.default_radius = radius;
        self
    }

    pub fn with_extra_filter(mut self, filter: ExtraFilter) -> Self {
        self.extra_filter = Some(filter);
        self
    }

    /// Composite `dataset/table` key, unique within a registry snapshot.
    pub fn table_ident(&self) -> String {
        format!("{}/{}", self.dataset_name, self.table_name)
    }

    pub fn is_public(&self) -> bool {
        self.access_scopes.iter().all(|s| s == PUBLIC_SCOPE)
    }

    /// `access_scopes ⊆ granted ∪ {PUBLIC_SCOPE}`; `None` grants nothing.
    pub fn is_visible_to(&self, granted: Option<&BTreeSet<String>>) -> bool {
        self.access_scopes
            .iter()
            .all(|scope| scope == PUBLIC_SCOPE || granted.is_some_and(|g| g.contains(scope)))
    }
}
