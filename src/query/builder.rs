use chrono::{DateTime, Utc};

use super::descriptor::{Operator, ProjectionField, QueryDescriptor};
use super::error::QueryError;
use super::filter::ExtraFilter;
use super::ident::{quote_identifier, quote_table, to_lower_camel_case, to_snake_case};
use super::params::{ParamBinder, SqlParam, SqlResult};
use crate::types::QueryPoint;

const WGS84: i32 = 4326;

/// Per-request parameters for one descriptor's query.
#[derive(Debug, Clone, PartialEq)]
pub struct SpatialQuery {
    pub point: QueryPoint,
    /// Meters; `None` falls back to the descriptor's default.
    pub radius: Option<f64>,
    /// Only honored for [`Operator::Within`].
    pub limit: Option<i64>,
    /// Requested extra field names, camelCase or snake_case.
    pub extra_fields: Vec<String>,
    pub extra_filter: Option<ExtraFilter>,
    /// Reference time for temporal validity.
    pub valid_at: DateTime<Utc>,
}

impl SpatialQuery {
    pub fn new(point: QueryPoint) -> Self {
        Self {
            point,
            radius: None,
            limit: None,
            extra_fields: Vec::new(),
            extra_filter: None,
            valid_at: Utc::now(),
        }
    }

    pub fn with_radius(mut self, radius: Option<f64>) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_limit(mut self, limit: Option<i64>) -> Self {
        self.limit = limit;
        self
    }
}

/// Build the parameterized proximity query for `descriptor`.
pub fn build(descriptor: &QueryDescriptor, query: &SpatialQuery) -> Result<SqlResult, QueryError> {
    if !query.point.is_finite() {
        let (a, b) = match query.point {
            QueryPoint::Projected { x, y } => (x, y),
            QueryPoint::Geographic { lat, lon } => (lat, lon),
        };
        return Err(QueryError::InvalidCoordinates(a, b));
    }

    let mut binder = ParamBinder::new();
    let point = point_expression(&mut binder, &query.point, descriptor.crs);
    let geom = quote_identifier(&descriptor.geometry_field)?;

    let mut select = render_projection(&descriptor.projection, &mut binder)?;
    for (column, alias) in resolve_extra_fields(descriptor, &query.extra_fields)? {
        select.push(format!("{} AS {}", quote_identifier(&column)?, quote_identifier(&alias)?));
    }

    let (distance, mut predicates) = match descriptor.operator {
        Operator::Within => {
            let radius = query.radius.unwrap_or(descriptor.default_radius);
            if !radius.is_finite() || radius < 0.0 {
                return Err(QueryError::InvalidRadius(radius));
            }
            let radius = binder.push(SqlParam::Float(radius));
            (
                format!("ST_Distance({}, {})", geom, point),
                vec![format!("ST_DWithin({}, {}, {})", geom, point, radius)],
            )
        }
        Operator::Contains => (
            format!("ST_Distance(ST_Centroid({}), {})", geom, point),
            vec![
                format!("{} && {}", geom, point),
                format!("ST_Contains({}, {})", geom, point),
                format!("ST_IsValid({})", geom),
            ],
        ),
    };

    if let Some(bounds) = &descriptor.temporal_bounds {
        let now = binder.push(SqlParam::Timestamp(query.valid_at));
        let start = quote_identifier(&bounds.start)?;
        let end = quote_identifier(&bounds.end)?;
        predicates.push(format!(
            "({start} < {now} OR {start} IS NULL) AND ({end} > {now} OR {end} IS NULL)"
        ));
    }

    for filter in descriptor.extra_filter.iter().chain(query.extra_filter.iter()) {
        predicates.push(filter.render(&mut binder)?);
    }

    select.push(format!("{} AS distance", distance));
    let mut sql = format!(
        "SELECT {} FROM {} WHERE {} ORDER BY distance",
        select.join(", "),
        quote_table(&descriptor.schema, &descriptor.table)?,
        predicates.join(" AND "),
    );

    if descriptor.operator == Operator::Within {
        if let Some(limit) = query.limit {
            if limit < 1 {
                return Err(QueryError::InvalidLimit(limit));
            }
            sql.push_str(&format!(" LIMIT {}", binder.push(SqlParam::BigInt(limit))));
        }
    }

    Ok(SqlResult { query: sql, params: binder.into_params() })
}

fn point_expression(binder: &mut ParamBinder, point: &QueryPoint, crs: i32) -> String {
    match *point {
        QueryPoint::Projected { x, y } => {
            let x = binder.push(SqlParam::Float(x));
            let y = binder.push(SqlParam::Float(y));
            let srid = binder.push(SqlParam::Int(crs));
            format!("ST_SetSRID(ST_MakePoint({}, {}), {})", x, y, srid)
        }
        QueryPoint::Geographic { lat, lon } => {
            let lon = binder.push(SqlParam::Float(lon));
            let lat = binder.push(SqlParam::Float(lat));
            let srid = binder.push(SqlParam::Int(crs));
            format!(
                "ST_Transform(ST_SetSRID(ST_MakePoint({}, {}), {}), {})",
                lon, lat, WGS84, srid
            )
        }
    }
}

fn render_projection(fields: &[ProjectionField], binder: &mut ParamBinder) -> Result<Vec<String>, QueryError> {
    fields
        .iter()
        .map(|field| {
            let alias = quote_identifier(field.alias())?;
            let expr = match field {
                ProjectionField::Column { column, .. } => quote_identifier(column)?,
                ProjectionField::TypeLiteral(value) => {
                    format!("CAST({} AS varchar(50))", binder.push(SqlParam::Text(value.clone())))
                }
                ProjectionField::Uri { base, id_column } => format!(
                    "{} || {} || '/'",
                    binder.push(SqlParam::Text(base.clone())),
                    quote_identifier(id_column)?
                ),
                ProjectionField::Geometry(column) => quote_identifier(column)?,
            };
            Ok(format!("{} AS {}", expr, alias))
        })
        .collect()
}

/// Validate requested extra fields against the descriptor's allow-list.
/// Returns `(column, camelCaseAlias)` pairs, deduplicated, in request order.
pub fn resolve_extra_fields(
    descriptor: &QueryDescriptor,
    requested: &[String],
) -> Result<Vec<(String, String)>, QueryError> {
    let mut resolved: Vec<(String, String)> = Vec::new();
    for name in requested.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        let column = to_snake_case(name);
        if !descriptor.extra_fields.contains(&column) {
            return Err(QueryError::UnknownField {
                dataset: descriptor.table_ident(),
                field: name.to_string(),
            });
        }
        if resolved.iter().any(|(c, _)| *c == column) {
            continue;
        }
        let alias = to_lower_camel_case(&column);
        resolved.push((column, alias));
    }
    Ok(resolved)
}

/// Names copied from each row into a feature: the descriptor's properties
/// followed by the aliases of any requested extra fields.
pub fn output_properties(descriptor: &QueryDescriptor, query: &SpatialQuery) -> Result<Vec<String>, QueryError> {
    let mut names = descriptor.output_properties.clone();
    for (_, alias) in resolve_extra_fields(descriptor, &query.extra_fields)? {
        if !names.contains(&alias) {
            names.push(alias);
        }
    }
    Ok(names)
}
