//! The parts of a dataset's schema document that affect querying.

use serde_json::Value;

/// Table-level metadata read from a dataset schema blob.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableSchema {
    pub crs: Option<i32>,
    /// Identifier column(s) as declared, camelCase.
    pub identifier: Vec<String>,
    /// `temporal.identifier`: the versioning component of a composite identifier.
    pub temporal_identifier: Option<String>,
    /// `temporal.dimensions.geldigOp = [start, end]`.
    pub validity: Option<(String, String)>,
    /// Scalar property names, usable as extra fields.
    pub properties: Vec<String>,
}

impl TableSchema {
    /// Look up `table` in a dataset blob. Table-level `crs` wins over the dataset's.
    pub fn from_blob(blob: &Value, table: &str) -> Self {
        let dataset_crs = blob.get("crs").and_then(Value::as_str).and_then(parse_crs);
        let Some(table) = blob
            .get("tables")
            .and_then(Value::as_array)
            .and_then(|tables| tables.iter().find(|t| t.get("id").and_then(Value::as_str) == Some(table)))
        else {
            return Self { crs: dataset_crs, ..Self::default() };
        };

        let crs = table.get("crs").and_then(Value::as_str).and_then(parse_crs).or(dataset_crs);
        let schema = table.get("schema");

        let identifier = match schema.and_then(|s| s.get("identifier")) {
            Some(Value::String(id)) => vec![id.clone()],
            Some(Value::Array(ids)) => ids.iter().filter_map(Value::as_str).map(str::to_string).collect(),
            _ => Vec::new(),
        };

        let temporal = table.get("temporal");
        let temporal_identifier = temporal
            .and_then(|t| t.get("identifier"))
            .and_then(Value::as_str)
            .map(str::to_string);
        let validity = temporal
            .and_then(|t| t.pointer("/dimensions/geldigOp"))
            .and_then(Value::as_array)
            .and_then(|bounds| match bounds.as_slice() {
                [Value::String(start), Value::String(end)] => Some((start.clone(), end.clone())),
                _ => None,
            });

        let properties = schema
            .and_then(|s| s.get("properties"))
            .and_then(Value::as_object)
            .map(|props| {
                props
                    .iter()
                    .filter(|(_, def)| is_scalar(def))
                    .map(|(name, _)| name.clone())
                    .collect()
            })
            .unwrap_or_default();

        Self { crs, identifier, temporal_identifier, validity, properties }
    }

    /// The non-temporal component of a composite identifier, if there is one.
    pub fn base_identifier(&self) -> Option<&str> {
        let temporal = self.temporal_identifier.as_deref()?;
        if self.identifier.len() < 2 {
            return None;
        }
        self.identifier.iter().map(String::as_str).find(|id| *id != temporal)
    }
}

/// `EPSG:28992` -> `28992`.
pub fn parse_crs(crs: &str) -> Option<i32> {
    let (authority, code) = crs.split_once(':')?;
    if !authority.eq_ignore_ascii_case("EPSG") {
        return None;
    }
    code.trim().parse().ok()
}

fn is_scalar(def: &Value) -> bool {
    matches!(
        def.get("type").and_then(Value::as_str),
        Some("string" | "integer" | "number" | "boolean")
    )
}
