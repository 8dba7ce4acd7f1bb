use bigdecimal::BigDecimal;
use serde_json::{Map, Number, Value};
use sqlx::postgres::{PgRow, PgTypeInfo};
use sqlx::{Column, Row, TypeInfo};

/// Copy the named columns of `row` into a JSON object. Names the row lacks are skipped.
pub fn row_properties(row: &PgRow, names: &[String]) -> Map<String, Value> {
    let mut properties = Map::new();
    for name in names {
        let Some(column) = row.columns().iter().find(|c| c.name() == name) else {
            continue;
        };
        let value = extract_column_value(row, column.ordinal(), column.type_info());
        properties.insert(name.clone(), value);
    }
    properties
}

/// Decode one column by its PostgreSQL type name.
pub fn extract_column_value(row: &PgRow, index: usize, type_info: &PgTypeInfo) -> Value {
    let type_name = type_info.name();
    match type_name {
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => row
            .try_get::<Option<String>, _>(index)
            .ok()
            .flatten()
            .map(Value::String)
            .unwrap_or(Value::Null),
        "INT2" => number(row.try_get::<Option<i16>, _>(index).ok().flatten().map(i64::from)),
        "INT4" => number(row.try_get::<Option<i32>, _>(index).ok().flatten().map(i64::from)),
        "INT8" => number(row.try_get::<Option<i64>, _>(index).ok().flatten()),
        "FLOAT4" => float(row.try_get::<Option<f32>, _>(index).ok().flatten().map(f64::from)),
        "FLOAT8" => float(row.try_get::<Option<f64>, _>(index).ok().flatten()),
        "NUMERIC" => float(
            row.try_get::<Option<BigDecimal>, _>(index)
                .ok()
                .flatten()
                .and_then(|d| d.to_string().parse::<f64>().ok()),
        ),
        "BOOL" => row
            .try_get::<Option<bool>, _>(index)
            .ok()
            .flatten()
            .map(Value::Bool)
            .unwrap_or(Value::Null),
        "JSONB" | "JSON" => row.try_get::<Option<Value>, _>(index).ok().flatten().unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)
            .ok()
            .flatten()
            .map(|t| Value::String(t.to_rfc3339()))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)
            .ok()
            .flatten()
            .map(|t| Value::String(t.format("%Y-%m-%dT%H:%M:%S").to_string()))
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)
            .ok()
            .flatten()
            .map(|d| Value::String(d.to_string()))
            .unwrap_or(Value::Null),
        _ => {
            tracing::warn!("Unhandled PostgreSQL type: {}, returning null", type_name);
            Value::Null
        }
    }
}

fn number(n: Option<i64>) -> Value {
    n.map(|n| Value::Number(n.into())).unwrap_or(Value::Null)
}

fn float(f: Option<f64>) -> Value {
    f.and_then(Number::from_f64).map(Value::Number).unwrap_or(Value::Null)
}
