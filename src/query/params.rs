use chrono::{DateTime, Utc};
use sqlx::postgres::PgArguments;

/// A value bound to a positional placeholder in generated SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlParam {
    Float(f64),
    Int(i32),
    BigInt(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl SqlParam {
    fn cast(&self) -> &'static str {
        match self {
            SqlParam::Float(_) => "float8",
            SqlParam::Int(_) => "integer",
            SqlParam::BigInt(_) => "bigint",
            SqlParam::Text(_) => "text",
            SqlParam::Timestamp(_) => "timestamptz",
        }
    }
}

/// Generated statement plus the values for its `$n` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlResult {
    pub query: String,
    pub params: Vec<SqlParam>,
}

/// Hands out `$n` placeholders in bind order.
#[derive(Debug, Default)]
pub struct ParamBinder {
    params: Vec<SqlParam>,
}

impl ParamBinder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a value and return its typed placeholder, e.g. `$3::float8`.
    pub fn push(&mut self, param: SqlParam) -> String {
        let cast = param.cast();
        self.params.push(param);
        format!("${}::{}", self.params.len(), cast)
    }

    pub fn into_params(self) -> Vec<SqlParam> {
        self.params
    }
}

/// Bind parameter to SQL query
pub fn bind_param<'q>(
    q: sqlx::query::Query<'q, sqlx::Postgres, PgArguments>,
    p: &'q SqlParam,
) -> sqlx::query::Query<'q, sqlx::Postgres, PgArguments> {
    match p {
        SqlParam::Float(f) => q.bind(*f),
        SqlParam::Int(i) => q.bind(*i),
        SqlParam::BigInt(i) => q.bind(*i),
        SqlParam::Text(s) => q.bind(s.as_str()),
        SqlParam::Timestamp(ts) => q.bind(*ts),
    }
}
