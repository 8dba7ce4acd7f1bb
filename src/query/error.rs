use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QueryError {
    #[error("Invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Unknown field '{field}' for dataset {dataset}")]
    UnknownField { dataset: String, field: String },

    #[error("Invalid radius: {0}")]
    InvalidRadius(f64),

    #[error("Invalid limit: {0}")]
    InvalidLimit(i64),

    #[error("Invalid coordinates: ({0}, {1})")]
    InvalidCoordinates(f64, f64),

    #[error("Filter on {0} requires at least one value")]
    EmptyFilter(String),
}
