//! Descriptor model and parameterized PostGIS query generation.

pub mod builder;
pub mod descriptor;
pub mod error;
pub mod filter;
pub mod ident;
pub mod params;

pub use builder::{build, output_properties, SpatialQuery};
pub use descriptor::{Operator, ProjectionField, QueryDescriptor, TemporalBounds, DEFAULT_CRS, PUBLIC_SCOPE};
pub use error::QueryError;
pub use filter::ExtraFilter;
pub use params::{bind_param, SqlParam, SqlResult};
