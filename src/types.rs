/// Shared types used across the codebase

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Query location as supplied by the caller
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum QueryPoint {
    /// Already in the dataset's native projected CRS (RD for most datasets)
    Projected { x: f64, y: f64 },
    /// WGS84 latitude/longitude, reprojected per dataset before any predicate
    Geographic { lat: f64, lon: f64 },
}

impl QueryPoint {
    pub fn is_projected(&self) -> bool {
        matches!(self, QueryPoint::Projected { .. })
    }

    pub fn is_finite(&self) -> bool {
        match *self {
            QueryPoint::Projected { x, y } => x.is_finite() && y.is_finite(),
            QueryPoint::Geographic { lat, lon } => lat.is_finite() && lon.is_finite(),
        }
    }
}

/// One search hit, serialized as `{"properties": {...}}`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Feature {
    pub properties: Map<String, Value>,
}

impl Feature {
    pub fn new(properties: Map<String, Value>) -> Self {
        Self { properties }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }
}
