//! Federated search across registered datasets.

pub mod engine;
pub mod source;

use axum::body::Bytes;
use futures::stream::{self, Stream, StreamExt};

pub use engine::{FeatureStream, SearchEngine, SearchRequest};
pub use source::{DatasourceError, FeatureSource, PgFeatureSource};

const COLLECTION_HEAD: &[u8] = br#"{"type": "FeatureCollection", "features": ["#;
const COLLECTION_TAIL: &[u8] = b"]}";

/// Encode features as a GeoJSON-style FeatureCollection, one chunk per feature.
pub fn feature_collection_body(features: FeatureStream) -> impl Stream<Item = Result<Bytes, serde_json::Error>> + Send {
    let body = features.enumerate().map(|(i, feature)| -> Result<Bytes, serde_json::Error> {
        let mut chunk = if i == 0 { Vec::new() } else { b",".to_vec() };
        serde_json::to_writer(&mut chunk, &feature)?;
        Ok(Bytes::from(chunk))
    });

    stream::once(async { Ok::<_, serde_json::Error>(Bytes::from_static(COLLECTION_HEAD)) })
        .chain(body)
        .chain(stream::once(async { Ok(Bytes::from_static(COLLECTION_TAIL)) }))
}
