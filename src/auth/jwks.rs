use jsonwebtoken::jwk::{Jwk, JwkSet};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum JwksError {
    #[error("Invalid JWKS: {0}")]
    Parse(String),

    #[error("Failed to get JWKS from url: {url}, error: {message}")]
    Fetch { url: String, message: String },
}

/// Verification keys, merged from inline configuration and a remote JWKS endpoint.
#[derive(Debug, Clone, Default)]
pub struct KeySet {
    keys: Vec<Jwk>,
}

impl KeySet {
    pub fn from_json(jwks: &str) -> Result<Self, JwksError> {
        let set: JwkSet = serde_json::from_str(jwks.trim()).map_err(|e| JwksError::Parse(e.to_string()))?;
        Ok(Self { keys: set.keys })
    }

    /// Download a key set. Any HTTP or parse failure is an error.
    pub async fn fetch(url: &str) -> Result<Self, JwksError> {
        let fetch_error = |message: String| JwksError::Fetch { url: url.to_string(), message };
        let body = reqwest::get(url)
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| fetch_error(e.to_string()))?
            .text()
            .await
            .map_err(|e| fetch_error(e.to_string()))?;
        let keys = Self::from_json(&body).map_err(|e| fetch_error(e.to_string()))?;
        info!("Loaded JWKS from JWKS_URL setting {}", url);
        Ok(keys)
    }

    /// Union of the inline key set and the one served at `jwks_url`.
    pub async fn from_sources(jwks: Option<&str>, jwks_url: Option<&str>) -> Result<Self, JwksError> {
        let mut keys = match jwks.filter(|j| !j.trim().is_empty()) {
            Some(json) => Self::from_json(json)?,
            None => Self::default(),
        };
        if let Some(url) = jwks_url.filter(|u| !u.is_empty()) {
            keys.extend(Self::fetch(url).await?);
        }
        Ok(keys)
    }

    pub fn extend(&mut self, other: KeySet) {
        self.keys.extend(other.keys);
    }

    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|k| k.common.key_id.as_deref() == Some(kid))
    }

    pub fn keys(&self) -> &[Jwk] {
        &self.keys
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
