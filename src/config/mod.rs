use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

/// Connection keys used by descriptors, and the database each one points at.
pub const DATABASES: &[(&str, &str)] = &[
    ("DSN_BAG", "bag_v11"),
    ("DSN_NAP", "nap"),
    ("DSN_MILIEU", "milieuthemas"),
    ("DSN_MONUMENTEN", "monumenten"),
    ("DSN_GREX", "grondexploitatie"),
    ("DSN_VARIOUS_SMALL_DATASETS", "various_small_datasets"),
    ("DSN_DATASERVICES_DATASETS", "dataservices"),
];

pub const DEFAULT_SEARCH_DATASETS: &[&str] = &[
    "monumenten",
    "openbareruimte",
    "pand",
    "stadsdeel",
    "peilmerk",
    "meetbout",
    "uitgevoerdonderzoek",
    "bominslag",
];

pub const DEFAULT_SIGNING_ALGORITHMS: &[&str] = &["ES256", "ES384", "ES512", "RS256", "RS384", "RS512"];

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {message}")]
    Parse { path: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub registry: RegistryConfig,
    pub search: SearchConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub enable_cors: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub max_connections: u32,
    /// Seconds to wait for a pooled connection.
    pub connection_timeout: u64,
    /// Distinct DSNs kept open at once.
    pub cache_capacity: usize,
    /// Run role-switching descriptors under the end user's database role.
    pub set_role: bool,
    pub internal_domains: Vec<String>,
    /// Connection key -> DSN. Keys without configuration are absent.
    pub dsns: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryConfig {
    pub refresh_delay_secs: u64,
    /// Prefix of every generated `uri` property.
    pub api_base_url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    pub workers: usize,
    pub timeout_ms: u64,
    pub default_radius: f64,
    pub default_datasets: Vec<String>,
}

impl SearchConfig {
    /// Apply `SEARCH_*` and `DEFAULT_SEARCH_DISTANCE` values from `lookup`;
    /// unparseable values keep the current setting.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(v) = lookup("SEARCH_WORKERS") {
            self.workers = v.parse().unwrap_or(self.workers);
        }
        if let Some(v) = lookup("SEARCH_TIMEOUT_MS") {
            self.timeout_ms = v.parse().unwrap_or(self.timeout_ms);
        }
        if let Some(v) = lookup("DEFAULT_SEARCH_DISTANCE") {
            self.default_radius = v
                .parse::<f64>()
                .ok()
                .filter(|r| r.is_finite() && *r >= 0.0)
                .unwrap_or(self.default_radius);
        }
        if let Some(v) = lookup("SEARCH_DEFAULT_DATASETS") {
            self.default_datasets = split_list(&v);
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    /// Inline JWKS document.
    pub jwks: Option<String>,
    pub jwks_url: Option<String>,
    pub allowed_algorithms: Vec<String>,
}

/// Optional YAML file with key-set settings, read from `GEOSEARCH_CONFIG_PATH`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SecurityFile {
    /// Either a JSON string or an inline mapping.
    pub jwks: Option<serde_json::Value>,
    pub jwks_url: Option<String>,
    pub jwks_allowed_signing_algorithms: Option<Vec<String>>,
}

impl SecurityFile {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text).map_err(|message| ConfigError::Parse {
            path: path.display().to_string(),
            message,
        })
    }

    pub fn parse(text: &str) -> Result<Self, String> {
        serde_yaml::from_str(text).map_err(|e| e.to_string())
    }

    /// The key set as JSON text.
    pub fn jwks_json(&self) -> Option<String> {
        match &self.jwks {
            None | Some(serde_json::Value::Null) => None,
            Some(serde_json::Value::String(text)) => Some(text.clone()),
            Some(other) => Some(other.to_string()),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Server overrides
        if let Ok(v) = env::var("HOST") {
            self.server.host = v;
        }
        if let Ok(v) = env::var("PORT") {
            self.server.port = v.parse().unwrap_or(self.server.port);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }
        if let Ok(v) = env::var("DATABASE_CACHE_CAPACITY") {
            self.database.cache_capacity = v.parse().unwrap_or(self.database.cache_capacity);
        }
        if let Ok(v) = env::var("DATABASE_SET_ROLE") {
            self.database.set_role = parse_flag(&v);
        }
        if let Ok(v) = env::var("DATABASE_INTERNAL_DOMAINS") {
            self.database.internal_domains = split_list(&v);
        }
        self.database.dsns = resolve_dsns(|name| env::var(name).ok());

        // Registry overrides
        if let Ok(v) = env::var("REGISTRY_REFRESH_DELAY") {
            self.registry.refresh_delay_secs = v.parse().unwrap_or(self.registry.refresh_delay_secs);
        }
        if let Ok(v) = env::var("DATAPUNT_API_URL") {
            self.registry.api_base_url = v;
        }

        self.search.apply_overrides(|name| env::var(name).ok());

        // Security overrides; the YAML file wins over plain variables
        if let Ok(v) = env::var("PUB_JWKS") {
            self.security.jwks = Some(v);
        }
        if let Ok(v) = env::var("KEYCLOAK_JWKS_URL") {
            self.security.jwks_url = Some(v);
        }
        if let Ok(path) = env::var("GEOSEARCH_CONFIG_PATH") {
            let path = Path::new(&path);
            if path.exists() {
                match SecurityFile::load(path) {
                    Ok(file) => self.security.apply_file(file),
                    Err(e) => warn!("Ignoring security config: {}", e),
                }
            }
        }

        self
    }

    fn development() -> Self {
        Self {
            environment: Environment::Development,
            server: ServerConfig { host: "0.0.0.0".to_string(), port: 8000, enable_cors: true },
            database: DatabaseConfig {
                max_connections: 5,
                connection_timeout: 10,
                cache_capacity: 128,
                set_role: false,
                internal_domains: default_internal_domains(),
                dsns: BTreeMap::new(),
            },
            registry: RegistryConfig {
                refresh_delay_secs: 300,
                api_base_url: "https://api.data.amsterdam.nl/".to_string(),
            },
            search: SearchConfig {
                workers: 4,
                timeout_ms: 5000,
                default_radius: 30.0,
                default_datasets: default_datasets(),
            },
            security: SecurityConfig {
                jwks: None,
                jwks_url: None,
                allowed_algorithms: default_algorithms(),
            },
        }
    }

    fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            database: DatabaseConfig { max_connections: 10, connection_timeout: 5, ..Self::development().database },
            search: SearchConfig { workers: 8, timeout_ms: 2000, ..Self::development().search },
            ..Self::development()
        }
    }

    fn production() -> Self {
        Self {
            environment: Environment::Production,
            database: DatabaseConfig {
                max_connections: 20,
                connection_timeout: 3,
                set_role: true,
                ..Self::development().database
            },
            search: SearchConfig { workers: 8, timeout_ms: 2000, ..Self::development().search },
            ..Self::development()
        }
    }
}

impl DatabaseConfig {
    pub fn dsn(&self, connection_key: &str) -> Option<&str> {
        self.dsns.get(connection_key).map(String::as_str)
    }
}

impl SecurityConfig {
    fn apply_file(&mut self, file: SecurityFile) {
        if let Some(jwks) = file.jwks_json() {
            self.jwks = Some(jwks);
        }
        if file.jwks_url.is_some() {
            self.jwks_url = file.jwks_url;
        }
        if let Some(algorithms) = file.jwks_allowed_signing_algorithms {
            self.allowed_algorithms = algorithms;
        }
    }
}

/// Resolve every known connection key to a DSN.
///
/// `<DB>_DB_USER_OVERRIDE` + `<DB>_DB_HOST_OVERRIDE` build a DSN from parts;
/// otherwise the database path of `DATABASE_URL` is swapped for the key's database.
pub fn resolve_dsns(lookup: impl Fn(&str) -> Option<String>) -> BTreeMap<String, String> {
    let base = lookup("DATABASE_URL");
    let mut dsns = BTreeMap::new();
    for (key, database) in DATABASES {
        let dsn = dsn_from_parts(database, &lookup).or_else(|| base.as_deref().and_then(|b| swap_database(b, database)));
        match dsn {
            Some(dsn) => {
                dsns.insert(key.to_string(), dsn);
            }
            None => info!("No database configured for {}", key),
        }
    }
    dsns
}

fn dsn_from_parts(database: &str, lookup: &impl Fn(&str) -> Option<String>) -> Option<String> {
    let prefix = database.to_ascii_uppercase();
    let var = |name: &str| lookup(&format!("{}_DB_{}_OVERRIDE", prefix, name));
    let user = var("USER")?;
    let host = var("HOST")?;
    let port = var("PORT").unwrap_or_else(|| "5432".to_string());
    let db = var("DATABASE").unwrap_or_else(|| database.to_string());

    let mut url = url::Url::parse(&format!("postgresql://{}:{}/", host, port)).ok()?;
    url.set_username(&user).ok()?;
    if let Some(password) = var("PASSWORD") {
        url.set_password(Some(&password)).ok()?;
    }
    url.set_path(&format!("/{}", db));
    Some(url.into())
}

/// Replace the path of `base` with `database`, keeping credentials and query.
pub fn swap_database(base: &str, database: &str) -> Option<String> {
    let mut url = url::Url::parse(base).ok()?;
    url.set_path(&format!("/{}", database));
    Some(url.into())
}

fn parse_flag(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

fn split_list(value: &str) -> Vec<String> {
    value.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

fn default_internal_domains() -> Vec<String> {
    vec!["amsterdam.nl".to_string(), "ggd.amsterdam.nl".to_string()]
}

fn default_datasets() -> Vec<String> {
    DEFAULT_SEARCH_DATASETS.iter().map(|s| s.to_string()).collect()
}

fn default_algorithms() -> Vec<String> {
    DEFAULT_SIGNING_ALGORITHMS.iter().map(|s| s.to_string()).collect()
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
