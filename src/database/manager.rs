use lru::LruCache;
use parking_lot::Mutex;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use super::connection::DatabaseConnection;
use super::retry::is_transient_sqlx;
use crate::config::DatabaseConfig;

/// Errors from the connection and security-context layer
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(String),

    #[error("Database role {0} does not exist")]
    RoleNotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Session already released")]
    SessionClosed,

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Worth retrying: the same statement may succeed on a fresh attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            DatabaseError::Sqlx(e) => is_transient_sqlx(e),
            _ => false,
        }
    }

    /// Driver-level failure after which the connection must be rechecked.
    pub fn is_connection_error(&self) -> bool {
        matches!(
            self,
            DatabaseError::Sqlx(sqlx::Error::Io(_) | sqlx::Error::Protocol(_) | sqlx::Error::PoolClosed | sqlx::Error::WorkerCrashed | sqlx::Error::Tls(_))
        )
    }
}

/// Pool settings shared by every connection the manager opens.
#[derive(Debug, Clone, Copy)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self { max_connections: 5, acquire_timeout: Duration::from_secs(10) }
    }
}

/// Process-wide cache of one connection per DSN, bounded with LRU eviction.
pub struct ConnectionManager {
    connections: Mutex<LruCache<String, Arc<DatabaseConnection>>>,
    settings: PoolSettings,
}

impl ConnectionManager {
    pub const DEFAULT_CAPACITY: usize = 128;

    pub fn new(capacity: usize, settings: PoolSettings) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            connections: Mutex::new(LruCache::new(capacity)),
            settings,
        }
    }

    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self::new(
            config.cache_capacity,
            PoolSettings {
                max_connections: config.max_connections,
                acquire_timeout: Duration::from_secs(config.connection_timeout),
            },
        )
    }

    /// Get the cached connection for `dsn`, creating an unconnected one if needed.
    pub fn get(&self, dsn: &str) -> Arc<DatabaseConnection> {
        let mut connections = self.connections.lock();
        if let Some(conn) = connections.get(dsn) {
            return conn.clone();
        }

        let conn = Arc::new(DatabaseConnection::new(dsn, self.settings));
        if let Some((evicted, _)) = connections.push(dsn.to_string(), conn.clone()) {
            if evicted != dsn {
                debug!("Evicted connection {} from cache", redact(&evicted));
            }
        }
        conn
    }

    pub fn len(&self) -> usize {
        self.connections.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Close and remove all pools (e.g., on shutdown)
    pub async fn close_all(&self) {
        let drained: Vec<(String, Arc<DatabaseConnection>)> = {
            let mut connections = self.connections.lock();
            let mut drained = Vec::with_capacity(connections.len());
            while let Some(entry) = connections.pop_lru() {
                drained.push(entry);
            }
            drained
        };
        for (dsn, conn) in drained {
            conn.close().await;
            info!("Closed database pool: {}", redact(&dsn));
        }
    }
}

/// DSN with the password removed, for logging.
pub fn redact(dsn: &str) -> String {
    match url::Url::parse(dsn) {
        Ok(mut url) => {
            if url.password().is_some() {
                let _ = url.set_password(Some("***"));
            }
            url.into()
        }
        Err(_) => "<invalid dsn>".to_string(),
    }
}
