use parking_lot::Mutex;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::{Postgres, Transaction};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tracing::{debug, info, warn};

use super::manager::{redact, DatabaseError, PoolSettings};

/// A lazily established pool for one DSN that repairs itself after driver errors.
///
/// The slot lock is only held to read or swap the pool, never while connecting
/// or probing, so one hanging database does not queue up its callers.
pub struct DatabaseConnection {
    dsn: String,
    settings: PoolSettings,
    pool: Mutex<Option<(u64, PgPool)>>,
    next_id: AtomicU64,
    failed: AtomicBool,
}

impl DatabaseConnection {
    pub fn new(dsn: &str, settings: PoolSettings) -> Self {
        Self {
            dsn: dsn.to_string(),
            settings,
            pool: Mutex::new(None),
            next_id: AtomicU64::new(0),
            failed: AtomicBool::new(false),
        }
    }

    pub fn dsn(&self) -> &str {
        &self.dsn
    }

    /// Record a driver-level failure; the next [`pool`](Self::pool) call checks it first.
    pub fn mark_failed(&self) {
        self.failed.store(true, Ordering::SeqCst);
    }

    pub fn is_marked_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Report `err` back to the connection when it indicates a broken link.
    pub fn observe<T>(&self, result: Result<T, DatabaseError>) -> Result<T, DatabaseError> {
        if let Err(e) = &result {
            if e.is_connection_error() || e.is_transient() {
                self.mark_failed();
            }
        }
        result
    }

    /// The live pool, connecting on first use or after a failed health check.
    pub async fn pool(&self) -> Result<PgPool, DatabaseError> {
        if let Some(pool) = self.current().await {
            return Ok(pool);
        }

        let pool = PgPoolOptions::new()
            .max_connections(self.settings.max_connections)
            .acquire_timeout(self.settings.acquire_timeout)
            .connect(&self.dsn)
            .await
            .map_err(|e| {
                self.mark_failed();
                DatabaseError::from(e)
            })?;

        let winner = {
            let mut slot = self.pool.lock();
            match slot.as_ref() {
                Some((_, existing)) => Some(existing.clone()),
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                    *slot = Some((id, pool.clone()));
                    None
                }
            }
        };
        match winner {
            Some(existing) => {
                debug!("Pool for {} created concurrently, discarding ours", redact(&self.dsn));
                pool.close().await;
                Ok(existing)
            }
            None => {
                info!("Created database pool for: {}", redact(&self.dsn));
                Ok(pool)
            }
        }
    }

    /// The cached pool, after probing it if a failure was reported. `None`
    /// means a new pool must be connected.
    async fn current(&self) -> Option<PgPool> {
        let (id, pool) = self.pool.lock().clone()?;
        if !self.failed.swap(false, Ordering::SeqCst) {
            return Some(pool);
        }
        match sqlx::query("SELECT 1").execute(&pool).await {
            Ok(_) => Some(pool),
            Err(e) => {
                warn!("Connection to {} unusable, reconnecting: {}", redact(&self.dsn), e);
                {
                    let mut slot = self.pool.lock();
                    if slot.as_ref().is_some_and(|(current, _)| *current == id) {
                        *slot = None;
                    }
                }
                pool.close().await;
                None
            }
        }
    }

    /// Start a transaction on an exclusive pooled connection.
    pub async fn begin(&self) -> Result<Transaction<'static, Postgres>, DatabaseError> {
        let pool = self.pool().await?;
        let tx = pool.begin().await.map_err(DatabaseError::from);
        self.observe(tx)
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        let pool = self.pool().await?;
        let result = sqlx::query("SELECT 1").execute(&pool).await.map(|_| ()).map_err(DatabaseError::from);
        self.observe(result)
    }

    pub async fn close(&self) {
        let taken = self.pool.lock().take();
        if let Some((_, pool)) = taken {
            pool.close().await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn failures_are_flagged_until_next_check() {
        let conn = DatabaseConnection::new("postgres://localhost/nap", PoolSettings::default());
        assert!(!conn.is_marked_failed());
        let result: Result<(), _> = conn.observe(Err(DatabaseError::Sqlx(sqlx::Error::PoolTimedOut)));
        assert!(result.is_err());
        assert!(conn.is_marked_failed());
    }

    #[test]
    fn input_errors_do_not_flag_the_connection() {
        let conn = DatabaseConnection::new("postgres://localhost/nap", PoolSettings::default());
        let _: Result<(), _> = conn.observe(Err(DatabaseError::PermissionDenied("x".into())));
        assert!(!conn.is_marked_failed());
    }

    #[tokio::test]
    async fn unreachable_database_surfaces_typed_error() {
        let settings = PoolSettings { max_connections: 1, acquire_timeout: Duration::from_millis(200) };
        let conn = DatabaseConnection::new("postgres://nobody@127.0.0.1:1/none", settings);
        let err = conn.health_check().await.unwrap_err();
        assert!(matches!(err, DatabaseError::Sqlx(_)));
        assert!(conn.is_marked_failed());
    }

    #[tokio::test]
    async fn hanging_connect_does_not_block_other_callers() {
        // Accepts TCP connections and never answers the startup message.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let settings = PoolSettings { max_connections: 1, acquire_timeout: Duration::from_secs(2) };
        let conn = std::sync::Arc::new(DatabaseConnection::new(&format!("postgres://nobody@127.0.0.1:{}/none", port), settings));
        let connecting = {
            let conn = conn.clone();
            tokio::spawn(async move { conn.pool().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;

        tokio::time::timeout(Duration::from_millis(200), conn.close())
            .await
            .expect("close waited on the connecting caller");
        connecting.abort();
    }
}
