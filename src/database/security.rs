//! Per-query end-user database roles.
//!
//! A session owns one pooled connection inside a transaction. Roles are set with
//! transaction-local `set_config`, so they end with the transaction: on
//! [`EndUserSession::release`], on error paths, and when the session is dropped.

use sqlx::postgres::PgConnection;
use sqlx::{Postgres, Transaction};
use tracing::debug;

use super::connection::DatabaseConnection;
use super::manager::DatabaseError;
use crate::auth::AuthorizationContext;
use crate::config::DatabaseConfig;

pub const INTERNAL_ROLE: &str = "medewerker_role";
pub const ANONYMOUS_ROLE: &str = "anonymous_role";
pub const ANONYMOUS_APP_NAME: &str = "geosearch-openbaar";

const SWITCH_SAVEPOINT: &str = "geosearch_role_switch";

pub fn user_role(identity: &str) -> String {
    format!("{}_role", identity)
}

/// When and how role switching applies.
#[derive(Debug, Clone, Default)]
pub struct RolePolicy {
    pub enabled: bool,
    pub internal_domains: Vec<String>,
}

impl RolePolicy {
    pub fn from_config(config: &DatabaseConfig) -> Self {
        Self { enabled: config.set_role, internal_domains: config.internal_domains.clone() }
    }

    pub fn applies_to(&self, requires_role_switch: bool) -> bool {
        self.enabled && requires_role_switch
    }

    pub fn is_internal(&self, identity: &str) -> bool {
        let identity = identity.to_ascii_lowercase();
        self.internal_domains
            .iter()
            .any(|d| identity.ends_with(&format!("@{}", d.to_ascii_lowercase())))
    }
}

/// The role chosen for one caller, before the database has confirmed it exists.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTarget {
    pub role: String,
    pub application_name: String,
    /// Role to use if `role` does not exist.
    pub fallback: Option<String>,
}

impl RoleTarget {
    pub fn for_identity(identity: Option<&str>, policy: &RolePolicy) -> Self {
        match identity {
            None => Self {
                role: ANONYMOUS_ROLE.to_string(),
                application_name: ANONYMOUS_APP_NAME.to_string(),
                fallback: None,
            },
            Some(identity) => Self {
                role: user_role(identity),
                application_name: identity.to_string(),
                fallback: policy.is_internal(identity).then(|| INTERNAL_ROLE.to_string()),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ActiveRole {
    identity: Option<String>,
    role: String,
}

pub struct EndUserSession {
    tx: Option<Transaction<'static, Postgres>>,
    active: Option<ActiveRole>,
}

impl EndUserSession {
    /// Take an exclusive connection from `conn` and open a transaction on it.
    pub async fn begin(conn: &DatabaseConnection) -> Result<Self, DatabaseError> {
        let tx = conn.begin().await?;
        Ok(Self { tx: Some(tx), active: None })
    }

    pub fn active_role(&self) -> Option<&str> {
        self.active.as_ref().map(|a| a.role.as_str())
    }

    /// Switch to the caller's role. A repeat call for the same identity is a no-op.
    pub async fn activate(&mut self, auth: &AuthorizationContext, policy: &RolePolicy) -> Result<(), DatabaseError> {
        let identity = auth.identity().map(str::to_string);
        if self.active.as_ref().is_some_and(|a| a.identity == identity) {
            debug!("End-user already set, no need to switch roles again");
            return Ok(());
        }

        let target = RoleTarget::for_identity(identity.as_deref(), policy);
        let role = match self.set_role(&target.role, &target.application_name).await {
            Ok(()) => target.role,
            Err(DatabaseError::RoleNotFound(missing)) => match target.fallback {
                Some(fallback) => {
                    debug!("No role {}, using internal role for {}", missing, target.application_name);
                    self.set_role(&fallback, &target.application_name).await?;
                    fallback
                }
                None => {
                    return Err(DatabaseError::PermissionDenied(format!(
                        "User {} is not available in database",
                        target.application_name
                    )))
                }
            },
            Err(e) => return Err(e),
        };

        debug!("Activated end-user database role '{}' for '{}'", role, target.application_name);
        self.active = Some(ActiveRole { identity, role });
        Ok(())
    }

    async fn set_role(&mut self, role: &str, application_name: &str) -> Result<(), DatabaseError> {
        let conn = self.connection()?;
        sqlx::query(&format!("SAVEPOINT {}", SWITCH_SAVEPOINT)).execute(&mut *conn).await?;

        let switched = sqlx::query("SELECT set_config('role', $1, true), set_config('application_name', $2, true)")
            .bind(role)
            .bind(application_name)
            .execute(&mut *conn)
            .await;

        match switched {
            Ok(_) => {
                sqlx::query(&format!("RELEASE SAVEPOINT {}", SWITCH_SAVEPOINT)).execute(&mut *conn).await?;
                Ok(())
            }
            Err(e) => {
                debug!("Switch role failed for {}: {}", role, e);
                sqlx::query(&format!("ROLLBACK TO SAVEPOINT {}", SWITCH_SAVEPOINT)).execute(&mut *conn).await?;
                Err(classify_role_error(role, e))
            }
        }
    }

    /// The session's connection, for running queries under the active role.
    pub fn connection(&mut self) -> Result<&mut PgConnection, DatabaseError> {
        match self.tx.as_mut() {
            Some(tx) => Ok(&mut **tx),
            None => Err(DatabaseError::SessionClosed),
        }
    }

    /// Roll back the transaction, dropping any role. Safe to call once per session.
    pub async fn release(mut self) -> Result<(), DatabaseError> {
        if let Some(tx) = self.tx.take() {
            if let Some(active) = &self.active {
                debug!("End-user rollback for {}", active.role);
            }
            tx.rollback().await?;
        }
        Ok(())
    }
}

fn classify_role_error(role: &str, err: sqlx::Error) -> DatabaseError {
    let code = match &err {
        sqlx::Error::Database(db) => db.code().map(|c| c.into_owned()),
        _ => None,
    };
    match code.as_deref() {
        Some("22023") | Some("42704") => DatabaseError::RoleNotFound(role.to_string()),
        Some("42501") => DatabaseError::PermissionDenied(format!("cannot assume role {}", role)),
        _ => DatabaseError::Sqlx(err),
    }
}
