//! End-user role switching against a live PostgreSQL.
//!
//! These tests need `DATABASE_URL` pointing at a database where the login role
//! may create roles (a local superuser is fine). Without it they are skipped.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use sqlx::Executor;

use geosearch::auth::AuthorizationContext;
use geosearch::database::security::INTERNAL_ROLE;
use geosearch::database::{ConnectionManager, DatabaseConnection, DatabaseError, EndUserSession, PoolSettings, RolePolicy};
use geosearch::query::{Operator, QueryDescriptor, SpatialQuery};
use geosearch::registry::DatasetRegistry;
use geosearch::search::{DatasourceError, FeatureSource, PgFeatureSource, SearchEngine, SearchRequest};
use geosearch::types::QueryPoint;

const KNOWN_USER: &str = "tester@example.com";
const KNOWN_ROLE: &str = "tester@example.com_role";

const SETUP: &str = r#"
DO $$
BEGIN
    PERFORM pg_advisory_xact_lock(7313);
    IF NOT EXISTS (SELECT FROM pg_roles WHERE rolname = 'medewerker_role') THEN
        CREATE ROLE medewerker_role;
    END IF;
    IF NOT EXISTS (SELECT FROM pg_roles WHERE rolname = 'tester@example.com_role') THEN
        CREATE ROLE "tester@example.com_role";
    END IF;
    EXECUTE format('GRANT medewerker_role, %I TO %I', 'tester@example.com_role', current_user);
END
$$;
"#;

fn policy() -> RolePolicy {
    RolePolicy { enabled: true, internal_domains: vec!["amsterdam.nl".to_string()] }
}

fn settings() -> PoolSettings {
    // One connection, so a later session reuses the one an earlier session held.
    PoolSettings { max_connections: 1, acquire_timeout: Duration::from_secs(5) }
}

fn user(email: &str) -> AuthorizationContext {
    AuthorizationContext::authenticated(Some("sub".to_string()), Some(email.to_string()), BTreeSet::new())
}

async fn database() -> Option<(String, DatabaseConnection)> {
    let Ok(url) = std::env::var("DATABASE_URL") else {
        eprintln!("DATABASE_URL not set, skipping");
        return None;
    };
    let conn = DatabaseConnection::new(&url, settings());
    conn.pool().await.unwrap().execute(SETUP).await.unwrap();
    Some((url, conn))
}

async fn current_user(session: &mut EndUserSession) -> String {
    sqlx::query_scalar("SELECT current_user::text")
        .fetch_one(session.connection().unwrap())
        .await
        .unwrap()
}

#[tokio::test]
async fn role_holds_inside_the_session_and_ends_with_it() {
    let Some((_, conn)) = database().await else { return };

    let mut session = EndUserSession::begin(&conn).await.unwrap();
    let login = current_user(&mut session).await;
    session.activate(&user(KNOWN_USER), &policy()).await.unwrap();
    assert_eq!(session.active_role(), Some(KNOWN_ROLE));
    assert_eq!(current_user(&mut session).await, KNOWN_ROLE);
    session.release().await.unwrap();

    let mut next = EndUserSession::begin(&conn).await.unwrap();
    assert_eq!(current_user(&mut next).await, login);
    next.release().await.unwrap();
}

#[tokio::test]
async fn dropped_session_does_not_leak_its_role() {
    let Some((_, conn)) = database().await else { return };

    let login = {
        let mut session = EndUserSession::begin(&conn).await.unwrap();
        let login = current_user(&mut session).await;
        session.activate(&user(KNOWN_USER), &policy()).await.unwrap();
        login
    };

    let mut next = EndUserSession::begin(&conn).await.unwrap();
    assert_eq!(current_user(&mut next).await, login);
    next.release().await.unwrap();
}

#[tokio::test]
async fn repeat_activation_for_the_same_identity_is_a_no_op() {
    let Some((_, conn)) = database().await else { return };

    let mut session = EndUserSession::begin(&conn).await.unwrap();
    let login = current_user(&mut session).await;
    session.activate(&user(KNOWN_USER), &policy()).await.unwrap();

    sqlx::query("SELECT set_config('role', 'none', true)")
        .execute(session.connection().unwrap())
        .await
        .unwrap();
    session.activate(&user(KNOWN_USER), &policy()).await.unwrap();
    assert_eq!(current_user(&mut session).await, login);
    assert_eq!(session.active_role(), Some(KNOWN_ROLE));

    session.activate(&user("collega@amsterdam.nl"), &policy()).await.unwrap();
    assert_eq!(current_user(&mut session).await, INTERNAL_ROLE);
    session.release().await.unwrap();
}

#[tokio::test]
async fn internal_identity_without_role_uses_internal_role() {
    let Some((_, conn)) = database().await else { return };

    let mut session = EndUserSession::begin(&conn).await.unwrap();
    session.activate(&user("nieuw@amsterdam.nl"), &policy()).await.unwrap();
    assert_eq!(session.active_role(), Some(INTERNAL_ROLE));
    assert_eq!(current_user(&mut session).await, INTERNAL_ROLE);
    session.release().await.unwrap();
}

#[tokio::test]
async fn external_identity_without_role_is_denied() {
    let Some((_, conn)) = database().await else { return };

    let mut session = EndUserSession::begin(&conn).await.unwrap();
    let login = current_user(&mut session).await;
    let err = session.activate(&user("onbekend@example.com"), &policy()).await.unwrap_err();
    assert!(matches!(err, DatabaseError::PermissionDenied(_)), "{:?}", err);
    assert_eq!(session.active_role(), None);

    // The failed switch leaves the transaction usable under the login role
    assert_eq!(current_user(&mut session).await, login);
    session.release().await.unwrap();
}

#[tokio::test]
async fn denied_role_yields_no_features() {
    let Some((url, _)) = database().await else { return };

    let descriptor =
        QueryDescriptor::new("fake", "fake_secret", ("public", "fake_secret"), "geometry", Operator::Within, "DSN_TEST")
            .with_role_switch(true);
    let dsns = BTreeMap::from([("DSN_TEST".to_string(), url)]);
    let source = Arc::new(PgFeatureSource::new(Arc::new(ConnectionManager::new(4, settings())), dsns, policy()));
    let stranger = user("onbekend@example.com");

    let query = SpatialQuery::new(QueryPoint::Projected { x: 123_282.6, y: 487_674.8 });
    let err = source.fetch(&descriptor, &query, &stranger).await.unwrap_err();
    assert!(matches!(err, DatasourceError::Database(DatabaseError::PermissionDenied(_))), "{:?}", err);

    let registry = Arc::new(DatasetRegistry::new(Vec::new(), "https://api.data.amsterdam.nl/", Duration::from_secs(300)));
    registry.register_static(descriptor);
    registry.ensure_fresh().await.unwrap();
    let engine = SearchEngine::new(registry, source, 2, Duration::from_secs(5));

    let mut request = SearchRequest::new(QueryPoint::Projected { x: 123_282.6, y: 487_674.8 });
    request.datasets = vec!["fake".to_string()];
    let features: Vec<_> = engine.search(request, stranger).unwrap().collect().await;
    assert!(features.is_empty());
}
