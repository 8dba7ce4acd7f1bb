pub mod connection;
pub mod manager;
pub mod retry;
pub mod row;
pub mod security;

pub use connection::DatabaseConnection;
pub use manager::{ConnectionManager, DatabaseError, PoolSettings};
pub use retry::{retry_on_transient_error, RetryPolicy, Retryable};
pub use security::{EndUserSession, RolePolicy};
