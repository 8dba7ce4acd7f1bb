pub mod auth;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod query;
pub mod registry;
pub mod search;
pub mod types;

pub use error::ApiError;
pub use handlers::{app, AppState};
