//! Vigil: a health endpoint for MySQL and object-cache backed application
//! stacks.
//!
//! The [`health`] module holds the evaluation engine and its probe seams;
//! [`backends`] provides the MySQL, Redis and in-memory implementations; the
//! remaining modules wire it all into an axum service.

pub mod backends;
pub mod config;
pub mod error;
pub mod health;
pub mod http;
pub mod middleware;
pub mod routes;
pub mod state;
pub mod templates;

pub use config::AppConfig;
pub use error::{AppError, HealthError};
pub use health::{HealthChecker, HealthReport, HealthRequest, Status};
