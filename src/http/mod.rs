//! HTTP server with optional TLS.
//!
//! Two listener modes:
//! - **None (default)**: Plain HTTP, typically behind a proxy or load balancer
//! - **Manual**: User-provided certificate and key files, hot-reloaded on SIGHUP
//!
//! Both drain connections gracefully on SIGTERM/SIGINT.

mod server;
mod shutdown;

pub use server::{start_server, ServerError};
