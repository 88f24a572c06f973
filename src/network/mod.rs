//! Network layer for vcr-proxy
//!
//! Inbound HTTP/1.1 serving with bounded concurrency, and the outbound
//! HTTP(S) client used to reach real upstreams.

mod client;
mod connection_pool;
mod handler;
mod http;

pub use client::HttpClient;
pub use connection_pool::{ConnectionGuard, ConnectionPool};
pub use handler::NetworkHandler;
pub use http::HttpHandler;

/// Graceful shutdown timeout for open connections
pub const SHUTDOWN_TIMEOUT_MS: u64 = 5000;
