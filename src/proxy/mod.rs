//! Proxy handler: routing, response translation and service-location rewriting

mod http;
mod rewrite;
mod routes;

pub use http::{HttpProxy, InboundRequest, ProxyResponse};
pub use rewrite::{is_forwarded_header, response_headers, rewrite_service_location};
pub use routes::RouteTable;
