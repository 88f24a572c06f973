//! HTTP proxy with recording and replay

use bytes::Bytes;
use tracing::{debug, info};

use crate::config::Config;
use crate::matcher::MatchStrategy;
use crate::recording::{EngineStats, RecordReplayEngine, Upstream};
use crate::storage::{headers_from_pairs, Interaction, RecordedRequest};
use crate::{ProxyError, Result};

use super::rewrite::{is_forwarded_header, response_headers, rewrite_service_location};
use super::routes::RouteTable;

/// Inbound request as seen by the proxy, independent of the HTTP stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRequest {
    /// HTTP method
    pub method: String,
    /// Request path without query
    pub path: String,
    /// Raw query string without the leading `?`
    pub query: Option<String>,
    /// Request headers in arrival order
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Bytes,
}

impl InboundRequest {
    /// Create a request with no headers and no body
    #[must_use]
    pub fn new(method: impl Into<String>, path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.split_once('?') {
            Some((path, query)) => (path.to_string(), Some(query.to_string())),
            None => (path_and_query.to_string(), None),
        };

        Self {
            method: method.into(),
            path,
            query,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Add a header
    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header, case-insensitive
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Check if the query carries a `wsdl` argument
    #[must_use]
    pub fn is_metadata_fetch(&self) -> bool {
        self.method.eq_ignore_ascii_case("GET")
            && self.query.as_deref().is_some_and(|query| {
                query.split('&').any(|pair| {
                    let key = pair.split_once('=').map_or(pair, |(k, _)| k);
                    urlencoding::decode(key).is_ok_and(|k| k == "wsdl")
                })
            })
    }

    fn path_and_query(&self) -> String {
        match &self.query {
            Some(query) => format!("{}?{query}", self.path),
            None => self.path.clone(),
        }
    }
}

/// Response handed back to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyResponse {
    /// Status code
    pub status: u16,
    /// Status message, copied verbatim from the recording
    pub reason: String,
    /// Response headers
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
}

/// HTTP proxy that routes inbound calls through the record/replay engine
pub struct HttpProxy<U> {
    routes: RouteTable,
    legacy_routes: Vec<String>,
    public_base_url: String,
    engine: RecordReplayEngine<U>,
}

impl<U: Upstream> HttpProxy<U> {
    /// Create a new HTTP proxy
    #[must_use]
    pub fn new(config: &Config, engine: RecordReplayEngine<U>) -> Self {
        Self {
            routes: RouteTable::new(config.routes.clone()),
            legacy_routes: config.legacy_protocol_routes.clone(),
            public_base_url: config.public_base_url(),
            engine,
        }
    }

    /// Handle one inbound request
    ///
    /// # Errors
    ///
    /// Returns `MethodNotAllowed` for methods other than GET and POST,
    /// `RouteNotFound` for unknown paths, and any engine error
    pub async fn handle_request(&self, request: InboundRequest) -> Result<ProxyResponse> {
        let method = request.method.to_ascii_uppercase();
        if method != "GET" && method != "POST" {
            return Err(ProxyError::MethodNotAllowed(request.method));
        }

        let Some(real_host) = self.routes.resolve(&request.path) else {
            return Err(ProxyError::RouteNotFound(request.path));
        };

        let metadata = request.is_metadata_fetch();
        if metadata {
            debug!(path = %request.path, "Service definition fetch");
        } else if method == "POST" {
            match request.header("SOAPAction") {
                Some(action) => info!(path = %request.path, soap_action = %action, "SOAP method call"),
                None => debug!(path = %request.path, "POST"),
            }
        } else {
            debug!(path = %request.path, "GET");
        }

        let strategy = self.strategy_for(&method, &request.path);
        let outbound = RecordedRequest::new(
            method,
            format!("{real_host}{}", request.path_and_query()),
            headers_from_pairs(
                request
                    .headers
                    .iter()
                    .filter(|(name, _)| is_forwarded_header(name))
                    .map(|(name, value)| (name.as_str(), value.as_str())),
            ),
            request.body,
        );

        let interaction = self.engine.exchange(outbound, strategy).await?;
        Ok(self.translate(interaction, metadata.then_some(real_host)))
    }

    fn strategy_for(&self, method: &str, path: &str) -> MatchStrategy {
        if method == "POST" && self.legacy_routes.iter().any(|route| route == path) {
            MatchStrategy::LegacyProtocol
        } else {
            MatchStrategy::Strict
        }
    }

    fn translate(&self, interaction: Interaction, rewrite_host: Option<&str>) -> ProxyResponse {
        let response = interaction.response;
        let body = match rewrite_host {
            Some(real_host) => {
                rewrite_service_location(&response.body, real_host, &self.public_base_url)
            }
            None => response.body,
        };

        ProxyResponse {
            status: response.status.code,
            reason: response.status.message,
            headers: response_headers(&response.headers),
            body,
        }
    }

    /// Route table in use
    #[must_use]
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    /// Replay/record counters of the underlying engine
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        self.engine.stats()
    }
}
