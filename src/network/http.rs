//! HTTP/1.1 connection handling and response translation

use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::{Bytes, Incoming};
use hyper::ext::ReasonPhrase;
use hyper::header::{HeaderName, HeaderValue};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::config::LimitsConfig;
use crate::proxy::{HttpProxy, InboundRequest, ProxyResponse};
use crate::recording::Upstream;
use crate::{ProxyError, Result};

use super::SHUTDOWN_TIMEOUT_MS;

/// HTTP handler for processing connections
pub struct HttpHandler;

impl HttpHandler {
    /// Serve every request on one inbound connection until it closes or
    /// shutdown is signalled
    ///
    /// # Errors
    ///
    /// Returns error if the connection fails at the protocol level
    pub async fn handle_connection<U>(
        stream: TcpStream,
        proxy: Arc<HttpProxy<U>>,
        limits: Arc<LimitsConfig>,
        mut shutdown_rx: broadcast::Receiver<()>,
    ) -> Result<()>
    where
        U: Upstream + 'static,
    {
        let io = TokioIo::new(stream);

        // Each request runs in its own task so a client hanging up cannot
        // abandon an upstream call before it is recorded.
        let service = service_fn(move |request| {
            let proxy = Arc::clone(&proxy);
            let limits = Arc::clone(&limits);
            let task = tokio::spawn(async move {
                Self::serve_request(request, &proxy, &limits).await
            });

            async move {
                let response = task.await.unwrap_or_else(|e| {
                    error!("Request task failed: {e}");
                    Self::error_response(&ProxyError::Other(format!("Request task failed: {e}")))
                });
                Ok::<_, Infallible>(response)
            }
        });

        let conn = http1::Builder::new().serve_connection(io, service);
        tokio::pin!(conn);

        tokio::select! {
            result = &mut conn => {
                result.map_err(|e| ProxyError::Other(format!("Connection error: {e}")))?;
            }
            _ = shutdown_rx.recv() => {
                debug!("Shutdown signal received, closing connection");
                conn.as_mut().graceful_shutdown();
                tokio::time::timeout(Duration::from_millis(SHUTDOWN_TIMEOUT_MS), conn)
                    .await
                    .ok();
            }
        }

        Ok(())
    }

    /// Run one request through the proxy, mapping failures to error responses
    pub async fn serve_request<U: Upstream>(
        request: Request<Incoming>,
        proxy: &HttpProxy<U>,
        limits: &LimitsConfig,
    ) -> Response<Full<Bytes>> {
        let method = request.method().clone();
        let uri = request.uri().clone();

        let response = match Self::proxy_request(request, proxy, limits).await {
            Ok(response) => response,
            Err(e) => {
                match &e {
                    ProxyError::RouteNotFound(_) | ProxyError::MethodNotAllowed(_) => {
                        warn!(%method, %uri, "{e}");
                    }
                    _ => error!(%method, %uri, "{e}"),
                }
                Self::error_response(&e)
            }
        };

        info!(%method, %uri, status = response.status().as_u16(), "Handled request");
        response
    }

    async fn proxy_request<U: Upstream>(
        request: Request<Incoming>,
        proxy: &HttpProxy<U>,
        limits: &LimitsConfig,
    ) -> Result<Response<Full<Bytes>>> {
        Self::validate_request(&request, limits)?;

        let (parts, body) = request.into_parts();
        let body = Self::read_body(body, limits.max_request_size).await?;

        let inbound = InboundRequest {
            method: parts.method.as_str().to_string(),
            path: parts.uri.path().to_string(),
            query: parts.uri.query().map(str::to_string),
            headers: parts
                .headers
                .iter()
                .map(|(name, value)| {
                    (
                        name.as_str().to_string(),
                        String::from_utf8_lossy(value.as_bytes()).into_owned(),
                    )
                })
                .collect(),
            body,
        };

        let response = proxy.handle_request(inbound).await?;
        Self::into_response(response)
    }

    /// Build the outbound hyper response, carrying the recorded status
    /// message when it differs from the canonical one
    ///
    /// # Errors
    ///
    /// Returns error if the recorded status code is not a valid HTTP status
    pub fn into_response(response: ProxyResponse) -> Result<Response<Full<Bytes>>> {
        let status = StatusCode::from_u16(response.status).map_err(|e| {
            ProxyError::Other(format!("Invalid recorded status {}: {e}", response.status))
        })?;

        let mut http_response = Response::new(Full::new(response.body));
        *http_response.status_mut() = status;

        for (name, value) in &response.headers {
            match (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(value)) => {
                    http_response.headers_mut().append(name, value);
                }
                _ => warn!(header = %name, "Skipping invalid recorded header"),
            }
        }

        if !response.reason.is_empty() && status.canonical_reason() != Some(response.reason.as_str()) {
            match ReasonPhrase::try_from(response.reason) {
                Ok(reason) => {
                    http_response.extensions_mut().insert(reason);
                }
                Err(e) => warn!("Skipping invalid status message: {e}"),
            }
        }

        Ok(http_response)
    }

    /// Create a plain-text response
    #[must_use]
    pub fn create_response(status: StatusCode, body: &str) -> Response<Full<Bytes>> {
        let mut response = Response::new(Full::new(Bytes::from(body.to_string())));
        *response.status_mut() = status;
        response.headers_mut().insert(
            hyper::header::CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        response
    }

    /// Create an error response
    #[must_use]
    pub fn error_response(error: &ProxyError) -> Response<Full<Bytes>> {
        Self::create_response(Self::status_for(error), &error.to_string())
    }

    /// HTTP status returned to the caller for an error
    #[must_use]
    pub fn status_for(error: &ProxyError) -> StatusCode {
        match error {
            ProxyError::MethodNotAllowed(_) => StatusCode::METHOD_NOT_ALLOWED,
            ProxyError::RecordingNotFound { .. } => StatusCode::NOT_FOUND,
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::DataTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::RouteNotFound(_)
            | ProxyError::MatchAssertion(_)
            | ProxyError::CorruptCassette { .. }
            | ProxyError::Io(_)
            | ProxyError::ConfigError(_)
            | ProxyError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Parse and validate an incoming request
    ///
    /// # Errors
    ///
    /// Returns error if request is invalid or too large
    pub fn validate_request<B>(request: &Request<B>, limits: &LimitsConfig) -> Result<()> {
        if let Some(length) = request
            .headers()
            .get(hyper::header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<usize>().ok())
        {
            if length > limits.max_request_size {
                return Err(ProxyError::DataTooLarge {
                    size: length,
                    limit: limits.max_request_size,
                });
            }
        }

        let header_count = request.headers().len();
        if header_count > limits.max_headers {
            return Err(ProxyError::Other(format!(
                "Too many headers: {header_count}"
            )));
        }

        Ok(())
    }

    /// Read request body with size limit
    ///
    /// # Errors
    ///
    /// Returns error if body is too large or read fails
    pub async fn read_body<B>(body: B, max_size: usize) -> Result<Bytes>
    where
        B: hyper::body::Body,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let collected = Limited::new(body, max_size).collect().await.map_err(|e| {
            if e.downcast_ref::<LengthLimitError>().is_some() {
                ProxyError::DataTooLarge {
                    size: max_size.saturating_add(1),
                    limit: max_size,
                }
            } else {
                ProxyError::Other(format!("Failed to read body: {e}"))
            }
        })?;

        Ok(collected.to_bytes())
    }
}
