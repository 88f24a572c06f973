//! HTTP client for forwarding requests to the real upstream

use std::time::Duration;

use http_body_util::{BodyExt, Full, LengthLimitError, Limited};
use hyper::body::Bytes;
use hyper::ext::ReasonPhrase;
use hyper::{Method, Request, Response, Uri};
use hyper_tls::HttpsConnector;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::{debug, warn};

use crate::config::Config;
use crate::recording::Upstream;
use crate::storage::{Headers, RecordedRequest, RecordedResponse, Status};
use crate::{ProxyError, Result};

/// HTTP(S) client for forwarding requests
pub struct HttpClient {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Option<Duration>,
    max_response_size: usize,
}

impl HttpClient {
    /// Create a new HTTP client
    #[must_use]
    pub fn new(timeout: Option<Duration>, max_response_size: usize) -> Self {
        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .pool_max_idle_per_host(10)
            .build(HttpsConnector::new());

        Self {
            client,
            timeout,
            max_response_size,
        }
    }

    /// Create a client with the timeout and limits from `config`
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.upstream_timeout_secs.map(Duration::from_secs),
            config.limits.max_response_size,
        )
    }

    /// Forward a request to the real upstream
    ///
    /// # Errors
    ///
    /// Returns `Upstream` if the request cannot be built, sent or read, times
    /// out, or its body exceeds the response limit
    pub async fn forward_request(&self, request: &RecordedRequest) -> Result<RecordedResponse> {
        let http_request = build_request(request)?;
        debug!(method = %request.method, uri = %request.uri, "Forwarding request");

        let pending = self.client.request(http_request);
        let response = match self.timeout {
            Some(timeout) => tokio::time::timeout(timeout, pending)
                .await
                .map_err(|_| {
                    warn!(uri = %request.uri, ?timeout, "Upstream timed out");
                    ProxyError::Upstream(format!("{} timed out after {timeout:?}", request.uri))
                })?,
            None => pending.await,
        }
        .map_err(|e| {
            warn!(uri = %request.uri, "Request failed: {e}");
            ProxyError::Upstream(format!("{}: {e}", request.uri))
        })?;

        self.capture(response).await
    }

    async fn capture(&self, response: Response<hyper::body::Incoming>) -> Result<RecordedResponse> {
        let status = Status {
            code: response.status().as_u16(),
            message: reason_phrase(&response),
        };
        let headers = collect_headers(response.headers());

        let body = Limited::new(response.into_body(), self.max_response_size)
            .collect()
            .await
            .map_err(|e| {
                if e.downcast_ref::<LengthLimitError>().is_some() {
                    ProxyError::Upstream(format!(
                        "Response body exceeds limit of {} bytes",
                        self.max_response_size
                    ))
                } else {
                    ProxyError::Upstream(format!("Failed to read response body: {e}"))
                }
            })?
            .to_bytes();

        Ok(RecordedResponse {
            status,
            headers,
            body,
        })
    }
}

impl Upstream for HttpClient {
    async fn send(&self, request: &RecordedRequest) -> Result<RecordedResponse> {
        self.forward_request(request).await
    }
}

/// Build the outbound hyper request from a recorded request
fn build_request(request: &RecordedRequest) -> Result<Request<Full<Bytes>>> {
    let uri = request
        .uri
        .parse::<Uri>()
        .map_err(|e| ProxyError::Upstream(format!("Invalid URI '{}': {e}", request.uri)))?;

    let method = request.method.parse::<Method>().map_err(|e| {
        ProxyError::Upstream(format!("Invalid HTTP method '{}': {e}", request.method))
    })?;

    let mut request_builder = Request::builder().method(method).uri(uri);
    for (name, values) in &request.headers {
        for value in values {
            request_builder = request_builder.header(name.as_str(), value.as_str());
        }
    }

    request_builder
        .body(Full::new(request.body.clone()))
        .map_err(|e| ProxyError::Upstream(format!("Failed to build request: {e}")))
}

/// Status message as sent by the upstream, or the canonical one
fn reason_phrase<B>(response: &Response<B>) -> String {
    response
        .extensions()
        .get::<ReasonPhrase>()
        .map(|reason| String::from_utf8_lossy(reason.as_bytes()).into_owned())
        .or_else(|| response.status().canonical_reason().map(str::to_string))
        .unwrap_or_default()
}

fn collect_headers(headers: &hyper::HeaderMap) -> Headers {
    let mut collected = Headers::new();
    for (name, value) in headers {
        collected
            .entry(name.as_str().to_string())
            .or_default()
            .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
    }
    collected
}
