//! Record/replay engine
//!
//! Every inbound call goes through [`RecordReplayEngine::exchange`]:
//!
//! 1. resolve the current cassette (rotating it when stale),
//! 2. look for a matching interaction and replay it if present,
//! 3. otherwise forward to the real upstream exactly once,
//! 4. record and persist the captured response,
//! 5. select the interaction to serve by matching again against the updated
//!    cassette, so fresh and replayed calls share one code path.
//!
//! All five steps run under one lock. Concurrent first-time calls for the
//! same request therefore produce a single upstream call and a single
//! recorded interaction.

use std::sync::atomic::{AtomicUsize, Ordering};

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Mode;
use crate::fingerprint::short_id;
use crate::matcher::MatchStrategy;
use crate::storage::{CassetteStore, Interaction, RecordedRequest};
use crate::{ProxyError, Result};

use super::session::CassetteSession;
use super::Upstream;

/// Value written to the cassette in place of redacted request headers
pub const REDACTED: &str = "<redacted>";

/// Orchestrates lookup, forwarding, recording and response selection
pub struct RecordReplayEngine<U> {
    store: CassetteStore,
    upstream: U,
    mode: Mode,
    redacted_headers: Vec<String>,
    session: Mutex<CassetteSession>,
    replayed: AtomicUsize,
    recorded: AtomicUsize,
}

impl<U: Upstream> RecordReplayEngine<U> {
    /// Create a new engine
    #[must_use]
    pub fn new(store: CassetteStore, upstream: U, mode: Mode) -> Self {
        Self {
            store,
            upstream,
            mode,
            redacted_headers: Vec::new(),
            session: Mutex::new(CassetteSession::new()),
            replayed: AtomicUsize::new(0),
            recorded: AtomicUsize::new(0),
        }
    }

    /// Request headers whose values are replaced with [`REDACTED`] in the cassette
    #[must_use]
    pub fn with_redacted_headers(mut self, headers: &[String]) -> Self {
        self.redacted_headers = headers.iter().map(|h| h.to_ascii_lowercase()).collect();
        self
    }

    /// Upstream unseen requests are forwarded to
    #[must_use]
    pub fn upstream(&self) -> &U {
        &self.upstream
    }

    /// Serve `request` from the cassette, recording it first if unseen
    ///
    /// # Errors
    ///
    /// Returns `RecordingNotFound` on a replay-mode miss, `Upstream` if the
    /// real endpoint could not be reached, and cassette or match errors
    pub async fn exchange(
        &self,
        request: RecordedRequest,
        strategy: MatchStrategy,
    ) -> Result<Interaction> {
        let id = short_id(&request);
        let mut session = self.session.lock().await;
        session.refresh(&self.store, self.mode)?;

        if let Some(found) = strategy.find(&request, session.interactions())? {
            self.replayed.fetch_add(1, Ordering::Relaxed);
            debug!(
                id = %id,
                method = %request.method,
                uri = %request.uri,
                %strategy,
                status = found.response.status.code,
                "Replaying recorded interaction"
            );
            return Ok(found.clone());
        }

        if self.mode.is_replay() {
            warn!(id = %id, method = %request.method, uri = %request.uri, "Replay miss");
            return Err(not_found(&request));
        }

        info!(id = %id, method = %request.method, uri = %request.uri, "Forwarding to upstream");
        let response = self.upstream.send(&request).await?;
        let status = response.status.code;

        session.record(
            &self.store,
            Interaction::new(self.redact(&request), response),
        )?;
        self.recorded.fetch_add(1, Ordering::Relaxed);

        info!(
            id = %id,
            status,
            interactions = session.interactions().len(),
            "Recorded upstream response"
        );

        strategy
            .find(&request, session.interactions())?
            .cloned()
            .ok_or_else(|| not_found(&request))
    }

    fn redact(&self, request: &RecordedRequest) -> RecordedRequest {
        let mut recorded = request.clone();
        if self.redacted_headers.is_empty() {
            return recorded;
        }

        for (name, values) in &mut recorded.headers {
            if self.redacted_headers.contains(&name.to_ascii_lowercase()) {
                values.iter_mut().for_each(|v| *v = REDACTED.to_string());
            }
        }
        recorded
    }

    /// Replay/record counters
    #[must_use]
    pub fn stats(&self) -> EngineStats {
        EngineStats {
            replayed: self.replayed.load(Ordering::Relaxed),
            recorded: self.recorded.load(Ordering::Relaxed),
        }
    }
}

fn not_found(request: &RecordedRequest) -> ProxyError {
    ProxyError::RecordingNotFound {
        method: request.method.clone(),
        uri: request.uri.clone(),
    }
}

/// Engine statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Calls served from the cassette without touching the network
    pub replayed: usize,
    /// Calls forwarded upstream and recorded
    pub recorded: usize,
}
