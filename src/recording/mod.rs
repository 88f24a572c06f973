//! Record/replay engine: the stateful core of the proxy

mod engine;
mod session;

use std::future::Future;

pub use engine::{EngineStats, RecordReplayEngine};
pub use session::CassetteSession;

use crate::storage::{RecordedRequest, RecordedResponse};
use crate::Result;

/// Real endpoint the engine forwards unseen requests to
pub trait Upstream: Send + Sync {
    /// Send `request` to the real upstream and capture its full response.
    ///
    /// Non-2xx responses are successes here: they are recorded like any
    /// other. Only transport failures are errors.
    fn send(&self, request: &RecordedRequest) -> impl Future<Output = Result<RecordedResponse>> + Send;
}
