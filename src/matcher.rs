//! Request matching strategies
//!
//! The engine asks a [`MatchStrategy`] whether an incoming request is the
//! same call as a recorded one. Most routes use [`MatchStrategy::Strict`].
//! The legacy control protocol embeds per-session variables in every body,
//! so its route uses [`MatchStrategy::LegacyProtocol`], which only compares
//! the command mode and the target device.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::storage::{Interaction, RecordedRequest};
use crate::{ProxyError, Result};

/// Policy deciding whether two requests are the same call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchStrategy {
    /// URI, method and raw body must be byte-equal
    #[default]
    Strict,
    /// URI and method equal, plus equal `mode` and `Device name` tokens
    LegacyProtocol,
}

impl fmt::Display for MatchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Strict => f.write_str("strict"),
            Self::LegacyProtocol => f.write_str("legacy-protocol"),
        }
    }
}

impl MatchStrategy {
    /// Decide whether `incoming` is equivalent to the recorded `candidate`
    ///
    /// # Errors
    ///
    /// Returns `MatchAssertion` if the legacy-protocol tokens of either body
    /// cannot be determined unambiguously
    pub fn matches(self, incoming: &RecordedRequest, candidate: &RecordedRequest) -> Result<bool> {
        match self {
            Self::Strict => Ok(strict_match(incoming, candidate)),
            Self::LegacyProtocol => {
                if !same_target(incoming, candidate) {
                    return Ok(false);
                }
                let ours = LegacyTokens::extract(incoming.body())?;
                let theirs = LegacyTokens::extract(candidate.body())?;
                Ok(ours == theirs)
            }
        }
    }

    /// First interaction, in recording order, whose request matches
    ///
    /// # Errors
    ///
    /// Propagates match assertion failures
    pub fn find<'a>(
        self,
        incoming: &RecordedRequest,
        interactions: &'a [Interaction],
    ) -> Result<Option<&'a Interaction>> {
        for interaction in interactions {
            if self.matches(incoming, &interaction.request)? {
                return Ok(Some(interaction));
            }
        }
        Ok(None)
    }
}

fn same_target(a: &RecordedRequest, b: &RecordedRequest) -> bool {
    a.uri == b.uri && a.method == b.method
}

fn strict_match(a: &RecordedRequest, b: &RecordedRequest) -> bool {
    same_target(a, b) && a.body == b.body
}

/// Tokens the legacy-protocol matcher compares
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LegacyTokens {
    /// Command mode, e.g. `request` or `abort`
    pub mode: Option<String>,
    /// Name of the first addressed device
    pub device: Option<String>,
}

impl LegacyTokens {
    /// Extract tokens from an escaped-XML body. No body means no tokens.
    ///
    /// # Errors
    ///
    /// Returns `MatchAssertion` if the body is not UTF-8 or carries two
    /// different modes
    pub fn extract(body: Option<&[u8]>) -> Result<Self> {
        let Some(body) = body else {
            return Ok(Self::default());
        };

        let text = std::str::from_utf8(body).map_err(|e| {
            ProxyError::MatchAssertion(format!("legacy-protocol body is not UTF-8: {e}"))
        })?;

        let mut mode: Option<&str> = None;
        for captures in mode_regex().captures_iter(text) {
            let found = captures.get(1).map_or("", |m| m.as_str());
            match mode {
                Some(existing) if existing != found => {
                    return Err(ProxyError::MatchAssertion(format!(
                        "conflicting modes in one request: {existing:?} and {found:?}"
                    )));
                }
                _ => mode = Some(found),
            }
        }

        // Requests may address several devices; the first one identifies the call.
        let device = device_regex()
            .captures(text)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str().to_string());

        Ok(Self {
            mode: mode.map(str::to_string),
            device,
        })
    }
}

fn mode_regex() -> &'static Regex {
    static MODE: OnceLock<Regex> = OnceLock::new();
    MODE.get_or_init(|| Regex::new(r"mode=&quot;([a-zA-Z]+)&quot;").expect("valid mode regex"))
}

fn device_regex() -> &'static Regex {
    static DEVICE: OnceLock<Regex> = OnceLock::new();
    DEVICE.get_or_init(|| {
        Regex::new(r"&lt;Device name=&quot;(.+?)&quot;").expect("valid device regex")
    })
}
