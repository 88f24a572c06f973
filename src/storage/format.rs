//! Cassette document format
//!
//! A cassette is one YAML document holding every recorded interaction in
//! recording order. Bodies are stored as readable text when they are UTF-8
//! and hex-encoded otherwise, so the file stays diffable.

use std::collections::BTreeMap;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current cassette document version
pub const CASSETTE_VERSION: u32 = 1;

/// Header name to every value seen for it, in arrival order
pub type Headers = BTreeMap<String, Vec<String>>;

/// Build a header multimap from name/value pairs
#[must_use]
pub fn headers_from_pairs<I, K, V>(pairs: I) -> Headers
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let mut headers = Headers::new();
    for (name, value) in pairs {
        headers.entry(name.into()).or_default().push(value.into());
    }
    headers
}

/// Recorded outbound request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedRequest {
    /// HTTP method
    pub method: String,
    /// Full upstream URI
    pub uri: String,
    /// Request headers
    #[serde(default)]
    pub headers: Headers,
    /// Request body, empty when absent
    #[serde(default, with = "body_repr")]
    pub body: Bytes,
}

impl RecordedRequest {
    /// Create a recorded request
    #[must_use]
    pub fn new(method: impl Into<String>, uri: impl Into<String>, headers: Headers, body: Bytes) -> Self {
        Self {
            method: method.into(),
            uri: uri.into(),
            headers,
            body,
        }
    }

    /// Body bytes, or `None` if the request carried no body
    #[must_use]
    pub fn body(&self) -> Option<&[u8]> {
        if self.body.is_empty() {
            None
        } else {
            Some(&self.body)
        }
    }
}

/// Status line of a recorded response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    /// Status code
    pub code: u16,
    /// Reason phrase as sent by the upstream
    pub message: String,
}

/// Recorded upstream response
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordedResponse {
    /// Status line
    pub status: Status,
    /// Response headers
    #[serde(default)]
    pub headers: Headers,
    /// Response body
    #[serde(default, with = "body_repr")]
    pub body: Bytes,
}

/// One recorded request/response pair
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Interaction {
    /// Request as sent upstream
    pub request: RecordedRequest,
    /// Response as received from upstream
    pub response: RecordedResponse,
    /// When the interaction was captured
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recorded_at: Option<DateTime<Utc>>,
}

impl Interaction {
    /// Create an interaction stamped with the current time
    #[must_use]
    pub fn new(request: RecordedRequest, response: RecordedResponse) -> Self {
        Self {
            request,
            response,
            recorded_at: Some(Utc::now()),
        }
    }
}

/// Ordered collection of interactions persisted as one file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cassette {
    /// Document version
    #[serde(default = "default_version")]
    pub version: u32,
    /// Interactions in recording order
    #[serde(default)]
    pub interactions: Vec<Interaction>,
}

fn default_version() -> u32 {
    CASSETTE_VERSION
}

impl Default for Cassette {
    fn default() -> Self {
        Self {
            version: CASSETTE_VERSION,
            interactions: Vec::new(),
        }
    }
}

impl Cassette {
    /// Append a newly recorded interaction
    pub fn append(&mut self, interaction: Interaction) {
        self.interactions.push(interaction);
    }

    /// Number of recorded interactions
    #[must_use]
    pub fn len(&self) -> usize {
        self.interactions.len()
    }

    /// Check if nothing has been recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.interactions.is_empty()
    }
}

mod body_repr {
    use bytes::Bytes;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    struct BodyRepr {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        string: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hex: Option<String>,
    }

    pub fn serialize<S: Serializer>(body: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        if body.is_empty() {
            return serializer.serialize_none();
        }

        let repr = match std::str::from_utf8(body) {
            Ok(text) => BodyRepr {
                string: Some(text.to_string()),
                hex: None,
            },
            Err(_) => BodyRepr {
                string: None,
                hex: Some(hex::encode(body)),
            },
        };
        serializer.serialize_some(&repr)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        match Option::<BodyRepr>::deserialize(deserializer)? {
            Some(BodyRepr {
                string: Some(text), ..
            }) => Ok(Bytes::from(text)),
            Some(BodyRepr { hex: Some(hex), .. }) => hex::decode(hex)
                .map(Bytes::from)
                .map_err(|e| D::Error::custom(format!("invalid hex body: {e}"))),
            _ => Ok(Bytes::new()),
        }
    }
}
