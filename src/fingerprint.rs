//! Request fingerprinting for log correlation

use sha2::{Digest, Sha256};

use crate::storage::RecordedRequest;

/// Compute SHA-256 fingerprint of a request
///
/// The fingerprint covers exactly what the strict matcher compares:
/// 1. Method (uppercase normalized)
/// 2. URI
/// 3. Body
///
/// Two requests the strict matcher treats as equal share a fingerprint, so
/// record and replay log lines for the same call line up.
#[must_use]
pub fn fingerprint_request(request: &RecordedRequest) -> [u8; 32] {
    let mut hasher = Sha256::new();

    let method = request.method.to_uppercase();
    hasher.update((method.len() as u32).to_le_bytes());
    hasher.update(method.as_bytes());

    hasher.update((request.uri.len() as u32).to_le_bytes());
    hasher.update(request.uri.as_bytes());

    hasher.update((request.body.len() as u32).to_le_bytes());
    hasher.update(&request.body);

    hasher.finalize().into()
}

/// Short hex form of a fingerprint for log lines
#[must_use]
pub fn short_id(request: &RecordedRequest) -> String {
    hex::encode(&fingerprint_request(request)[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{headers_from_pairs, Headers};
    use bytes::Bytes;

    fn test_request() -> RecordedRequest {
        RecordedRequest::new("GET", "http://example.com/api/test", Headers::new(), Bytes::new())
    }

    #[test]
    fn test_fingerprint_deterministic() {
        let request = test_request();
        assert_eq!(
            fingerprint_request(&request),
            fingerprint_request(&request),
            "Fingerprint must be deterministic"
        );
    }

    #[test]
    fn test_fingerprint_method_case_insensitive() {
        let mut lower = test_request();
        lower.method = "get".to_string();

        assert_eq!(fingerprint_request(&lower), fingerprint_request(&test_request()));
    }

    #[test]
    fn test_fingerprint_different_methods() {
        let mut post = test_request();
        post.method = "POST".to_string();

        assert_ne!(
            fingerprint_request(&post),
            fingerprint_request(&test_request()),
            "Different methods should produce different hashes"
        );
    }

    #[test]
    fn test_fingerprint_different_bodies() {
        let mut req1 = test_request();
        req1.body = Bytes::from_static(b"a");
        let mut req2 = test_request();
        req2.body = Bytes::from_static(b"b");

        assert_ne!(fingerprint_request(&req1), fingerprint_request(&req2));
    }

    #[test]
    fn test_fingerprint_ignores_headers() {
        let mut with_headers = test_request();
        with_headers.headers = headers_from_pairs([("Cookie", "session=1")]);

        assert_eq!(
            fingerprint_request(&with_headers),
            fingerprint_request(&test_request())
        );
    }

    #[test]
    fn test_length_prefix_prevents_collisions() {
        let req1 = RecordedRequest::new("GET", "http://a/b", Headers::new(), Bytes::from_static(b"c"));
        let req2 = RecordedRequest::new("GET", "http://a/bc", Headers::new(), Bytes::new());

        assert_ne!(fingerprint_request(&req1), fingerprint_request(&req2));
    }

    #[test]
    fn test_short_id() {
        assert_eq!(short_id(&test_request()).len(), 16);
    }
}
