//! # Request Signing
//!
//! Slack signs every request with `v0=hex(hmac_sha256(secret, "v0:{ts}:{body}"))`.
//! [`verify_slack_signature`] checks that signature before any Slack route
//! sees the body.

use crate::AppState;
use axum::{
    body::{to_bytes, Body},
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::Response,
};
use ring::hmac;
use std::sync::Arc;
use thiserror::Error;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";

/// Slack payloads are small; anything bigger is rejected before hashing.
const MAX_BODY_BYTES: usize = 1024 * 1024;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("missing {0} header")]
    MissingHeader(&'static str),
    #[error("malformed request timestamp")]
    BadTimestamp,
    #[error("request timestamp outside the allowed window")]
    Stale,
    #[error("signature mismatch")]
    Mismatch,
}

#[derive(Clone)]
pub struct SignatureVerifier {
    key: hmac::Key,
    tolerance_secs: i64,
}

fn base_string(timestamp: &str, body: &[u8]) -> Vec<u8> {
    let mut base = Vec::with_capacity(timestamp.len() + body.len() + 4);
    base.extend_from_slice(b"v0:");
    base.extend_from_slice(timestamp.as_bytes());
    base.push(b':');
    base.extend_from_slice(body);
    base
}

impl SignatureVerifier {
    pub fn new(secret: &[u8], tolerance_secs: i64) -> Self {
        Self {
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
            tolerance_secs,
        }
    }

    /// The `X-Slack-Signature` value for a request.
    pub fn sign(&self, timestamp: &str, body: &[u8]) -> String {
        let tag = hmac::sign(&self.key, &base_string(timestamp, body));
        format!("v0={}", hex::encode(tag.as_ref()))
    }

    pub fn verify(
        &self,
        timestamp: &str,
        signature: &str,
        body: &[u8],
        now: i64,
    ) -> Result<(), SignatureError> {
        let ts: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| SignatureError::BadTimestamp)?;
        let age = now.checked_sub(ts).map(i64::unsigned_abs);
        if age.map_or(true, |age| age > self.tolerance_secs.unsigned_abs()) {
            return Err(SignatureError::Stale);
        }
        let expected = signature
            .strip_prefix("v0=")
            .and_then(|h| hex::decode(h).ok())
            .ok_or(SignatureError::Mismatch)?;
        hmac::verify(&self.key, &base_string(timestamp, body), &expected)
            .map_err(|_| SignatureError::Mismatch)
    }
}

impl std::fmt::Debug for SignatureVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureVerifier")
            .field("key", &"***")
            .field("tolerance_secs", &self.tolerance_secs)
            .finish()
    }
}

fn header<'a>(req: &'a Request, name: &'static str) -> Result<&'a str, SignatureError> {
    req.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or(SignatureError::MissingHeader(name))
}

/// Middleware for the `/slack` routes. Passes everything through when no
/// signing secret is configured.
pub async fn verify_slack_signature(
    State(state): State<Arc<AppState>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let Some(verifier) = state.signature.as_ref() else {
        return Ok(next.run(req).await);
    };

    let (timestamp, signature) = match (header(&req, TIMESTAMP_HEADER), header(&req, SIGNATURE_HEADER)) {
        (Ok(ts), Ok(sig)) => (ts.to_string(), sig.to_string()),
        (Err(e), _) | (_, Err(e)) => {
            tracing::warn!("Rejected Slack request to {}: {}", req.uri().path(), e);
            return Err(StatusCode::UNAUTHORIZED);
        }
    };

    let (parts, body) = req.into_parts();
    let bytes = to_bytes(body, MAX_BODY_BYTES)
        .await
        .map_err(|_| StatusCode::PAYLOAD_TOO_LARGE)?;

    let now = chrono::Utc::now().timestamp();
    if let Err(e) = verifier.verify(&timestamp, &signature, &bytes, now) {
        tracing::warn!("Rejected Slack request to {}: {}", parts.uri.path(), e);
        return Err(StatusCode::UNAUTHORIZED);
    }

    Ok(next.run(Request::from_parts(parts, Body::from(bytes))).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_531_420_618;

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(b"8f742231b10e8888abcd99yyyzzz85a5", 300)
    }

    #[test]
    fn test_slack_reference_signature() {
        // Worked example from Slack's request signing guide.
        let body = "token=xyzz0WbapA4vBCDEFasx0q6G&team_id=T1DC2JH3J&team_domain=testteamnow&channel_id=G8PSS9T3V&channel_name=foobar&user_id=U2CERLKJA&user_name=roadrunner&command=%2Fwebhook-collect&text=&response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2FT1DC2JH3J%2F397700885554%2F96rGlfmibIGlgcZRskXaIFfN&trigger_id=398738663015.47445629121.803a0bc887a14d10d2c447fce8b6703c";
        let sig = verifier().sign("1531420618", body.as_bytes());
        assert_eq!(
            sig,
            "v0=a2114d57b48eac39b9ad189dd8316235a7b4a8d21a10bd27519666489c69b503"
        );
        assert_eq!(verifier().verify("1531420618", &sig, body.as_bytes(), NOW), Ok(()));
    }

    #[test]
    fn test_tampered_body_is_rejected() {
        let v = verifier();
        let sig = v.sign("1531420618", b"payload=a");
        assert_eq!(
            v.verify("1531420618", &sig, b"payload=b", NOW),
            Err(SignatureError::Mismatch)
        );
        assert_eq!(
            v.verify("1531420618", "v1=abc", b"payload=a", NOW),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn test_timestamp_window() {
        let v = verifier();
        let sig = v.sign("1531420000", b"x");
        assert_eq!(v.verify("1531420000", &sig, b"x", NOW), Err(SignatureError::Stale));
        assert_eq!(v.verify("soon", &sig, b"x", NOW), Err(SignatureError::BadTimestamp));
        assert_eq!(v.verify("1531420000", &sig, b"x", 1_531_420_100), Ok(()));
    }

    #[test]
    fn test_extreme_timestamps_are_stale() {
        let v = verifier();
        for ts in [i64::MIN, i64::MAX] {
            let ts = ts.to_string();
            let sig = v.sign(&ts, b"x");
            assert_eq!(v.verify(&ts, &sig, b"x", NOW), Err(SignatureError::Stale));
            assert_eq!(v.verify(&ts, "v0=00", b"x", NOW), Err(SignatureError::Stale));
        }
        assert_eq!(
            v.verify("-9223372036854775808", "v0=00", b"x", i64::MAX),
            Err(SignatureError::Stale)
        );
    }

    async fn post_command(verifier: SignatureVerifier, timestamp: &str, signature: Option<&str>) -> StatusCode {
        use tower::ServiceExt;
        let dir = tempfile::tempdir().unwrap();
        let h = crate::testing::signed_harness(dir.path(), verifier);
        let mut request = axum::http::Request::post("/slack/commands")
            .header("content-type", "application/x-www-form-urlencoded")
            .header(TIMESTAMP_HEADER, timestamp);
        if let Some(signature) = signature {
            request = request.header(SIGNATURE_HEADER, signature);
        }
        crate::build_router(h.state)
            .oneshot(request.body(Body::from(COMMAND)).unwrap())
            .await
            .unwrap()
            .status()
    }

    const COMMAND: &str = "command=%2Fslackflake&user_id=U1&trigger_id=T1";

    #[tokio::test]
    async fn test_middleware_accepts_signed_request() {
        let ts = chrono::Utc::now().timestamp().to_string();
        let sig = verifier().sign(&ts, COMMAND.as_bytes());
        assert_eq!(post_command(verifier(), &ts, Some(&sig)).await, StatusCode::OK);
    }

    #[tokio::test]
    async fn test_middleware_rejects_unsigned_or_forged_request() {
        let ts = chrono::Utc::now().timestamp().to_string();
        assert_eq!(post_command(verifier(), &ts, None).await, StatusCode::UNAUTHORIZED);

        let forged = SignatureVerifier::new(b"other-secret", 300).sign(&ts, COMMAND.as_bytes());
        assert_eq!(
            post_command(verifier(), &ts, Some(&forged)).await,
            StatusCode::UNAUTHORIZED
        );
    }

    #[test]
    fn test_debug_hides_secret() {
        assert!(format!("{:?}", verifier()).contains("***"));
    }
}
