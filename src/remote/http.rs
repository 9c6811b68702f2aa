//! HTTP plumbing shared by the tracker backends.
//!
//! Status classification, rate-limit header parsing and transport error
//! mapping live here so both backends fail the same way.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use reqwest::header::HeaderMap;
use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::{Error, Result};
use crate::remote::adapter::RateLimitInfo;

const REMAINING: &str = "x-ratelimit-remaining";
const LIMIT: &str = "x-ratelimit-limit";
const RESET: &str = "x-ratelimit-reset";
const RETRY_AFTER: &str = "retry-after";

/// Build the client used by an adapter, with a per-request timeout.
///
/// # Errors
///
/// Returns `Config` if the TLS backend cannot be initialized.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Client::builder()
        .timeout(timeout)
        .user_agent(concat!("tracksync/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| Error::Config(format!("Failed to build HTTP client: {e}")))
}

/// Parse `x-ratelimit-*` headers. Header names are case-insensitive.
///
/// `Retry-After` alone also yields a reading (remaining 0) since it means
/// the caller must not send anything before that instant.
#[must_use]
pub fn parse_rate_limit(headers: &HeaderMap, now: DateTime<Utc>) -> Option<RateLimitInfo> {
    let remaining = header_u64(headers, REMAINING);
    let limit = header_u64(headers, LIMIT).and_then(|v| u32::try_from(v).ok());
    let reset = header_u64(headers, RESET)
        .and_then(|secs| i64::try_from(secs).ok())
        .and_then(|secs| DateTime::<Utc>::from_timestamp(secs, 0));

    match (remaining, reset) {
        (Some(remaining), Some(reset_at)) => Some(RateLimitInfo {
            remaining: u32::try_from(remaining).unwrap_or(u32::MAX),
            limit,
            reset_at,
        }),
        _ => retry_after(headers, now).map(|reset_at| RateLimitInfo {
            remaining: 0,
            limit,
            reset_at,
        }),
    }
}

/// `Retry-After` as an absolute instant: either delta-seconds or an HTTP date.
#[must_use]
pub fn retry_after(headers: &HeaderMap, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let raw = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    if let Ok(secs) = raw.parse::<i64>() {
        return Some(now + TimeDelta::seconds(secs.max(0)));
    }
    DateTime::parse_from_rfc2822(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}

fn header_u64(headers: &HeaderMap, name: &str) -> Option<u64> {
    headers.get(name)?.to_str().ok()?.trim().parse().ok()
}

/// Map a non-success response to the crate's error taxonomy.
///
/// `context` names the resource for not-found errors (usually the remote id).
#[must_use]
pub fn classify_status(
    status: StatusCode,
    headers: &HeaderMap,
    body: &str,
    context: &str,
    now: DateTime<Utc>,
) -> Error {
    let detail = summarize_body(body);
    let quota = parse_rate_limit(headers, now);
    let exhausted = quota.is_some_and(|q| q.remaining == 0);

    match status.as_u16() {
        401 => Error::Auth(format!("{status}: {detail}")),
        403 if exhausted => Error::RateLimited {
            message: format!("{status}: {detail}"),
            reset_at: quota.map(|q| q.reset_at),
        },
        429 => Error::RateLimited {
            message: format!("{status}: {detail}"),
            reset_at: quota.map(|q| q.reset_at).or_else(|| retry_after(headers, now)),
        },
        403 => Error::Auth(format!("{status}: {detail}")),
        404 | 410 => Error::RemoteNotFound {
            id: context.to_string(),
        },
        408 => Error::Transient(format!("{status}: {detail}")),
        s if s >= 500 => Error::Transient(format!("{status}: {detail}")),
        _ => Error::Validation(format!("{status}: {detail}")),
    }
}

/// Map a transport failure. Timeouts keep their own variant.
#[must_use]
pub fn classify_transport(err: &reqwest::Error, operation: &str, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            operation: operation.to_string(),
            after_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    } else if err.is_decode() {
        Error::Validation(format!("{operation}: unexpected response body: {err}"))
    } else {
        Error::Transient(format!("{operation}: {err}"))
    }
}

/// Pull the useful part out of an error body (`message` for both backends).
fn summarize_body(body: &str) -> String {
    let from_json = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(str::to_string));
    let text = from_json.unwrap_or_else(|| body.trim().to_string());
    if text.chars().count() > 300 {
        let cut: String = text.chars().take(300).collect();
        format!("{cut}...")
    } else if text.is_empty() {
        "(empty body)".to_string()
    } else {
        text
    }
}

/// Last quota reading seen by an adapter.
#[derive(Debug, Default)]
pub struct RateLimitCell {
    inner: RwLock<Option<RateLimitInfo>>,
}

impl RateLimitCell {
    /// Record the reading carried by `headers`, if any.
    pub fn record(&self, headers: &HeaderMap, now: DateTime<Utc>) {
        if let Some(info) = parse_rate_limit(headers, now) {
            *self.inner.write().unwrap_or_else(PoisonError::into_inner) = Some(info);
        }
    }

    #[must_use]
    pub fn get(&self) -> Option<RateLimitInfo> {
        *self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Record quota, then either decode the JSON body or classify the failure.
///
/// # Errors
///
/// Returns the classified status error, or a transport error while reading the body.
pub async fn read_json<T: DeserializeOwned>(
    response: Response,
    cell: &RateLimitCell,
    context: &str,
    operation: &str,
    timeout: Duration,
) -> Result<T> {
    let now = Utc::now();
    cell.record(response.headers(), now);
    let status = response.status();

    if status.is_success() && status != StatusCode::NON_AUTHORITATIVE_INFORMATION {
        return response
            .json::<T>()
            .await
            .map_err(|e| classify_transport(&e, operation, timeout));
    }

    Err(read_failure(response, context, now).await)
}

/// Like [`read_json`] for calls whose body is irrelevant.
///
/// # Errors
///
/// Returns the classified status error.
pub async fn read_empty(response: Response, cell: &RateLimitCell, context: &str) -> Result<()> {
    let now = Utc::now();
    cell.record(response.headers(), now);
    let status = response.status();
    if status.is_success() && status != StatusCode::NON_AUTHORITATIVE_INFORMATION {
        return Ok(());
    }
    Err(read_failure(response, context, now).await)
}

async fn read_failure(response: Response, context: &str, now: DateTime<Utc>) -> Error {
    let status = response.status();
    // Azure DevOps answers bad credentials with 203 and a sign-in page.
    if status == StatusCode::NON_AUTHORITATIVE_INFORMATION {
        return Error::Auth("credentials rejected (sign-in page returned)".to_string());
    }
    let headers = response.headers().clone();
    let body = response.text().await.unwrap_or_default();
    classify_status(status, &headers, &body, context, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use reqwest::header::{HeaderName, HeaderValue};

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 5, 1, 12, 0, 0).unwrap()
    }

    fn headers(pairs: &[(&'static str, &str)]) -> HeaderMap {
        let mut h = HeaderMap::new();
        for (k, v) in pairs {
            h.insert(
                HeaderName::from_bytes(k.as_bytes()).unwrap(),
                HeaderValue::from_str(v).unwrap(),
            );
        }
        h
    }

    #[test]
    fn test_parse_rate_limit_headers() {
        let reset = now().timestamp() + 600;
        let h = headers(&[
            ("X-RateLimit-Remaining", "42"),
            ("X-RateLimit-Limit", "5000"),
            ("X-RateLimit-Reset", &reset.to_string()),
        ]);
        let info = parse_rate_limit(&h, now()).unwrap();
        assert_eq!(info.remaining, 42);
        assert_eq!(info.limit, Some(5000));
        assert_eq!(info.reset_at.timestamp(), reset);
    }

    #[test]
    fn test_retry_after_alone_means_exhausted() {
        let h = headers(&[("Retry-After", "30")]);
        let info = parse_rate_limit(&h, now()).unwrap();
        assert_eq!(info.remaining, 0);
        assert_eq!(info.reset_at, now() + TimeDelta::seconds(30));
    }

    #[test]
    fn test_no_headers_no_reading() {
        assert!(parse_rate_limit(&HeaderMap::new(), now()).is_none());
    }

    #[test]
    fn test_classify_401_is_auth() {
        let err = classify_status(StatusCode::UNAUTHORIZED, &HeaderMap::new(), "", "1", now());
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn test_classify_403_depends_on_quota() {
        let reset = (now().timestamp() + 60).to_string();
        let exhausted = headers(&[("x-ratelimit-remaining", "0"), ("x-ratelimit-reset", &reset)]);
        let err = classify_status(StatusCode::FORBIDDEN, &exhausted, "{}", "1", now());
        assert!(matches!(err, Error::RateLimited { reset_at: Some(_), .. }));

        let plain = classify_status(
            StatusCode::FORBIDDEN,
            &HeaderMap::new(),
            r#"{"message":"Resource not accessible by integration"}"#,
            "1",
            now(),
        );
        assert!(matches!(plain, Error::Auth(ref m) if m.contains("not accessible")));
    }

    #[test]
    fn test_classify_429_uses_retry_after() {
        let h = headers(&[("retry-after", "12")]);
        let err = classify_status(StatusCode::TOO_MANY_REQUESTS, &h, "", "1", now());
        match err {
            Error::RateLimited { reset_at, .. } => {
                assert_eq!(reset_at, Some(now() + TimeDelta::seconds(12)));
            }
            other => panic!("expected RateLimited, got {other:?}"),
        }
    }

    #[test]
    fn test_classify_remaining_classes() {
        let h = HeaderMap::new();
        assert!(matches!(
            classify_status(StatusCode::NOT_FOUND, &h, "", "77", now()),
            Error::RemoteNotFound { ref id } if id == "77"
        ));
        assert!(matches!(
            classify_status(StatusCode::GONE, &h, "", "77", now()),
            Error::RemoteNotFound { .. }
        ));
        assert!(classify_status(StatusCode::REQUEST_TIMEOUT, &h, "", "", now()).is_retryable());
        assert!(classify_status(StatusCode::BAD_GATEWAY, &h, "", "", now()).is_retryable());
        assert!(matches!(
            classify_status(StatusCode::UNPROCESSABLE_ENTITY, &h, "", "", now()),
            Error::Validation(_)
        ));
    }

    #[test]
    fn test_summarize_body_truncates() {
        let long = "x".repeat(500);
        assert!(summarize_body(&long).ends_with("..."));
        assert_eq!(summarize_body(""), "(empty body)");
    }

    #[test]
    fn test_rate_limit_cell_keeps_last_reading() {
        let cell = RateLimitCell::default();
        assert!(cell.get().is_none());
        let reset = (now().timestamp() + 60).to_string();
        cell.record(&headers(&[("x-ratelimit-remaining", "9"), ("x-ratelimit-reset", &reset)]), now());
        cell.record(&HeaderMap::new(), now());
        assert_eq!(cell.get().unwrap().remaining, 9);
    }
}
