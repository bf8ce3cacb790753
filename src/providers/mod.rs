//! External data providers and the shared fetch plumbing they sit on.
//!
//! Every provider operation returns `Result<T, Unavailable>`: a failure is a
//! descriptive value the pipeline logs and routes around, never a panic and
//! never an abort. Transient failures (timeouts, connection errors, 429,
//! 5xx) are retried with capped exponential backoff before the sentinel is
//! produced.

use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{info, warn};

pub mod rawg;
pub mod steamspy;
pub mod storefront;
pub mod trends;

const USER_AGENT: &str = "game-planner/0.1";

pub(crate) const RETRY_MAX_ATTEMPTS: u32 = 3;
const RETRY_BASE_DELAY_MS: u64 = 500;
const RETRY_MAX_DELAY_MS: u64 = 8_000;

/// Failure sentinel for provider calls. Distinguishable from an empty
/// successful result and carries enough context to be logged as-is.
#[derive(Debug, Clone, Error)]
#[error("{provider}: {reason}")]
pub struct Unavailable {
    pub provider: &'static str,
    pub reason: String,
}

impl Unavailable {
    pub fn new(provider: &'static str, reason: impl Into<String>) -> Self {
        Self {
            provider,
            reason: reason.into(),
        }
    }
}

/// Shared HTTP client: user agent + mandatory per-request timeout.
pub(crate) fn build_client(timeout_secs: u64) -> anyhow::Result<Client> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(timeout_secs))
        .build()?)
}

pub(crate) fn default_timeout_secs() -> u64 {
    crate::util::env::env_parse("FETCH_TIMEOUT_SECS", 20u64)
}

fn is_transient_status(status: StatusCode) -> bool {
    status.as_u16() == 429 || status.is_server_error()
}

pub(crate) fn backoff_delay(attempt: u32) -> Duration {
    let exp = attempt.saturating_sub(1).min(6);
    Duration::from_millis((RETRY_BASE_DELAY_MS << exp).min(RETRY_MAX_DELAY_MS))
}

pub(crate) fn truncate_for_log(mut s: String, max_len: usize) -> String {
    if s.len() > max_len {
        // back off to a char boundary so multibyte bodies cannot panic
        let mut end = max_len;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
        s.push('…');
    }
    s
}

/// GET `url` (plus `query` pairs, kept out of error strings so credentials
/// never reach the logs) and decode the body as JSON.
///
/// Retries transient failures up to `RETRY_MAX_ATTEMPTS` with exponential
/// backoff; a non-2xx status other than 429/5xx fails immediately.
pub(crate) async fn get_json_with_retries(
    http: &Client,
    provider: &'static str,
    url: &str,
    query: &[(&str, String)],
) -> Result<Value, Unavailable> {
    let mut last_reason = String::new();

    for attempt in 1..=RETRY_MAX_ATTEMPTS {
        match http.get(url).query(query).send().await {
            Ok(resp) => {
                let status = resp.status();
                if status.is_success() {
                    match resp.json::<Value>().await {
                        Ok(v) => {
                            if attempt > 1 {
                                info!(provider, attempt, url, "fetch succeeded after retries");
                            }
                            return Ok(v);
                        }
                        Err(e) => {
                            return Err(Unavailable::new(
                                provider,
                                format!("undecodable JSON from {url}: {e}"),
                            ));
                        }
                    }
                }
                if is_transient_status(status) {
                    last_reason = format!("HTTP {status} from {url}");
                } else {
                    let body = resp.text().await.unwrap_or_default();
                    return Err(Unavailable::new(
                        provider,
                        format!("HTTP {status} from {url}: {}", truncate_for_log(body, 200)),
                    ));
                }
            }
            // reqwest surfaces timeouts and connect failures here
            Err(e) => {
                last_reason = format!("request error for {url}: {e}");
            }
        }

        if attempt < RETRY_MAX_ATTEMPTS {
            let delay = backoff_delay(attempt);
            warn!(
                provider,
                attempt,
                max_attempts = RETRY_MAX_ATTEMPTS,
                delay_ms = delay.as_millis() as u64,
                reason = %last_reason,
                "transient fetch failure; retrying"
            );
            tokio::time::sleep(delay).await;
        }
    }

    Err(Unavailable::new(
        provider,
        format!("gave up after {RETRY_MAX_ATTEMPTS} attempts: {last_reason}"),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_statuses() {
        assert!(is_transient_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_transient_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(is_transient_status(StatusCode::BAD_GATEWAY));
        assert!(!is_transient_status(StatusCode::NOT_FOUND));
        assert!(!is_transient_status(StatusCode::BAD_REQUEST));
        assert!(!is_transient_status(StatusCode::UNAUTHORIZED));
    }

    #[test]
    fn backoff_grows_and_caps() {
        assert_eq!(backoff_delay(1), Duration::from_millis(500));
        assert_eq!(backoff_delay(2), Duration::from_millis(1_000));
        assert_eq!(backoff_delay(3), Duration::from_millis(2_000));
        assert_eq!(backoff_delay(20), Duration::from_millis(RETRY_MAX_DELAY_MS));
    }

    #[test]
    fn sentinel_names_provider_and_reason() {
        let u = Unavailable::new("spy", "HTTP 500 from http://x");
        assert_eq!(u.to_string(), "spy: HTTP 500 from http://x");
    }

    #[test]
    fn log_truncation() {
        assert_eq!(truncate_for_log("abcdef".into(), 4), "abcd…");
        assert_eq!(truncate_for_log("ab".into(), 4), "ab");
    }

    #[test]
    fn log_truncation_respects_multibyte_boundaries() {
        // "한" is 3 bytes; a 4-byte cut lands mid-character and must back off
        let cut = truncate_for_log("한국어 오류 메시지".into(), 4);
        assert_eq!(cut, "한…");
        let cut = truncate_for_log("日本語エラー".into(), 7);
        assert_eq!(cut, "日本…");
        // boundary exactly on a char edge keeps the full prefix
        assert_eq!(truncate_for_log("한국".into(), 3), "한…");
    }
}
