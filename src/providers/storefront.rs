//! Storefront release-date lookups, fanned out through a bounded worker
//! pool. The pool checks a cancellation token between submissions: once
//! cancelled, no new lookups start and in-flight ones are drained.

use futures::{stream::FuturesUnordered, StreamExt};
use indexmap::IndexMap;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::util::env::{env_opt, env_parse};

use super::{build_client, default_timeout_secs, get_json_with_retries, Unavailable};

const PROVIDER: &str = "store";
const DEFAULT_BASE_URL: &str = "https://store.steampowered.com/api/appdetails";
const DEFAULT_MAX_CONCURRENCY: usize = 10;

#[derive(Debug, Deserialize)]
struct DetailsWrapper {
    success: bool,
    #[serde(default)]
    data: Option<DetailsData>,
}

#[derive(Debug, Deserialize)]
struct DetailsData {
    #[serde(default)]
    release_date: Option<ReleaseDate>,
}

#[derive(Debug, Deserialize)]
struct ReleaseDate {
    #[serde(default)]
    date: Option<String>,
}

pub struct Storefront {
    http: Client,
    base_url: String,
    max_concurrency: usize,
}

impl Storefront {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            http: build_client(default_timeout_secs())?,
            base_url: env_opt("STORE_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            max_concurrency: env_parse("STORE_MAX_CONCURRENCY", DEFAULT_MAX_CONCURRENCY).max(1),
        })
    }

    /// Release year for one app. `Ok(None)` means the lookup succeeded but no
    /// date was present.
    pub async fn release_year(&self, appid: &str) -> Result<Option<i32>, Unavailable> {
        let body = get_json_with_retries(
            &self.http,
            PROVIDER,
            &self.base_url,
            &[
                ("appids", appid.to_string()),
                ("filters", "release_date".to_string()),
            ],
        )
        .await?;

        let entry = body.get(appid).ok_or_else(|| {
            Unavailable::new(PROVIDER, format!("no entry for appid {appid} in response"))
        })?;
        let wrapper: DetailsWrapper = serde_json::from_value(entry.clone()).map_err(|e| {
            Unavailable::new(PROVIDER, format!("unexpected appdetails shape for {appid}: {e}"))
        })?;
        if !wrapper.success {
            return Ok(None);
        }
        Ok(wrapper
            .data
            .and_then(|d| d.release_date)
            .and_then(|r| r.date)
            .as_deref()
            .and_then(trailing_year))
    }

    /// Look up release years for many apps through a bounded pool. Per-lookup
    /// failures degrade to `None`; they never abort the pool.
    pub async fn release_years(
        &self,
        appids: &[String],
        cancel: &CancellationToken,
    ) -> IndexMap<String, Option<i32>> {
        let sem = Arc::new(Semaphore::new(self.max_concurrency));
        let mut futs = FuturesUnordered::new();
        let mut out: IndexMap<String, Option<i32>> = IndexMap::with_capacity(appids.len());
        let mut submitted = 0usize;

        for appid in appids {
            if cancel.is_cancelled() {
                info!(
                    submitted,
                    remaining = appids.len() - submitted,
                    "store: cancellation requested; draining in-flight lookups"
                );
                break;
            }
            // Wait for a free worker slot, draining completed lookups so the
            // pool keeps making progress while we block on the permit.
            let permit = loop {
                tokio::select! {
                    permit = sem.clone().acquire_owned() => {
                        // the semaphore is never closed
                        break permit.expect("semaphore closed");
                    }
                    Some((done_id, year)) = futs.next(), if !futs.is_empty() => {
                        out.insert(done_id, year);
                    }
                }
            };
            submitted += 1;
            let appid = appid.clone();
            futs.push(async move {
                let _p = permit;
                let year = match self.release_year(&appid).await {
                    Ok(year) => year,
                    Err(err) => {
                        warn!(appid = %appid, error = %err, "store: release-date lookup failed");
                        None
                    }
                };
                (appid, year)
            });
        }

        while let Some((appid, year)) = futs.next().await {
            out.insert(appid, year);
        }
        out
    }
}

/// Extract the trailing 4-digit year from a storefront date string such as
/// `"10 Oct, 2023"`.
fn trailing_year(date: &str) -> Option<i32> {
    let trimmed = date.trim_end();
    let digits: String = trimmed
        .chars()
        .rev()
        .take_while(|c| c.is_ascii_digit())
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if digits.len() != 4 {
        return None;
    }
    digits.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_year_from_store_dates() {
        assert_eq!(trailing_year("10 Oct, 2023"), Some(2023));
        assert_eq!(trailing_year("2021"), Some(2021));
        assert_eq!(trailing_year("Coming soon"), None);
        assert_eq!(trailing_year(""), None);
        // 2-digit trailer is not a year
        assert_eq!(trailing_year("Oct 23"), None);
    }

    #[test]
    fn wrapper_parses_missing_date() {
        let raw = serde_json::json!({"success": true, "data": {}});
        let wrapper: DetailsWrapper = serde_json::from_value(raw).unwrap();
        assert!(wrapper.success);
        assert!(wrapper.data.unwrap().release_date.is_none());
    }

    #[test]
    fn wrapper_parses_failure_flag() {
        let raw = serde_json::json!({"success": false});
        let wrapper: DetailsWrapper = serde_json::from_value(raw).unwrap();
        assert!(!wrapper.success);
    }
}
